use crate::bus::{Bus, BusValue, ServiceClass};

use super::{ServiceBinding, TrackedItem};

const ITEMS: &[TrackedItem] = &[
    TrackedItem::new("/Dc/Battery/Soc", "soc"),
    TrackedItem::new("/Dc/Battery/Power", "battery_power"),
    TrackedItem::new("/Dc/Pv/Power", "pv_power"),
    TrackedItem::new("/Ac/Consumption/L1/Power", "consumption"),
];

/// System-wide totals several pages read, tracked once from the aggregator service.
#[derive(Debug)]
pub struct SystemMetrics {
    binding: ServiceBinding,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self {
            binding: ServiceBinding::new(ServiceClass::System, ITEMS),
        }
    }

    pub(super) fn setup(&mut self, bus: &dyn Bus, service: &str) {
        self.binding.setup(bus, service);
    }

    pub(super) fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        self.binding.cleanup(bus, service);
    }

    pub(super) fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.binding.handle_change(service, path, value)
    }

    pub fn battery_soc(&self) -> Option<f64> {
        self.binding.cache().get_f64("soc")
    }

    pub fn battery_power(&self) -> Option<f64> {
        self.binding.cache().get_f64("battery_power")
    }

    pub fn pv_power(&self) -> Option<f64> {
        self.binding.cache().get_f64("pv_power")
    }

    pub fn consumption(&self) -> Option<f64> {
        self.binding.cache().get_f64("consumption")
    }

    pub fn has_data(&self) -> bool {
        self.battery_soc().is_some()
            || self.battery_power().is_some()
            || self.pv_power().is_some()
            || self.consumption().is_some()
    }
}
