use crate::{
    bus::{Bus, BusValue, ServiceClass},
    Result,
};

use super::{PageContext, PageKey, PageText, PageView, ServiceBinding, TrackedItem};

const ITEMS: &[TrackedItem] = &[
    TrackedItem::new("/Dc/Battery/Soc", "battery_soc"),
    TrackedItem::new("/Dc/Battery/Power", "battery_power"),
    TrackedItem::new("/Dc/Battery/Voltage", "battery_voltage"),
];

#[derive(Debug)]
pub struct BatteryPage {
    binding: ServiceBinding,
}

impl Default for BatteryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryPage {
    pub fn new() -> Self {
        Self {
            binding: ServiceBinding::new(ServiceClass::System, ITEMS),
        }
    }
}

impl PageView for BatteryPage {
    fn key(&self) -> PageKey {
        PageKey::Battery
    }

    fn setup(&mut self, bus: &dyn Bus, service: &str) {
        self.binding.setup(bus, service);
    }

    fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        self.binding.cleanup(bus, service);
    }

    fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.binding.handle_change(service, path, value)
    }

    fn get_text(&self, _ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        let cache = self.binding.cache();
        let mut text = PageText::no_data("Battery:");
        if let Some(soc) = cache.get_f64("battery_soc") {
            text.rows[0].1 = format!("{soc:.1} %");
            text.rows[1].0 = cache
                .get_f64("battery_power")
                .map(|p| format!("{p:+.0} W"))
                .unwrap_or_default();
            text.rows[1].1 = cache
                .get_f64("battery_voltage")
                .map(|v| format!("{v:.1} V"))
                .unwrap_or_default();
        }
        Ok(Some(text))
    }
}
