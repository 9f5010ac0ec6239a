use crate::{
    bus::{Bus, BusValue, ServiceClass},
    tracker::{PropertyCache, PropertyValue},
    Result,
};

use super::{PageContext, PageKey, PageText, PageView, ServiceBinding, TrackedItem};

/// Charger state names as shown on the display.
pub fn mppt_state_name(state: i64) -> &'static str {
    match state {
        0 => "Off",
        3 => "Bulk",
        4 => "Absorb",
        5 => "Float",
        6 => "Storage",
        7 => "Eqlz",
        252 => "ESS",
        _ => "unknown",
    }
}

const LIVE_ITEMS: &[TrackedItem] = &[
    TrackedItem::new("/Connected", "mppt_connected"),
    TrackedItem::new("/State", "mppt_state"),
    TrackedItem::new("/Yield/Power", "pv_power"),
    TrackedItem::new("/Pv/V", "pv_voltage"),
];

#[derive(Debug)]
pub struct SolarPage {
    binding: ServiceBinding,
}

impl Default for SolarPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SolarPage {
    pub fn new() -> Self {
        Self {
            binding: ServiceBinding::new(ServiceClass::SolarCharger, LIVE_ITEMS),
        }
    }
}

impl PageView for SolarPage {
    fn key(&self) -> PageKey {
        PageKey::Solar
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
        if !self.binding.is_bound() {
            return Ok(None);
        }
        let cache = self.binding.cache();
        let mut text = PageText::no_data("Solar:");
        if cache.get_i64("mppt_connected") == Some(1) {
            if let Some(state) = cache.get_i64("mppt_state") {
                text.rows[0].1 = mppt_state_name(state).to_string();
            }
            if let Some(power) = cache.get_f64("pv_power") {
                text.rows[1].0 = format!("{power:.0} W");
            }
            if let Some(volts) = cache.get_f64("pv_voltage") {
                text.rows[1].1 = format!("{volts:.1} V");
            }
        }
        Ok(Some(text))
    }
}

fn track_peak(cache: &mut PropertyCache, key: &str, value: Option<PropertyValue>) {
    if let Some(power) = value.as_ref().and_then(PropertyValue::as_f64) {
        let peak = cache.get_f64("pv_power_peak").map_or(power, |p| p.max(power));
        cache.set("pv_power_peak", Some(PropertyValue::Float(peak)));
    }
    cache.set(key, value);
}

const HISTORY_ITEMS: &[TrackedItem] = &[
    TrackedItem::new("/History/Daily/0/Yield", "yield_today"),
    TrackedItem::new("/History/Daily/0/MaxPower", "max_power_today"),
    TrackedItem::with_hook("/Yield/Power", "pv_power", track_peak),
];

/// Today's yield and the highest PV power seen, from the charger history and the live
/// readings observed while the charger was present.
#[derive(Debug)]
pub struct SolarHistoryPage {
    binding: ServiceBinding,
}

impl Default for SolarHistoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SolarHistoryPage {
    pub fn new() -> Self {
        Self {
            binding: ServiceBinding::new(ServiceClass::SolarCharger, HISTORY_ITEMS),
        }
    }

    pub fn peak_power(&self) -> Option<f64> {
        let cache = self.binding.cache();
        match (
            cache.get_f64("max_power_today"),
            cache.get_f64("pv_power_peak"),
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

impl PageView for SolarHistoryPage {
    fn key(&self) -> PageKey {
        PageKey::SolarHistory
    }

    fn setup(&mut self, bus: &dyn Bus, service: &str) {
        self.binding.setup(bus, service);
    }

    fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        if self.binding.cleanup(bus, service) {
            self.binding.cache_mut().set("pv_power_peak", None);
        }
    }

    fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.binding.handle_change(service, path, value)
    }

    fn get_text(&self, _ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        if !self.binding.is_bound() {
            return Ok(None);
        }
        let mut text = PageText::new("Today:", "", "Max", "");
        match self.binding.cache().get_f64("yield_today") {
            Some(kwh) => text.rows[0].1 = format!("{kwh:.2} kWh"),
            None => text.rows[0].1 = super::NO_DATA.to_string(),
        }
        if let Some(peak) = self.peak_power() {
            text.rows[1].1 = format!("{peak:.0} W");
        }
        Ok(Some(text))
    }

    fn auto(&self) -> bool {
        false
    }

    fn volatile(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::memory::MemoryBus, pages::SystemMetrics};

    const MPPT: &str = "com.victronenergy.solarcharger.ttyS1";

    fn lines(page: &dyn PageView, bus: &MemoryBus) -> Option<[String; 2]> {
        let metrics = SystemMetrics::new();
        let ctx = PageContext {
            bus,
            metrics: &metrics,
            cols: 16,
        };
        page.get_text(&ctx).unwrap().map(|t| t.lines(16))
    }

    #[test]
    fn state_names_cover_known_codes() {
        assert_eq!(mppt_state_name(3), "Bulk");
        assert_eq!(mppt_state_name(252), "ESS");
        assert_eq!(mppt_state_name(2), "unknown");
    }

    #[test]
    fn solar_page_skips_until_a_charger_appears() {
        let bus = MemoryBus::new().with_service(
            MPPT,
            [
                ("/Connected", 1i64.into()),
                ("/State", 5i64.into()),
                ("/Yield/Power", 350.4.into()),
                ("/Pv/V", 71.3.into()),
            ],
        );
        let mut page = SolarPage::new();
        assert_eq!(lines(&page, &bus), None);
        page.setup(&bus, MPPT);
        assert_eq!(
            lines(&page, &bus),
            Some(["Solar:     Float".to_string(), "350 W     71.3 V".to_string()])
        );
        page.handle_change(MPPT, "/Connected", &BusValue::I64(0));
        assert_eq!(
            lines(&page, &bus),
            Some(["Solar:   NO DATA".to_string(), "Check Connection".to_string()])
        );
    }

    #[test]
    fn history_keeps_peak_until_charger_leaves() {
        let bus = MemoryBus::new().with_service(
            MPPT,
            [
                ("/History/Daily/0/Yield", 1.25.into()),
                ("/History/Daily/0/MaxPower", 300i64.into()),
                ("/Yield/Power", 120.0.into()),
            ],
        );
        let mut page = SolarHistoryPage::new();
        page.setup(&bus, MPPT);
        page.handle_change(MPPT, "/Yield/Power", &BusValue::Double(410.0));
        page.handle_change(MPPT, "/Yield/Power", &BusValue::Double(90.0));
        assert_eq!(page.peak_power(), Some(410.0));
        assert_eq!(
            lines(&page, &bus),
            Some(["Today:  1.25 kWh".to_string(), "Max        410 W".to_string()])
        );

        page.cleanup(&bus, MPPT);
        assert_eq!(page.peak_power(), None);
        assert_eq!(lines(&page, &bus), None);
    }
}
