use crate::{
    bus::{Bus, BusValue, ServiceClass},
    tracker::PropertyTracker,
    Result,
};

use super::{PageContext, PageKey, PageText, PageView, NO_DATA};

/// Which side of the inverter/charger a page reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcSide {
    In,
    Out,
}

impl AcSide {
    fn title(self) -> &'static str {
        match self {
            AcSide::In => "Grid:",
            AcSide::Out => "AC Out:",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            AcSide::In => "/Ac/ActiveIn",
            AcSide::Out => "/Ac/Out",
        }
    }
}

/// AC input or output of one phase. Paths depend on side and phase, so the page tracks
/// them itself rather than through a static item table.
#[derive(Debug)]
pub struct AcPage {
    side: AcSide,
    phase: &'static str,
    bound: Option<String>,
    tracker: PropertyTracker,
}

impl AcPage {
    pub fn new(side: AcSide, phase: &'static str) -> Self {
        Self {
            side,
            phase,
            bound: None,
            tracker: PropertyTracker::new(),
        }
    }

    pub fn side(&self) -> AcSide {
        self.side
    }
}

impl PageView for AcPage {
    fn key(&self) -> PageKey {
        PageKey::Ac(self.side)
    }

    fn setup(&mut self, bus: &dyn Bus, service: &str) {
        if self.bound.is_some() || !ServiceClass::VeBus.matches(service) {
            return;
        }
        let prefix = self.side.prefix();
        let phase = self.phase;
        self.tracker.track(bus, service, "/Connected", "vebus_connected");
        if self.side == AcSide::In {
            self.tracker
                .track(bus, service, "/Ac/ActiveIn/Connected", "grid_available");
        }
        self.tracker
            .track(bus, service, &format!("{prefix}/{phase}/P"), "power");
        self.tracker
            .track(bus, service, &format!("{prefix}/{phase}/V"), "voltage");
        self.bound = Some(service.to_string());
    }

    fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        if self.bound.as_deref() == Some(service) {
            self.tracker.cleanup(bus, service);
            self.bound = None;
        }
    }

    fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.tracker.handle_change(service, path, value)
    }

    fn get_text(&self, _ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        let cache = self.tracker.cache();
        if cache.get_i64("vebus_connected") != Some(1) {
            return Ok(None);
        }
        let mut text = PageText::no_data(self.side.title());
        if self.side == AcSide::In {
            let Some(available) = cache.get_i64("grid_available") else {
                return Ok(Some(text));
            };
            text.rows[0].1 = if available == 1 { "connected" } else { "n/a" }.to_string();
        } else if cache.is_present("power") || cache.is_present("voltage") {
            text.rows[0].1 = self.phase.to_string();
        } else {
            text.rows[0].1 = NO_DATA.to_string();
            return Ok(Some(text));
        }
        text.rows[1].0 = cache
            .get_f64("power")
            .map(|p| format!("{p:+.0} W"))
            .unwrap_or_default();
        text.rows[1].1 = cache
            .get_f64("voltage")
            .map(|v| format!("{v:.0} V"))
            .unwrap_or_default();
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::memory::MemoryBus, pages::SystemMetrics};

    const VEBUS: &str = "com.victronenergy.vebus.ttyS3";

    fn lines(page: &AcPage, bus: &MemoryBus) -> Option<[String; 2]> {
        let metrics = SystemMetrics::new();
        let ctx = PageContext {
            bus,
            metrics: &metrics,
            cols: 16,
        };
        page.get_text(&ctx).unwrap().map(|t| t.lines(16))
    }

    fn vebus() -> MemoryBus {
        MemoryBus::new().with_service(
            VEBUS,
            [
                ("/Connected", 1i64.into()),
                ("/Ac/ActiveIn/Connected", 1i64.into()),
                ("/Ac/ActiveIn/L1/P", 1250.0.into()),
                ("/Ac/ActiveIn/L1/V", 229.6.into()),
                ("/Ac/Out/L1/P", 800.0.into()),
            ],
        )
    }

    #[test]
    fn grid_page_shows_connection_power_and_voltage() {
        let bus = vebus();
        let mut page = AcPage::new(AcSide::In, "L1");
        page.setup(&bus, VEBUS);
        assert_eq!(
            lines(&page, &bus),
            Some(["Grid:  connected".to_string(), "+1250 W    230 V".to_string()])
        );
        page.handle_change(VEBUS, "/Ac/ActiveIn/Connected", &BusValue::I64(0));
        assert_eq!(lines(&page, &bus).unwrap()[0], "Grid:        n/a");
    }

    #[test]
    fn output_page_uses_phase_paths() {
        let bus = vebus();
        let mut page = AcPage::new(AcSide::Out, "L1");
        page.setup(&bus, VEBUS);
        assert_eq!(
            lines(&page, &bus),
            Some(["AC Out:       L1".to_string(), "+800 W          ".to_string()])
        );
        assert!(bus.is_subscribed(VEBUS, "/Ac/Out/L1/V"));
    }

    #[test]
    fn vanished_vebus_skips_instead_of_showing_stale_data() {
        let bus = vebus();
        let mut page = AcPage::new(AcSide::In, "L1");
        page.setup(&bus, VEBUS);
        assert!(lines(&page, &bus).is_some());

        page.cleanup(&bus, VEBUS);
        assert_eq!(lines(&page, &bus), None);
        assert_eq!(bus.active_subscriptions(VEBUS), 0);
    }

    #[test]
    fn only_first_vebus_is_bound() {
        let bus = vebus().with_service("com.victronenergy.vebus.ttyS4", [("/Connected", 0i64.into())]);
        let mut page = AcPage::new(AcSide::In, "L1");
        page.setup(&bus, VEBUS);
        page.setup(&bus, "com.victronenergy.vebus.ttyS4");
        assert_eq!(bus.active_subscriptions("com.victronenergy.vebus.ttyS4"), 0);
        page.cleanup(&bus, "com.victronenergy.vebus.ttyS4");
        assert!(lines(&page, &bus).is_some());
    }
}
