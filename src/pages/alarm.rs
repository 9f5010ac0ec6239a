use crate::{
    bus::{Bus, BusValue, ServiceClass},
    tracker::PropertyCache,
    Result,
};

use super::{PageContext, PageKey, PageText, PageView, ServiceBinding, TrackedItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    VebusError,
    VebusAlarms,
    SolarError,
}

const VEBUS_ERROR_ITEMS: &[TrackedItem] = &[TrackedItem::new("/VebusError", "code")];

const VEBUS_ALARM_ITEMS: &[TrackedItem] = &[
    TrackedItem::new("/Alarms/LowBattery", "low_battery"),
    TrackedItem::new("/Alarms/HighTemperature", "high_temperature"),
    TrackedItem::new("/Alarms/Overload", "overload"),
];

const VEBUS_ALARM_LABELS: [(&str, &str); 3] = [
    ("low_battery", "Low battery"),
    ("high_temperature", "High temp"),
    ("overload", "Overload"),
];

const SOLAR_ERROR_ITEMS: &[TrackedItem] = &[TrackedItem::new("/ErrorCode", "code")];

fn vebus_error_label(code: i64) -> &'static str {
    match code {
        1 => "Phase off",
        2 => "Mixed MK2",
        3 => "Device count",
        4 => "No other dev",
        5 => "AC-out overvolt",
        8 => "Ground relay",
        10 => "Time sync",
        14 => "No transmit",
        16 => "Dongle missing",
        17 => "No phase master",
        18 => "Overvoltage",
        22 => "Not a slave",
        24 => "Switch-over",
        25 => "Firmware",
        26 => "Internal error",
        _ => "",
    }
}

fn solar_error_label(code: i64) -> &'static str {
    match code {
        1 => "Batt temp high",
        2 => "Batt volt high",
        3 | 4 => "Temp sensor",
        17 => "Overheated",
        18 => "Overcurrent",
        20 => "Bulk time",
        21 => "Current sensor",
        26 => "Terminal hot",
        33 => "PV overvoltage",
        34 => "PV overcurrent",
        38 => "Input shutdown",
        116 => "Calibration lost",
        119 => "Settings lost",
        _ => "",
    }
}

/// An active notification. Urgent while active and not yet acknowledged by a key press;
/// a different alarm signature makes it urgent again.
#[derive(Debug)]
pub struct AlarmPage {
    kind: AlarmKind,
    binding: ServiceBinding,
    acknowledged: Option<i64>,
}

impl AlarmPage {
    pub fn new(kind: AlarmKind) -> Self {
        let (class, items) = match kind {
            AlarmKind::VebusError => (ServiceClass::VeBus, VEBUS_ERROR_ITEMS),
            AlarmKind::VebusAlarms => (ServiceClass::VeBus, VEBUS_ALARM_ITEMS),
            AlarmKind::SolarError => (ServiceClass::SolarCharger, SOLAR_ERROR_ITEMS),
        };
        Self {
            kind,
            binding: ServiceBinding::new(class, items),
            acknowledged: None,
        }
    }

    pub fn kind(&self) -> AlarmKind {
        self.kind
    }

    /// Non-zero while something is wrong. Error pages use the code; the alarm page packs
    /// the three alarm levels into one number.
    pub fn signature(&self) -> i64 {
        let cache = self.binding.cache();
        match self.kind {
            AlarmKind::VebusError | AlarmKind::SolarError => {
                cache.get_i64("code").filter(|c| *c > 0).unwrap_or(0)
            }
            AlarmKind::VebusAlarms => VEBUS_ALARM_LABELS
                .iter()
                .fold(0, |acc, (key, _)| acc * 4 + alarm_level(cache, key)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.signature() != 0
    }

    fn settle(&mut self) {
        if !self.is_active() {
            self.acknowledged = None;
        }
    }
}

fn alarm_level(cache: &PropertyCache, key: &str) -> i64 {
    cache.get_i64(key).unwrap_or(0).clamp(0, 2)
}

impl PageView for AlarmPage {
    fn key(&self) -> PageKey {
        PageKey::Alarm(self.kind)
    }

    fn setup(&mut self, bus: &dyn Bus, service: &str) {
        if self.binding.setup(bus, service) {
            self.settle();
        }
    }

    fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        if self.binding.cleanup(bus, service) {
            self.acknowledged = None;
        }
    }

    fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        let consumed = self.binding.handle_change(service, path, value);
        if consumed {
            self.settle();
        }
        consumed
    }

    fn get_text(&self, _ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        if !self.is_active() {
            return Ok(None);
        }
        let cache = self.binding.cache();
        let text = match self.kind {
            AlarmKind::VebusError | AlarmKind::SolarError => {
                let code = self.signature();
                let (title, label) = if self.kind == AlarmKind::VebusError {
                    ("VE.Bus Error", vebus_error_label(code))
                } else {
                    ("Solar Error", solar_error_label(code))
                };
                PageText::new(title, "", format!("#{code}"), label)
            }
            AlarmKind::VebusAlarms => {
                let active: Vec<(&str, i64)> = VEBUS_ALARM_LABELS
                    .iter()
                    .map(|(key, label)| (*label, alarm_level(cache, key)))
                    .filter(|(_, level)| *level > 0)
                    .collect();
                let worst = active.iter().map(|(_, l)| *l).max().unwrap_or(0);
                let title = if worst >= 2 { "VE.Bus Alarm" } else { "VE.Bus Warning" };
                let labels: Vec<&str> = active.iter().map(|(label, _)| *label).collect();
                PageText::new(title, "", labels.join(","), "")
            }
        };
        Ok(Some(text))
    }

    fn auto(&self) -> bool {
        false
    }

    fn volatile(&self) -> bool {
        false
    }

    fn urgent(&self) -> bool {
        self.is_active() && self.acknowledged != Some(self.signature())
    }

    fn key_pressed(&mut self) {
        if self.is_active() {
            self.acknowledged = Some(self.signature());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::memory::MemoryBus, pages::SystemMetrics};

    const VEBUS: &str = "com.victronenergy.vebus.ttyS3";

    fn lines(page: &AlarmPage, bus: &MemoryBus) -> Option<[String; 2]> {
        let metrics = SystemMetrics::new();
        let ctx = PageContext {
            bus,
            metrics: &metrics,
            cols: 16,
        };
        page.get_text(&ctx).unwrap().map(|t| t.lines(16))
    }

    #[test]
    fn error_is_urgent_until_acknowledged() {
        let bus = MemoryBus::new().with_service(VEBUS, [("/VebusError", 0i64.into())]);
        let mut page = AlarmPage::new(AlarmKind::VebusError);
        page.setup(&bus, VEBUS);
        assert!(!page.urgent());
        assert_eq!(lines(&page, &bus), None);

        page.handle_change(VEBUS, "/VebusError", &BusValue::U16(17));
        assert!(page.urgent());
        assert_eq!(
            lines(&page, &bus),
            Some(["VE.Bus Error    ".to_string(), "#17No phase mast".to_string()])
        );

        page.key_pressed();
        assert!(!page.urgent());
        assert!(page.is_active());

        page.handle_change(VEBUS, "/VebusError", &BusValue::U16(18));
        assert!(page.urgent());
    }

    #[test]
    fn same_alarm_after_clearing_is_urgent_again() {
        let bus = MemoryBus::new().with_service(VEBUS, [("/Alarms/Overload", 2i64.into())]);
        let mut page = AlarmPage::new(AlarmKind::VebusAlarms);
        page.setup(&bus, VEBUS);
        assert!(page.urgent());
        assert_eq!(lines(&page, &bus).unwrap()[1], "Overload        ");
        page.key_pressed();
        assert!(!page.urgent());

        page.handle_change(VEBUS, "/Alarms/Overload", &BusValue::I64(0));
        assert!(!page.is_active());
        page.handle_change(VEBUS, "/Alarms/Overload", &BusValue::I64(2));
        assert!(page.urgent());
    }

    #[test]
    fn warnings_and_alarms_are_titled_by_severity() {
        let bus = MemoryBus::new().with_service(
            VEBUS,
            [
                ("/Alarms/LowBattery", 1i64.into()),
                ("/Alarms/HighTemperature", 1i64.into()),
            ],
        );
        let mut page = AlarmPage::new(AlarmKind::VebusAlarms);
        page.setup(&bus, VEBUS);
        assert_eq!(
            lines(&page, &bus),
            Some(["VE.Bus Warning  ".to_string(), "Low battery,High".to_string()])
        );
    }

    #[test]
    fn vanished_service_clears_alarm() {
        let bus = MemoryBus::new().with_service(
            "com.victronenergy.solarcharger.ttyS1",
            [("/ErrorCode", 33i64.into())],
        );
        let mut page = AlarmPage::new(AlarmKind::SolarError);
        page.setup(&bus, "com.victronenergy.solarcharger.ttyS1");
        assert!(page.urgent());
        page.cleanup(&bus, "com.victronenergy.solarcharger.ttyS1");
        assert!(!page.urgent());
        assert_eq!(lines(&page, &bus), None);
    }
}
