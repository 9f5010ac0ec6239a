//! Pay-as-you-go activation backend. Every call reads the bus afresh; nothing is cached.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::{
    bus::{Bus, BusValue, ServiceClass},
    tracker::{coerce, PropertyValue},
    Result,
};

pub const DEFAULT_LVD_VOLTS: f64 = 11.5;

const SECS_PER_DAY: f64 = 86_400.0;
const SECS_PER_HOUR: f64 = 3_600.0;

/// Outcome of writing a token to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    AlreadyUsed,
    Invalid,
}

impl TokenStatus {
    fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => TokenStatus::Valid,
            Some(-2) => TokenStatus::AlreadyUsed,
            _ => TokenStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaygService {
    service: String,
}

impl Default for PaygService {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_secs(now: SystemTime) -> f64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn truthy(value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Int(v) => *v != 0,
        PropertyValue::Float(v) => *v != 0.0,
        PropertyValue::Text(s) => !s.is_empty(),
    }
}

impl PaygService {
    pub fn new() -> Self {
        Self {
            service: ServiceClass::Payg.service_name(),
        }
    }

    fn read(&self, bus: &dyn Bus, path: &str) -> Option<PropertyValue> {
        match bus.query(&self.service, path) {
            Ok(value) => coerce(&value),
            Err(err) => {
                debug!("payg read {path}: {err}");
                None
            }
        }
    }

    fn read_f64(&self, bus: &dyn Bus, path: &str) -> Option<f64> {
        self.read(bus, path).as_ref().and_then(PropertyValue::as_f64)
    }

    pub fn service_available(&self, bus: &dyn Bus) -> bool {
        self.read(bus, "/Status/PaygoEnabled").is_some()
    }

    pub fn is_active(&self, bus: &dyn Bus) -> bool {
        self.read(bus, "/Status/CurrentlyActive")
            .as_ref()
            .is_some_and(truthy)
    }

    /// Devices without the setting behave as if PAYG were enabled.
    pub fn is_payg_enabled(&self, bus: &dyn Bus) -> bool {
        self.read(bus, "/Status/PaygoEnabled")
            .as_ref()
            .map_or(true, truthy)
    }

    fn blocked_for_secs(&self, bus: &dyn Bus, now: SystemTime) -> Option<f64> {
        let until = self.read_f64(bus, "/Tokens/EntryBlockedUntilDate")?;
        Some(until - unix_secs(now))
    }

    pub fn token_entry_allowed(&self, bus: &dyn Bus, now: SystemTime) -> bool {
        self.blocked_for_secs(bus, now).map_or(true, |left| left <= 0.0)
    }

    pub fn minutes_of_token_block(&self, bus: &dyn Bus, now: SystemTime) -> i64 {
        match self.blocked_for_secs(bus, now) {
            Some(left) if left > 0.0 => (left / 60.0).round() as i64,
            _ => 0,
        }
    }

    /// Remaining entitlement as whole days plus rounded hours.
    pub fn days_and_hours_left(&self, bus: &dyn Bus, now: SystemTime) -> (i64, i64) {
        let Some(until) = self.read_f64(bus, "/Status/ActiveUntilDate") else {
            return (0, 0);
        };
        let left = until - unix_secs(now);
        if left <= 0.0 {
            return (0, 0);
        }
        let mut days = (left / SECS_PER_DAY).floor() as i64;
        let mut hours = ((left % SECS_PER_DAY) / SECS_PER_HOUR).round() as i64;
        if hours == 24 {
            days += 1;
            hours = 0;
        }
        (days, hours)
    }

    /// Write the typed code and read back the backend's verdict.
    pub fn submit_token(&self, bus: &dyn Bus, code: &str) -> TokenStatus {
        let normalized = code
            .parse::<u64>()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| code.to_string());
        if let Err(err) = bus.set_value(&self.service, "/Tokens/Last", BusValue::Str(normalized)) {
            warn!("token write failed: {err}");
            return TokenStatus::Invalid;
        }
        let code = self
            .read(bus, "/Tokens/LastTokenValid")
            .as_ref()
            .and_then(PropertyValue::as_i64);
        TokenStatus::from_code(code)
    }

    pub fn lvd_threshold(&self, bus: &dyn Bus) -> f64 {
        self.read_f64(bus, "/LVD/Threshold")
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_LVD_VOLTS)
    }

    pub fn set_lvd_threshold(&self, bus: &dyn Bus, volts: f64) -> Result<()> {
        bus.set_value(
            &self.service,
            "/LVD/Threshold",
            BusValue::Double(volts),
        )
    }
}
