//! Live property cache bound to bus subscriptions.
//!
//! Each [`PropertyTracker`] owns one [`PropertyCache`] namespace and remembers, per
//! originating service, every subscription it registered so that a vanished service
//! can be torn down in one call.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::bus::{Bus, BusValue, SubscriptionHandle};

/// A coerced scalar. "No data" is represented by `Option::None` around it.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }

    /// Integers, and floats without a fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Normalize a wire value. Scalars survive, `{Value: scalar}` unwraps, everything else
/// is absent.
pub fn coerce(value: &BusValue) -> Option<PropertyValue> {
    match value {
        BusValue::Byte(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::Bool(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::I16(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::U16(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::I32(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::U32(v) => Some(PropertyValue::Int(i64::from(*v))),
        BusValue::I64(v) => Some(PropertyValue::Int(*v)),
        BusValue::U64(v) => Some(match i64::try_from(*v) {
            Ok(v) => PropertyValue::Int(v),
            Err(_) => PropertyValue::Float(*v as f64),
        }),
        BusValue::Double(v) => Some(PropertyValue::Float(*v)),
        BusValue::Str(s) => Some(PropertyValue::Text(s.clone())),
        BusValue::Dict(_) => match value.member("Value") {
            Some(inner @ (BusValue::Dict(_) | BusValue::Array(_))) => {
                debug!("nested composite under Value ({inner:?}) treated as absent");
                None
            }
            Some(inner) => coerce(inner),
            None => None,
        },
        BusValue::Array(_) | BusValue::Other => None,
    }
}

/// Key/value store of one tracker. A missing key and a key set to `None` read the same.
#[derive(Debug, Clone, Default)]
pub struct PropertyCache {
    entries: HashMap<String, Option<PropertyValue>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    pub fn set(&mut self, key: &str, value: Option<PropertyValue>) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropertyValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Called for every update of a tracked key, including the reset on cleanup.
pub type ChangeHook = fn(&mut PropertyCache, &str, Option<PropertyValue>);

fn store(cache: &mut PropertyCache, key: &str, value: Option<PropertyValue>) {
    cache.set(key, value);
}

#[derive(Debug)]
struct Watch {
    path: String,
    key: String,
    handle: Option<SubscriptionHandle>,
    hook: ChangeHook,
}

#[derive(Debug, Default)]
pub struct PropertyTracker {
    cache: PropertyCache,
    watches: BTreeMap<String, Vec<Watch>>,
}

impl PropertyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PropertyCache {
        &mut self.cache
    }

    /// Seed `key` from `service`/`path` and subscribe to later changes.
    pub fn track(&mut self, bus: &dyn Bus, service: &str, path: &str, key: &str) {
        self.track_with(bus, service, path, key, store);
    }

    pub fn track_with(
        &mut self,
        bus: &dyn Bus,
        service: &str,
        path: &str,
        key: &str,
        hook: ChangeHook,
    ) {
        let seeded = match bus.query(service, path) {
            Ok(value) => coerce(&value),
            Err(err) => {
                debug!("seed {service}{path} -> absent: {err}");
                None
            }
        };
        hook(&mut self.cache, key, seeded);

        let handle = match bus.subscribe(service, path) {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!("subscribe {service}{path} failed: {err}");
                None
            }
        };
        self.watches
            .entry(service.to_string())
            .or_default()
            .push(Watch {
                path: path.to_string(),
                key: key.to_string(),
                handle,
                hook,
            });
    }

    /// Apply a change notification. Returns whether any watch consumed it.
    pub fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        let Some(watches) = self.watches.get(service) else {
            return false;
        };
        let mut matched = false;
        for watch in watches.iter().filter(|w| w.path == path) {
            (watch.hook)(&mut self.cache, &watch.key, coerce(value));
            matched = true;
        }
        matched
    }

    /// Drop every subscription registered for `service` and reset its keys to absent.
    pub fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        let Some(watches) = self.watches.remove(service) else {
            return;
        };
        for watch in watches {
            if let Some(handle) = watch.handle {
                bus.unsubscribe(handle);
            }
            (watch.hook)(&mut self.cache, &watch.key, None);
        }
    }

    pub fn is_tracking(&self, service: &str) -> bool {
        self.watches.contains_key(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.watches.keys().map(String::as_str)
    }

    pub fn subscription_count(&self) -> usize {
        self.watches.values().map(Vec::len).sum()
    }
}
