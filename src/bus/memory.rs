use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use serde::Deserialize;

use super::{Bus, BusEvent, BusValue, NetworkService, SubscriptionHandle};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct ServiceEntry {
    owner: String,
    items: BTreeMap<String, BusValue>,
}

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<String, ServiceEntry>,
    subscriptions: BTreeMap<SubscriptionHandle, (String, String)>,
    network: Vec<NetworkService>,
    network_failing: bool,
    failing: BTreeSet<String>,
    writes: Vec<(String, String, BusValue)>,
}

/// In-process bus used by tests and by `--debug` runs. Scripted services, recorded
/// writes, and an inspectable set of live subscriptions.
#[derive(Debug, Default)]
pub struct MemoryBus {
    state: RefCell<State>,
    next_id: Cell<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Scenario {
    services: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    network: Vec<NetworkService>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bus from a JSON scenario (`{"services": {...}, "network": [...]}`).
    pub fn from_scenario_json(raw: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_json::from_str(raw).map_err(|e| Error::Parse(format!("scenario: {e}")))?;
        let bus = Self::new();
        for (service, items) in scenario.services {
            bus.add_service(&service);
            for (path, value) in items {
                bus.set(&service, &path, json_to_bus_value(&value));
            }
        }
        bus.set_network(scenario.network);
        Ok(bus)
    }

    pub fn from_scenario_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_scenario_json(&raw)
    }

    /// Builder form of `add_service` + `set`.
    pub fn with_service<'a>(
        self,
        service: &str,
        items: impl IntoIterator<Item = (&'a str, BusValue)>,
    ) -> Self {
        self.add_service(service);
        for (path, value) in items {
            self.set(service, path, value);
        }
        self
    }

    /// Register a service name; returns the owner-change event the transport would emit.
    pub fn add_service(&self, service: &str) -> BusEvent {
        let owner = format!(":1.{}", self.bump());
        let mut state = self.state.borrow_mut();
        let entry = state.services.entry(service.to_string()).or_default();
        let old_owner = std::mem::replace(&mut entry.owner, owner.clone());
        BusEvent::NameOwnerChanged {
            name: service.to_string(),
            old_owner,
            new_owner: owner,
        }
    }

    /// Drop a service and all its items. `None` when it was not present.
    pub fn remove_service(&self, service: &str) -> Option<BusEvent> {
        let entry = self.state.borrow_mut().services.remove(service)?;
        Some(BusEvent::NameOwnerChanged {
            name: service.to_string(),
            old_owner: entry.owner,
            new_owner: String::new(),
        })
    }

    /// Store a value and return the change notification for it.
    pub fn set(&self, service: &str, path: &str, value: BusValue) -> BusEvent {
        let mut state = self.state.borrow_mut();
        let entry = state.services.entry(service.to_string()).or_default();
        entry.items.insert(path.to_string(), value.clone());
        BusEvent::PropertiesChanged {
            service: service.to_string(),
            path: path.to_string(),
            value: BusValue::dict([("Value", value)]),
        }
    }

    pub fn set_network(&self, services: Vec<NetworkService>) {
        self.state.borrow_mut().network = services;
    }

    /// Make every query against `service` fail as a transport error.
    pub fn fail_queries(&self, service: &str) {
        self.state.borrow_mut().failing.insert(service.to_string());
    }

    pub fn fail_network(&self, failing: bool) {
        self.state.borrow_mut().network_failing = failing;
    }

    pub fn active_subscriptions(&self, service: &str) -> usize {
        self.state
            .borrow()
            .subscriptions
            .values()
            .filter(|(s, _)| s == service)
            .count()
    }

    pub fn is_subscribed(&self, service: &str, path: &str) -> bool {
        self.state
            .borrow()
            .subscriptions
            .values()
            .any(|(s, p)| s == service && p == path)
    }

    pub fn writes(&self) -> Vec<(String, String, BusValue)> {
        self.state.borrow().writes.clone()
    }

    fn bump(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

impl Bus for MemoryBus {
    fn query(&self, service: &str, path: &str) -> Result<BusValue> {
        let state = self.state.borrow();
        if state.failing.contains(service) {
            return Err(Error::Bus(format!("{service}: injected failure")));
        }
        state
            .services
            .get(service)
            .and_then(|entry| entry.items.get(path))
            .cloned()
            .ok_or_else(|| Error::Bus(format!("{service}{path}: no such object")))
    }

    fn set_value(&self, service: &str, path: &str, value: BusValue) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(entry) = state.services.get_mut(service) else {
            return Err(Error::Bus(format!("{service}: no such service")));
        };
        entry.items.insert(path.to_string(), value.clone());
        state
            .writes
            .push((service.to_string(), path.to_string(), value));
        Ok(())
    }

    fn subscribe(&self, service: &str, path: &str) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle(self.bump());
        self.state
            .borrow_mut()
            .subscriptions
            .insert(handle, (service.to_string(), path.to_string()));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state.borrow_mut().subscriptions.remove(&handle);
    }

    fn list_services(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().services.keys().cloned().collect())
    }

    fn network_services(&self) -> Result<Vec<NetworkService>> {
        let state = self.state.borrow();
        if state.network_failing {
            return Err(Error::Bus("net.connman: not available".into()));
        }
        Ok(state.network.clone())
    }
}

fn json_to_bus_value(value: &serde_json::Value) -> BusValue {
    match value {
        serde_json::Value::Bool(b) => BusValue::Bool(*b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => BusValue::I64(i),
            (None, Some(u), _) => BusValue::U64(u),
            (_, _, Some(f)) => BusValue::Double(f),
            _ => BusValue::Other,
        },
        serde_json::Value::String(s) => BusValue::Str(s.clone()),
        serde_json::Value::Array(items) => {
            BusValue::Array(items.iter().map(json_to_bus_value).collect())
        }
        serde_json::Value::Object(map) => BusValue::Dict(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_bus_value(v)))
                .collect(),
        ),
        serde_json::Value::Null => BusValue::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM: &str = "com.victronenergy.system";

    #[test]
    fn scripted_values_are_queryable() {
        let bus = MemoryBus::new().with_service(SYSTEM, [("/Dc/Battery/Soc", 81.4.into())]);
        assert_eq!(
            bus.query(SYSTEM, "/Dc/Battery/Soc").unwrap(),
            BusValue::Double(81.4)
        );
        assert!(bus.query(SYSTEM, "/Nope").is_err());
        assert_eq!(bus.list_services().unwrap(), vec![SYSTEM.to_string()]);
    }

    #[test]
    fn tracks_subscriptions_and_writes() {
        let bus = MemoryBus::new().with_service(SYSTEM, []);
        let handle = bus.subscribe(SYSTEM, "/Dc/Battery/Soc").unwrap();
        assert!(bus.is_subscribed(SYSTEM, "/Dc/Battery/Soc"));
        bus.unsubscribe(handle);
        assert_eq!(bus.active_subscriptions(SYSTEM), 0);

        bus.set_value(SYSTEM, "/Relay/0/State", BusValue::I64(1))
            .unwrap();
        assert_eq!(bus.writes().len(), 1);
        assert!(bus
            .set_value("com.victronenergy.gone", "/X", BusValue::I64(1))
            .is_err());
    }

    #[test]
    fn remove_service_reports_vanished_owner() {
        let bus = MemoryBus::new();
        let appeared = bus.add_service(SYSTEM);
        let BusEvent::NameOwnerChanged { new_owner, .. } = appeared else {
            panic!("expected owner change");
        };
        let vanished = bus.remove_service(SYSTEM).unwrap();
        assert_eq!(
            vanished,
            BusEvent::NameOwnerChanged {
                name: SYSTEM.into(),
                old_owner: new_owner,
                new_owner: String::new(),
            }
        );
        assert!(bus.remove_service(SYSTEM).is_none());
    }

    #[test]
    fn scenario_json_maps_numbers_and_network() {
        let raw = r#"{
            "services": {
                "com.victronenergy.system": { "/Dc/Battery/Soc": 81.4, "/Dc/Battery/Power": -120 }
            },
            "network": [ { "path": "/net/connman/service/ethernet_1", "ipv4_method": "dhcp" } ]
        }"#;
        let bus = MemoryBus::from_scenario_json(raw).unwrap();
        assert_eq!(
            bus.query(SYSTEM, "/Dc/Battery/Power").unwrap(),
            BusValue::I64(-120)
        );
        let net = bus.network_services().unwrap();
        assert_eq!(net[0].ipv4_method.as_deref(), Some("dhcp"));
        assert!(MemoryBus::from_scenario_json("{\"bogus\": 1}").is_err());
    }
}
