//! System bus collaborator: the typed wire values a backend service publishes, the
//! events the dispatcher receives, and the trait every transport implements.

use serde::Deserialize;

use crate::Result;

#[cfg(feature = "dbus")]
pub mod dbus;
pub mod memory;

/// Well-known name prefix shared by every backend service on the appliance.
pub const SERVICE_NAMESPACE: &str = "com.victronenergy";
/// Interface carrying `GetValue`/`SetValue` and the `PropertiesChanged` signal.
pub const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

/// A value as it arrives from the transport, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Byte(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    Str(String),
    Array(Vec<BusValue>),
    Dict(Vec<(String, BusValue)>),
    /// Any composite the transport could not map (structs, object paths, fds).
    Other,
}

impl BusValue {
    pub fn dict(entries: impl IntoIterator<Item = (impl Into<String>, BusValue)>) -> Self {
        BusValue::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a member of a dictionary value.
    pub fn member(&self, name: &str) -> Option<&BusValue> {
        match self {
            BusValue::Dict(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i64> for BusValue {
    fn from(value: i64) -> Self {
        BusValue::I64(value)
    }
}

impl From<f64> for BusValue {
    fn from(value: f64) -> Self {
        BusValue::Double(value)
    }
}

impl From<&str> for BusValue {
    fn from(value: &str) -> Self {
        BusValue::Str(value.to_string())
    }
}

impl From<String> for BusValue {
    fn from(value: String) -> Self {
        BusValue::Str(value)
    }
}

/// Opaque token for one live signal subscription; handed back to `Bus::unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Something the transport delivers to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    PropertiesChanged {
        service: String,
        path: String,
        value: BusValue,
    },
    NameOwnerChanged {
        name: String,
        old_owner: String,
        new_owner: String,
    },
}

/// What a name-owner change means for pages bound to that name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerChange {
    Appeared,
    Vanished,
    Replaced,
    Unchanged,
}

impl OwnerChange {
    pub fn classify(old_owner: &str, new_owner: &str) -> Self {
        match (old_owner.is_empty(), new_owner.is_empty()) {
            (true, false) => OwnerChange::Appeared,
            (false, true) => OwnerChange::Vanished,
            (false, false) if old_owner != new_owner => OwnerChange::Replaced,
            _ => OwnerChange::Unchanged,
        }
    }
}

/// Device class of a backend service, derived from its well-known name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceClass {
    System,
    VeBus,
    SolarCharger,
    Settings,
    Notifications,
    Payg,
}

impl ServiceClass {
    fn segment(self) -> &'static str {
        match self {
            ServiceClass::System => "system",
            ServiceClass::VeBus => "vebus",
            ServiceClass::SolarCharger => "solarcharger",
            ServiceClass::Settings => "settings",
            ServiceClass::Notifications => "notifications",
            ServiceClass::Payg => "paygo",
        }
    }

    /// Singleton services are matched exactly, device services by `<class>.` prefix.
    pub fn matches(self, service: &str) -> bool {
        let Some(rest) = service
            .strip_prefix(SERVICE_NAMESPACE)
            .and_then(|r| r.strip_prefix('.'))
        else {
            return false;
        };
        let segment = self.segment();
        match self {
            ServiceClass::VeBus | ServiceClass::SolarCharger => rest
                .strip_prefix(segment)
                .is_some_and(|tail| tail.starts_with('.') && tail.len() > 1),
            _ => rest == segment,
        }
    }

    pub fn of(service: &str) -> Option<Self> {
        [
            ServiceClass::System,
            ServiceClass::VeBus,
            ServiceClass::SolarCharger,
            ServiceClass::Settings,
            ServiceClass::Notifications,
            ServiceClass::Payg,
        ]
        .into_iter()
        .find(|class| class.matches(service))
    }

    /// Full well-known name for singleton classes.
    pub fn service_name(self) -> String {
        format!("{SERVICE_NAMESPACE}.{}", self.segment())
    }
}

/// IP parameters of one network-manager service (ethernet or wifi).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkService {
    pub path: String,
    pub ipv4_method: Option<String>,
    pub ipv4_address: Option<String>,
    pub ipv6_method: Option<String>,
    pub ipv6_address: Option<String>,
}

/// Transport seen by the rest of the crate. All calls are expected to return quickly
/// or fail fast; nothing here retries.
pub trait Bus {
    /// Synchronous read of one bus item.
    fn query(&self, service: &str, path: &str) -> Result<BusValue>;

    fn set_value(&self, service: &str, path: &str, value: BusValue) -> Result<()>;

    /// Register interest in change notifications for `path` on `service`.
    fn subscribe(&self, service: &str, path: &str) -> Result<SubscriptionHandle>;

    fn unsubscribe(&self, handle: SubscriptionHandle);

    fn list_services(&self) -> Result<Vec<String>>;

    /// Services known to the network manager, with their IP parameters.
    fn network_services(&self) -> Result<Vec<NetworkService>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_device_and_singleton_services() {
        assert_eq!(
            ServiceClass::of("com.victronenergy.vebus.ttyS3"),
            Some(ServiceClass::VeBus)
        );
        assert_eq!(
            ServiceClass::of("com.victronenergy.solarcharger.ttyS1"),
            Some(ServiceClass::SolarCharger)
        );
        assert_eq!(
            ServiceClass::of("com.victronenergy.system"),
            Some(ServiceClass::System)
        );
        assert_eq!(ServiceClass::of("com.victronenergy.systemd"), None);
        assert_eq!(ServiceClass::of("com.victronenergy.vebus"), None);
        assert_eq!(ServiceClass::of("org.freedesktop.DBus"), None);
    }

    #[test]
    fn owner_change_classification() {
        assert_eq!(OwnerChange::classify("", ":1.4"), OwnerChange::Appeared);
        assert_eq!(OwnerChange::classify(":1.4", ""), OwnerChange::Vanished);
        assert_eq!(OwnerChange::classify(":1.4", ":1.9"), OwnerChange::Replaced);
        assert_eq!(OwnerChange::classify(":1.4", ":1.4"), OwnerChange::Unchanged);
    }

    #[test]
    fn dict_member_lookup() {
        let value = BusValue::dict([("Value", BusValue::I32(3)), ("Text", "3".into())]);
        assert_eq!(value.member("Value"), Some(&BusValue::I32(3)));
        assert_eq!(value.member("Missing"), None);
        assert_eq!(BusValue::I32(1).member("Value"), None);
    }
}
