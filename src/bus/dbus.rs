//! System-bus transport over zbus. Calls go out on the caller's thread; two pump threads
//! turn `PropertiesChanged` and `NameOwnerChanged` signals into `BusEvent`s.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
};

use log::{debug, info, warn};
use zbus::{
    blocking::{fdo::DBusProxy, Connection, MessageIterator},
    zvariant::{OwnedObjectPath, OwnedValue, Value},
    MatchRule,
};

use super::{
    Bus, BusEvent, BusValue, NetworkService, SubscriptionHandle, BUS_ITEM_INTERFACE,
    SERVICE_NAMESPACE,
};
use crate::{Error, Result};

const CONNMAN_BUS: &str = "net.connman";
const CONNMAN_MANAGER: &str = "net.connman.Manager";

#[derive(Debug, Default)]
struct Routes {
    subscriptions: HashMap<SubscriptionHandle, (String, String)>,
    wanted: HashSet<(String, String)>,
    /// Unique connection name -> well-known service name.
    owners: HashMap<String, String>,
}

impl Routes {
    fn rebuild_wanted(&mut self) {
        self.wanted = self.subscriptions.values().cloned().collect();
    }
}

pub struct DbusBus {
    conn: Connection,
    routes: Arc<Mutex<Routes>>,
    next_id: AtomicU64,
}

fn bus_err(context: &str) -> impl Fn(zbus::Error) -> Error + '_ {
    move |e| Error::Bus(format!("{context}: {e}"))
}

fn fdo_err(context: &str) -> impl Fn(zbus::fdo::Error) -> Error + '_ {
    move |e| Error::Bus(format!("{context}: {e}"))
}

impl DbusBus {
    pub fn system() -> Result<Self> {
        let conn = Connection::system().map_err(bus_err("dbus system connect"))?;
        info!("connected to the system bus");
        Ok(Self {
            conn,
            routes: Arc::new(Mutex::new(Routes::default())),
            next_id: AtomicU64::new(1),
        })
    }

    /// Start the signal pumps. `forward` returns false once the receiver is gone, which
    /// ends the pump.
    pub fn spawn_pump<F>(&self, forward: F) -> Result<()>
    where
        F: Fn(BusEvent) -> bool + Send + Clone + 'static,
    {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(BUS_ITEM_INTERFACE)
            .map_err(bus_err("match rule"))?
            .member("PropertiesChanged")
            .map_err(bus_err("match rule"))?
            .build();
        let signals = MessageIterator::for_match_rule(rule, &self.conn, None)
            .map_err(bus_err("subscribe PropertiesChanged"))?;
        let routes = Arc::clone(&self.routes);
        let send = forward.clone();
        thread::Builder::new()
            .name("bus-properties".into())
            .spawn(move || pump_properties(signals, &routes, send))?;

        let proxy = DBusProxy::new(&self.conn).map_err(bus_err("dbus proxy"))?;
        let owners = proxy
            .receive_name_owner_changed()
            .map_err(bus_err("subscribe NameOwnerChanged"))?;
        let routes = Arc::clone(&self.routes);
        thread::Builder::new()
            .name("bus-owners".into())
            .spawn(move || {
                for signal in owners {
                    let Ok(args) = signal.args() else { continue };
                    let name = args.name().to_string();
                    if !name.starts_with(SERVICE_NAMESPACE) {
                        continue;
                    }
                    let old_owner = args
                        .old_owner()
                        .iter()
                        .map(ToString::to_string)
                        .next()
                        .unwrap_or_default();
                    let new_owner = args
                        .new_owner()
                        .iter()
                        .map(ToString::to_string)
                        .next()
                        .unwrap_or_default();
                    if let Ok(mut routes) = routes.lock() {
                        routes.owners.remove(&old_owner);
                        if !new_owner.is_empty() {
                            routes.owners.insert(new_owner.clone(), name.clone());
                        }
                    }
                    let event = BusEvent::NameOwnerChanged {
                        name,
                        old_owner,
                        new_owner,
                    };
                    if !forward(event) {
                        break;
                    }
                }
                debug!("owner pump stopped");
            })?;
        Ok(())
    }

    fn learn_owner(&self, service: &str) {
        let owner = self
            .conn
            .call_method(
                Some("org.freedesktop.DBus"),
                "/org/freedesktop/DBus",
                Some("org.freedesktop.DBus"),
                "GetNameOwner",
                &(service,),
            )
            .and_then(|reply| reply.body().deserialize::<String>());
        match owner {
            Ok(unique) => {
                if let Ok(mut routes) = self.routes.lock() {
                    routes.owners.insert(unique, service.to_string());
                }
            }
            Err(err) => debug!("no owner for {service}: {err}"),
        }
    }
}

fn pump_properties<F>(signals: MessageIterator, routes: &Mutex<Routes>, forward: F)
where
    F: Fn(BusEvent) -> bool,
{
    for msg in signals {
        let Ok(msg) = msg else { continue };
        let header = msg.header();
        let (Some(sender), Some(path)) = (header.sender(), header.path()) else {
            continue;
        };
        let target = match routes.lock() {
            Ok(routes) => routes
                .owners
                .get(sender.as_str())
                .filter(|service| {
                    routes
                        .wanted
                        .contains(&(service.to_string(), path.as_str().to_string()))
                })
                .cloned(),
            Err(_) => None,
        };
        let Some(service) = target else { continue };
        let Ok(changes) = msg.body().deserialize::<HashMap<String, OwnedValue>>() else {
            continue;
        };
        let Some(value) = changes.get("Value") else { continue };
        let event = BusEvent::PropertiesChanged {
            service,
            path: path.as_str().to_string(),
            value: to_bus_value(value),
        };
        if !forward(event) {
            break;
        }
    }
    debug!("property pump stopped");
}

/// Scalars map one to one; composites coerce to absent later, so they are not unpacked.
fn to_bus_value(value: &Value<'_>) -> BusValue {
    match value {
        Value::U8(v) => BusValue::Byte(*v),
        Value::Bool(v) => BusValue::Bool(*v),
        Value::I16(v) => BusValue::I16(*v),
        Value::U16(v) => BusValue::U16(*v),
        Value::I32(v) => BusValue::I32(*v),
        Value::U32(v) => BusValue::U32(*v),
        Value::I64(v) => BusValue::I64(*v),
        Value::U64(v) => BusValue::U64(*v),
        Value::F64(v) => BusValue::Double(*v),
        Value::Str(s) => BusValue::Str(s.as_str().to_string()),
        Value::Value(inner) => to_bus_value(inner),
        _ => BusValue::Other,
    }
}

fn to_variant(value: &BusValue) -> Value<'static> {
    match value {
        BusValue::Byte(v) => Value::U8(*v),
        BusValue::Bool(v) => Value::Bool(*v),
        BusValue::I16(v) => Value::I16(*v),
        BusValue::U16(v) => Value::U16(*v),
        BusValue::I32(v) => Value::I32(*v),
        BusValue::U32(v) => Value::U32(*v),
        BusValue::I64(v) => Value::I64(*v),
        BusValue::U64(v) => Value::U64(*v),
        BusValue::Double(v) => Value::F64(*v),
        BusValue::Str(s) => Value::from(s.clone()),
        BusValue::Array(_) | BusValue::Dict(_) | BusValue::Other => Value::from(Vec::<i32>::new()),
    }
}

fn ip_params(props: &HashMap<String, OwnedValue>, key: &str) -> (Option<String>, Option<String>) {
    let Some(raw) = props.get(key) else {
        return (None, None);
    };
    let Ok(owned) = raw.try_clone() else {
        return (None, None);
    };
    let Ok(dict) = HashMap::<String, OwnedValue>::try_from(owned) else {
        return (None, None);
    };
    let text = |field: &str| {
        dict.get(field)
            .and_then(|v| <&str>::try_from(v).ok())
            .map(str::to_string)
    };
    (text("Method"), text("Address"))
}

impl Bus for DbusBus {
    fn query(&self, service: &str, path: &str) -> Result<BusValue> {
        let reply = self
            .conn
            .call_method(Some(service), path, Some(BUS_ITEM_INTERFACE), "GetValue", &())
            .map_err(bus_err("GetValue"))?;
        let value: OwnedValue = reply
            .body()
            .deserialize()
            .map_err(bus_err("GetValue reply"))?;
        Ok(to_bus_value(&value))
    }

    fn set_value(&self, service: &str, path: &str, value: BusValue) -> Result<()> {
        let variant = to_variant(&value);
        self.conn
            .call_method(
                Some(service),
                path,
                Some(BUS_ITEM_INTERFACE),
                "SetValue",
                &variant,
            )
            .map_err(bus_err("SetValue"))?;
        Ok(())
    }

    fn subscribe(&self, service: &str, path: &str) -> Result<SubscriptionHandle> {
        let known = self
            .routes
            .lock()
            .map(|routes| routes.owners.values().any(|s| s == service))
            .unwrap_or(false);
        if !known {
            self.learn_owner(service);
        }
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut routes = self
            .routes
            .lock()
            .map_err(|_| Error::Bus("subscription table poisoned".into()))?;
        routes
            .subscriptions
            .insert(handle, (service.to_string(), path.to_string()));
        routes.rebuild_wanted();
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        match self.routes.lock() {
            Ok(mut routes) => {
                if let Some((service, _)) = routes.subscriptions.remove(&handle) {
                    routes.rebuild_wanted();
                    if !routes.wanted.iter().any(|(s, _)| *s == service) {
                        routes.owners.retain(|_, s| *s != service);
                    }
                }
            }
            Err(_) => warn!("subscription table poisoned; dropping {handle:?}"),
        }
    }

    fn list_services(&self) -> Result<Vec<String>> {
        let proxy = DBusProxy::new(&self.conn).map_err(bus_err("dbus proxy"))?;
        let names = proxy.list_names().map_err(fdo_err("ListNames"))?;
        Ok(names
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name.starts_with(SERVICE_NAMESPACE))
            .collect())
    }

    fn network_services(&self) -> Result<Vec<NetworkService>> {
        let reply = self
            .conn
            .call_method(Some(CONNMAN_BUS), "/", Some(CONNMAN_MANAGER), "GetServices", &())
            .map_err(bus_err("GetServices"))?;
        let services: Vec<(OwnedObjectPath, HashMap<String, OwnedValue>)> = reply
            .body()
            .deserialize()
            .map_err(bus_err("GetServices reply"))?;
        Ok(services
            .into_iter()
            .map(|(path, props)| {
                let (ipv4_method, ipv4_address) = ip_params(&props, "IPv4");
                let (ipv6_method, ipv6_address) = ip_params(&props, "IPv6");
                NetworkService {
                    path: path.as_str().to_string(),
                    ipv4_method,
                    ipv4_address,
                    ipv6_method,
                    ipv6_address,
                }
            })
            .collect())
    }
}
