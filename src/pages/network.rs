use log::debug;

use crate::{bus::NetworkService, Result};

use super::{PageContext, PageKey, PageText, PageView};

const SERVICE_PATH_PREFIX: &str = "/net/connman/service/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    Lan,
    Wifi,
}

impl NetworkKind {
    fn title(self) -> &'static str {
        match self {
            NetworkKind::Lan => "LAN IP:",
            NetworkKind::Wifi => "WIFI IP:",
        }
    }

    fn technology(self) -> &'static str {
        match self {
            NetworkKind::Lan => "ethernet",
            NetworkKind::Wifi => "wifi",
        }
    }
}

/// IP method and address of the ethernet or wifi interface, queried fresh each render.
#[derive(Debug)]
pub struct NetworkPage {
    kind: NetworkKind,
}

impl NetworkPage {
    pub fn new(kind: NetworkKind) -> Self {
        Self { kind }
    }

    fn merged(&self, services: Vec<NetworkService>) -> NetworkService {
        let prefix = format!("{SERVICE_PATH_PREFIX}{}", self.kind.technology());
        let mut merged = NetworkService::default();
        for service in services.into_iter().filter(|s| s.path.starts_with(&prefix)) {
            merged.ipv4_method = service.ipv4_method.or(merged.ipv4_method);
            merged.ipv4_address = service.ipv4_address.or(merged.ipv4_address);
            merged.ipv6_method = service.ipv6_method.or(merged.ipv6_method);
            merged.ipv6_address = service.ipv6_address.or(merged.ipv6_address);
        }
        merged
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl PageView for NetworkPage {
    fn key(&self) -> PageKey {
        PageKey::Network(self.kind)
    }

    fn get_text(&self, ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        let services = match ctx.bus.network_services() {
            Ok(services) => services,
            Err(err) => {
                debug!("{}: network services unavailable: {err}", self.kind.title());
                return Ok(None);
            }
        };
        let params = self.merged(services);
        // IPv6 is reported whenever connman configures it at all.
        let (method, address) = match (params.ipv6_method, params.ipv4_method) {
            (Some(v6), _) => (v6, params.ipv6_address),
            (None, Some(v4)) => (v4, params.ipv4_address),
            (None, None) => return Ok(None),
        };
        Ok(Some(match non_empty(address) {
            Some(address) => PageText::new(self.kind.title(), method, address, ""),
            None => PageText::new(self.kind.title(), method, "", "Not Connected"),
        }))
    }
}
