//! Display pages: a closed set of page variants sharing one capability interface, the
//! collection that routes bus traffic to them, and line layout helpers.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::{
    bus::{Bus, BusValue, OwnerChange, ServiceClass},
    display::Display,
    tracker::{ChangeHook, PropertyCache, PropertyTracker},
    Result,
};

mod ac;
mod alarm;
mod battery;
mod metrics;
mod network;
mod solar;
mod status;

pub use ac::{AcPage, AcSide};
pub use alarm::{AlarmKind, AlarmPage};
pub use battery::BatteryPage;
pub use metrics::SystemMetrics;
pub use network::{NetworkKind, NetworkPage};
pub use solar::{mppt_state_name, SolarHistoryPage, SolarPage};
pub use status::StatusPage;

/// Placeholder shown when a page has nothing cached yet.
pub const NO_DATA: &str = "NO DATA";
pub const CHECK_CONNECTION: &str = "Check Connection";

/// Two rows of `(left, right)` fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageText {
    pub rows: [(String, String); 2],
}

impl PageText {
    pub fn new(
        top_left: impl Into<String>,
        top_right: impl Into<String>,
        bottom_left: impl Into<String>,
        bottom_right: impl Into<String>,
    ) -> Self {
        Self {
            rows: [
                (top_left.into(), top_right.into()),
                (bottom_left.into(), bottom_right.into()),
            ],
        }
    }

    /// The "no data" layout: `<title> NO DATA` / `Check Connection`.
    pub fn no_data(title: &str) -> Self {
        Self::new(title, NO_DATA, CHECK_CONNECTION, "")
    }

    pub fn lines(&self, cols: usize) -> [String; 2] {
        let [(tl, tr), (bl, br)] = &self.rows;
        [format_line(tl, tr, cols), format_line(bl, br, cols)]
    }
}

/// Lay out one row: `left` left-justified, `right` right-justified in the remaining space.
/// An over-long `left` is clipped to the row; `right` is cut when the two would overlap.
pub fn format_line(left: &str, right: &str, cols: usize) -> String {
    let left_len = left.chars().count();
    if left_len >= cols {
        return left.chars().take(cols).collect();
    }
    let pad = cols - left_len;
    let right_len = right.chars().count();
    if right_len > pad {
        let mut line = left.to_string();
        line.extend(right.chars().take(pad));
        line
    } else {
        format!("{left}{right:>pad$}")
    }
}

/// Read-only view handed to pages while they render.
pub struct PageContext<'a> {
    pub bus: &'a dyn Bus,
    pub metrics: &'a SystemMetrics,
    pub cols: usize,
}

/// Stable identity of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKey {
    Status,
    Battery,
    Solar,
    SolarHistory,
    Ac(AcSide),
    Network(NetworkKind),
    Alarm(AlarmKind),
}

/// Capability interface shared by every page variant.
pub trait PageView {
    fn key(&self) -> PageKey;

    /// Offer a service. Pages ignore names they do not recognize or when already bound.
    fn setup(&mut self, _bus: &dyn Bus, _service: &str) {}

    fn cleanup(&mut self, _bus: &dyn Bus, _service: &str) {}

    /// Route a change notification; returns whether the page consumed it.
    fn handle_change(&mut self, _service: &str, _path: &str, _value: &BusValue) -> bool {
        false
    }

    /// `Ok(None)` means "skip this page".
    fn get_text(&self, ctx: &PageContext<'_>) -> Result<Option<PageText>>;

    fn auto(&self) -> bool {
        true
    }

    fn volatile(&self) -> bool {
        true
    }

    fn urgent(&self) -> bool {
        false
    }

    fn key_pressed(&mut self) {}
}

/// Bus item a page tracks while bound.
#[derive(Debug, Clone, Copy)]
pub struct TrackedItem {
    pub path: &'static str,
    pub key: &'static str,
    pub hook: Option<ChangeHook>,
}

impl TrackedItem {
    pub const fn new(path: &'static str, key: &'static str) -> Self {
        Self {
            path,
            key,
            hook: None,
        }
    }

    pub const fn with_hook(path: &'static str, key: &'static str, hook: ChangeHook) -> Self {
        Self {
            path,
            key,
            hook: Some(hook),
        }
    }
}

/// A tracker bound to at most one service of a class at a time.
#[derive(Debug)]
pub struct ServiceBinding {
    class: ServiceClass,
    items: &'static [TrackedItem],
    bound: Option<String>,
    tracker: PropertyTracker,
}

impl ServiceBinding {
    pub fn new(class: ServiceClass, items: &'static [TrackedItem]) -> Self {
        Self {
            class,
            items,
            bound: None,
            tracker: PropertyTracker::new(),
        }
    }

    /// Bind to `service` if it is of our class and nothing is bound yet.
    pub fn setup(&mut self, bus: &dyn Bus, service: &str) -> bool {
        if self.bound.is_some() || !self.class.matches(service) {
            return false;
        }
        for item in self.items {
            match item.hook {
                Some(hook) => self
                    .tracker
                    .track_with(bus, service, item.path, item.key, hook),
                None => self.tracker.track(bus, service, item.path, item.key),
            }
        }
        debug!("bound {service} ({} items)", self.items.len());
        self.bound = Some(service.to_string());
        true
    }

    pub fn cleanup(&mut self, bus: &dyn Bus, service: &str) -> bool {
        if self.bound.as_deref() != Some(service) {
            return false;
        }
        self.tracker.cleanup(bus, service);
        self.bound = None;
        true
    }

    pub fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.tracker.handle_change(service, path, value)
    }

    pub fn service(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn cache(&self) -> &PropertyCache {
        self.tracker.cache()
    }

    pub fn cache_mut(&mut self) -> &mut PropertyCache {
        self.tracker.cache_mut()
    }
}

/// One concrete page.
#[derive(Debug)]
pub enum Page {
    Status(StatusPage),
    Battery(BatteryPage),
    Solar(SolarPage),
    SolarHistory(SolarHistoryPage),
    Ac(AcPage),
    Network(NetworkPage),
    Alarm(AlarmPage),
}

impl Page {
    fn view(&self) -> &dyn PageView {
        match self {
            Page::Status(p) => p,
            Page::Battery(p) => p,
            Page::Solar(p) => p,
            Page::SolarHistory(p) => p,
            Page::Ac(p) => p,
            Page::Network(p) => p,
            Page::Alarm(p) => p,
        }
    }

    fn view_mut(&mut self) -> &mut dyn PageView {
        match self {
            Page::Status(p) => p,
            Page::Battery(p) => p,
            Page::Solar(p) => p,
            Page::SolarHistory(p) => p,
            Page::Ac(p) => p,
            Page::Network(p) => p,
            Page::Alarm(p) => p,
        }
    }

    /// Render onto `target`. Returns false when the page skipped or failed; faults are
    /// logged and never escape.
    pub fn display(&self, ctx: &PageContext<'_>, target: &mut dyn Display) -> bool {
        let text = match self.get_text(ctx) {
            Ok(Some(text)) => text,
            Ok(None) => return false,
            Err(err) => {
                warn!("page {:?} failed to render: {err}", self.key());
                return false;
            }
        };
        for (row, line) in text.lines(ctx.cols).iter().enumerate() {
            if let Err(err) = target.display_string(line, row as u8) {
                warn!("display write failed on page {:?}: {err}", self.key());
                return false;
            }
        }
        true
    }
}

impl PageView for Page {
    fn key(&self) -> PageKey {
        self.view().key()
    }

    fn setup(&mut self, bus: &dyn Bus, service: &str) {
        self.view_mut().setup(bus, service)
    }

    fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        self.view_mut().cleanup(bus, service)
    }

    fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) -> bool {
        self.view_mut().handle_change(service, path, value)
    }

    fn get_text(&self, ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        self.view().get_text(ctx)
    }

    fn auto(&self) -> bool {
        self.view().auto()
    }

    fn volatile(&self) -> bool {
        self.view().volatile()
    }

    fn urgent(&self) -> bool {
        self.view().urgent()
    }

    fn key_pressed(&mut self) {
        self.view_mut().key_pressed()
    }
}

/// The ordered page list plus the shared metrics source and the set of services
/// currently on the bus.
#[derive(Debug)]
pub struct PageSet {
    pages: Vec<Page>,
    metrics: SystemMetrics,
    known_services: BTreeSet<String>,
}

impl PageSet {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            metrics: SystemMetrics::new(),
            known_services: BTreeSet::new(),
        }
    }

    /// Rotation order used on the appliance.
    pub fn standard() -> Self {
        Self::new(vec![
            Page::Status(StatusPage),
            Page::Battery(BatteryPage::new()),
            Page::Solar(SolarPage::new()),
            Page::Ac(AcPage::new(AcSide::In, "L1")),
            Page::Ac(AcPage::new(AcSide::Out, "L1")),
            Page::SolarHistory(SolarHistoryPage::new()),
            Page::Network(NetworkPage::new(NetworkKind::Lan)),
            Page::Network(NetworkPage::new(NetworkKind::Wifi)),
            Page::Alarm(AlarmPage::new(AlarmKind::VebusError)),
            Page::Alarm(AlarmPage::new(AlarmKind::VebusAlarms)),
            Page::Alarm(AlarmPage::new(AlarmKind::SolarError)),
        ])
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub fn find(&self, key: PageKey) -> Option<usize> {
        self.pages.iter().position(|p| p.key() == key)
    }

    pub fn metrics(&self) -> &SystemMetrics {
        &self.metrics
    }

    pub fn context<'a>(&'a self, bus: &'a dyn Bus, cols: usize) -> PageContext<'a> {
        PageContext {
            bus,
            metrics: &self.metrics,
            cols,
        }
    }

    /// Render page `index`; false on skip or when there is no such page.
    pub fn display(
        &self,
        index: usize,
        bus: &dyn Bus,
        target: &mut dyn Display,
    ) -> bool {
        let ctx = self.context(bus, target.cols());
        self.pages
            .get(index)
            .is_some_and(|page| page.display(&ctx, target))
    }

    /// Bind every currently registered service. Failures listing the bus are logged.
    pub fn discover(&mut self, bus: &dyn Bus) {
        match bus.list_services() {
            Ok(services) => {
                for service in services {
                    self.setup(bus, &service);
                }
            }
            Err(err) => warn!("listing bus services failed: {err}"),
        }
    }

    pub fn setup(&mut self, bus: &dyn Bus, service: &str) {
        if ServiceClass::of(service).is_none() {
            return;
        }
        self.known_services.insert(service.to_string());
        self.metrics.setup(bus, service);
        for page in &mut self.pages {
            page.setup(bus, service);
        }
    }

    /// Unbind `service` everywhere, then let freed pages pick up a remaining service of the
    /// same class.
    pub fn cleanup(&mut self, bus: &dyn Bus, service: &str) {
        self.known_services.remove(service);
        self.metrics.cleanup(bus, service);
        for page in &mut self.pages {
            page.cleanup(bus, service);
        }
        let remaining: Vec<String> = self.known_services.iter().cloned().collect();
        for other in remaining {
            self.metrics.setup(bus, &other);
            for page in &mut self.pages {
                page.setup(bus, &other);
            }
        }
    }

    pub fn handle_change(&mut self, service: &str, path: &str, value: &BusValue) {
        let mut consumed = self.metrics.handle_change(service, path, value);
        for page in &mut self.pages {
            consumed |= page.handle_change(service, path, value);
        }
        if !consumed {
            debug!("unrouted change {service}{path}");
        }
    }

    pub fn owner_changed(&mut self, bus: &dyn Bus, name: &str, old_owner: &str, new_owner: &str) {
        match OwnerChange::classify(old_owner, new_owner) {
            OwnerChange::Appeared => self.setup(bus, name),
            OwnerChange::Vanished => self.cleanup(bus, name),
            OwnerChange::Replaced => {
                self.cleanup(bus, name);
                self.setup(bus, name);
            }
            OwnerChange::Unchanged => {}
        }
    }

    /// First page currently demanding exclusive display.
    pub fn urgent_index(&self) -> Option<usize> {
        self.pages.iter().position(Page::urgent)
    }

    pub fn key_pressed(&mut self, index: usize) {
        if let Some(page) = self.pages.get_mut(index) {
            page.key_pressed();
        }
    }
}
