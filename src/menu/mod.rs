//! Four-button controller: a two-row scrolling list of entries, each of which can take
//! over the display and the keys until it hands control back.

use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use crate::{
    app::input::Key,
    bus::Bus,
    display::Display,
    pages::{NetworkKind, PageKey, PageSet},
    payg::PaygService,
    scheduler::BacklightPolicy,
    Result,
};

pub mod entries;
pub mod numeric;

pub use entries::{
    MenuHandler, NumericEntryMenu, PaygStatusMenu, ServiceMenu, StaticMenu, TokenEntryMenu,
};
pub use numeric::{EntryOutcome, NumericEntry};

/// Everything an entry may touch while it runs.
pub struct MenuContext<'a> {
    pub bus: &'a dyn Bus,
    pub pages: &'a mut PageSet,
    pub payg: &'a PaygService,
    pub display: &'a mut dyn Display,
    pub now: SystemTime,
}

#[derive(Debug, Clone)]
pub enum MenuAction {
    Static(StaticMenu),
    PaygStatus(PaygStatusMenu),
    TokenEntry(TokenEntryMenu),
    Service(ServiceMenu),
    Numeric(NumericEntryMenu),
}

impl MenuAction {
    fn handler(&self) -> &dyn MenuHandler {
        match self {
            MenuAction::Static(h) => h,
            MenuAction::PaygStatus(h) => h,
            MenuAction::TokenEntry(h) => h,
            MenuAction::Service(h) => h,
            MenuAction::Numeric(h) => h,
        }
    }

    fn handler_mut(&mut self) -> &mut dyn MenuHandler {
        match self {
            MenuAction::Static(h) => h,
            MenuAction::PaygStatus(h) => h,
            MenuAction::TokenEntry(h) => h,
            MenuAction::Service(h) => h,
            MenuAction::Numeric(h) => h,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MenuEntry {
    label: String,
    action: MenuAction,
}

impl MenuEntry {
    pub fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn action(&self) -> &MenuAction {
        &self.action
    }
}

#[derive(Debug, Clone)]
pub struct MenuSettings {
    pub backlight_timeout: Duration,
    pub backlight_policy: BacklightPolicy,
    pub service_password: String,
    pub token_length: usize,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            backlight_timeout: Duration::from_secs(300),
            backlight_policy: BacklightPolicy::Always,
            service_password: "567415".to_string(),
            token_length: 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Browsing,
    /// The entry at this position of the full entry list owns the display.
    Active(usize),
}

#[derive(Debug)]
pub struct MenuStateMachine {
    entries: Vec<MenuEntry>,
    state: MenuState,
    index: usize,
    last_index: usize,
    /// Page index of the urgent page on screen.
    alarm: Option<usize>,
    idle: Duration,
    backlight_timeout: Duration,
    backlight_policy: BacklightPolicy,
    drawn: Option<[String; 2]>,
}

fn list_row(label: &str, selected: bool, cols: usize) -> String {
    let width = cols.saturating_sub(1);
    let label: String = label.chars().take(width).collect();
    format!("{label:<width$}{}", if selected { '>' } else { ' ' })
}

impl MenuStateMachine {
    pub fn new(entries: Vec<MenuEntry>, settings: &MenuSettings) -> Self {
        Self {
            entries,
            state: MenuState::Browsing,
            index: 0,
            last_index: 0,
            alarm: None,
            idle: Duration::ZERO,
            backlight_timeout: settings.backlight_timeout,
            backlight_policy: settings.backlight_policy,
            drawn: None,
        }
    }

    /// The appliance's menu.
    pub fn standard(settings: &MenuSettings) -> Self {
        let page = |key| MenuAction::Static(StaticMenu::new(key));
        let entries = vec![
            MenuEntry::new("PAYG Status", MenuAction::PaygStatus(PaygStatusMenu)),
            MenuEntry::new(
                "Enter Token",
                MenuAction::TokenEntry(TokenEntryMenu::new(settings.token_length)),
            ),
            MenuEntry::new("LAN Status", page(PageKey::Network(NetworkKind::Lan))),
            MenuEntry::new("WiFi Status", page(PageKey::Network(NetworkKind::Wifi))),
            MenuEntry::new("General Status", page(PageKey::Status)),
            MenuEntry::new("Solar Status", page(PageKey::Solar)),
            MenuEntry::new("Battery Status", page(PageKey::Battery)),
            MenuEntry::new("Solar History", page(PageKey::SolarHistory)),
            MenuEntry::new(
                "Service",
                MenuAction::Service(ServiceMenu::new(settings.service_password.clone())),
            ),
        ];
        Self::new(entries, settings)
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    /// Whether an urgent page currently owns the display.
    pub fn showing_alarm(&self) -> bool {
        self.alarm.is_some()
    }

    /// Positions in `entries` of the entries currently offered.
    pub fn available(&self, ctx: &MenuContext<'_>) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.action.handler().is_available(ctx))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn start(&mut self, ctx: &mut MenuContext<'_>) {
        self.state = MenuState::Browsing;
        self.redraw(ctx);
    }

    pub fn tick(&mut self, ctx: &mut MenuContext<'_>, elapsed: Duration) {
        self.idle = self.idle.saturating_add(elapsed);
        self.update_backlight(ctx);
        if let Err(err) = self.step(ctx, None) {
            warn!("menu tick failed: {err}");
        }
    }

    pub fn key_pressed(&mut self, ctx: &mut MenuContext<'_>, key: Key) {
        self.idle = Duration::ZERO;
        self.update_backlight(ctx);
        if let Err(err) = self.step(ctx, Some(key)) {
            warn!("menu key {key:?} failed: {err}");
        }
    }

    fn step(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<()> {
        match key {
            None => {
                if let Some(index) = ctx.pages.urgent_index() {
                    if self.alarm != Some(index) {
                        info!("page {index} is urgent");
                        self.state = MenuState::Browsing;
                        self.drawn = None;
                    }
                    self.alarm = Some(index);
                    ctx.pages.display(index, ctx.bus, &mut *ctx.display);
                    return Ok(());
                }
                if self.alarm.take().is_some() {
                    return self.back_to_list(ctx);
                }
            }
            Some(_) => {
                if let Some(index) = self.alarm.take() {
                    info!("alarm on page {index} acknowledged");
                    ctx.pages.key_pressed(index);
                    return self.back_to_list(ctx);
                }
            }
        }

        match self.state {
            MenuState::Active(entry) => {
                let Some(handler) = self.entries.get_mut(entry).map(|e| e.action.handler_mut())
                else {
                    return self.back_to_list(ctx);
                };
                if !handler.update(ctx, key)? {
                    return self.back_to_list(ctx);
                }
                Ok(())
            }
            MenuState::Browsing => match key {
                None => self.render_list(ctx),
                Some(key) => self.browse(ctx, key),
            },
        }
    }

    fn browse(&mut self, ctx: &mut MenuContext<'_>, key: Key) -> Result<()> {
        let available = self.available(ctx);
        self.index = self.index.min(available.len().saturating_sub(1));
        match key {
            Key::Up if self.index > 0 => {
                self.last_index = self.index;
                self.index -= 1;
            }
            Key::Down if self.index + 1 < available.len() => {
                self.last_index = self.index;
                self.index += 1;
            }
            Key::Right => {
                let Some(&entry) = available.get(self.index) else {
                    return Ok(());
                };
                debug!("entering menu entry {}", self.entries[entry].label);
                self.state = MenuState::Active(entry);
                self.drawn = None;
                return self.entries[entry].action.handler_mut().enter(ctx);
            }
            _ => return Ok(()),
        }
        self.render_list(ctx)
    }

    fn back_to_list(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        self.state = MenuState::Browsing;
        self.drawn = None;
        ctx.display.clear()?;
        self.render_list(ctx)
    }

    fn redraw(&mut self, ctx: &mut MenuContext<'_>) {
        if let Err(err) = self.back_to_list(ctx) {
            warn!("menu redraw failed: {err}");
        }
    }

    /// Draw the two visible entries. Moving down keeps the selection on the bottom row,
    /// moving up on the top row. Skipped when nothing changed since the last draw.
    fn render_list(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        let available = self.available(ctx);
        let cols = ctx.display.cols();
        self.index = self.index.min(available.len().saturating_sub(1));
        let label = |pos: usize| {
            available
                .get(pos)
                .and_then(|&i| self.entries.get(i))
                .map(MenuEntry::label)
        };

        let rows = if available.is_empty() {
            [" ".repeat(cols), " ".repeat(cols)]
        } else if self.index == 0 || self.index < self.last_index {
            [
                list_row(label(self.index).unwrap_or_default(), true, cols),
                label(self.index + 1)
                    .map_or_else(|| " ".repeat(cols), |l| list_row(l, false, cols)),
            ]
        } else {
            [
                list_row(label(self.index - 1).unwrap_or_default(), false, cols),
                list_row(label(self.index).unwrap_or_default(), true, cols),
            ]
        };

        if self.drawn.as_ref() == Some(&rows) {
            return Ok(());
        }
        for (row, text) in rows.iter().enumerate() {
            ctx.display.display_string(text, row as u8)?;
        }
        self.drawn = Some(rows);
        Ok(())
    }

    fn update_backlight(&self, ctx: &mut MenuContext<'_>) {
        let daylight_off =
            self.backlight_policy == BacklightPolicy::Ambient && ctx.display.daylight();
        let on = self.idle <= self.backlight_timeout && !daylight_off;
        if on != ctx.display.backlight_on() {
            debug!("menu backlight {}", if on { "on" } else { "off" });
            if let Err(err) = ctx.display.set_backlight(on) {
                warn!("backlight switch failed: {err}");
            }
        }
    }
}
