//! One-button controller: unattended page rotation, a pinned page after a press, urgent
//! pre-emption and backlight timing. Driven once per tick by the dispatcher.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    bus::Bus,
    display::Display,
    pages::{PageSet, PageView},
};

/// Whether ambient light may keep the backlight dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklightPolicy {
    /// Only the idle timeout switches the backlight off.
    #[default]
    Always,
    /// Daylight also switches it off, and a press does not relight it in daylight.
    Ambient,
}

impl BacklightPolicy {
    /// Should the backlight go dark at an idle lapse?
    pub fn should_dim(self, display: &dyn Display, timeout: Duration) -> bool {
        display.on_time() > timeout || (self == BacklightPolicy::Ambient && display.daylight())
    }

    /// Should a key press relight it?
    pub fn may_light(self, display: &dyn Display) -> bool {
        self == BacklightPolicy::Always || !display.daylight()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Ticks between passive page changes.
    pub roll_timeout: u32,
    /// A deliberately chosen page stays this many rotation intervals.
    pub stay_multiplier: u32,
    pub backlight_timeout: Duration,
    pub backlight_policy: BacklightPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            roll_timeout: 5,
            stay_multiplier: 6,
            backlight_timeout: Duration::from_secs(300),
            backlight_policy: BacklightPolicy::Always,
        }
    }
}

#[derive(Debug)]
pub struct DisplayScheduler {
    settings: SchedulerSettings,
    /// Next page index rotation will try.
    cursor: usize,
    current: Option<usize>,
    count: u32,
    urgent: Option<usize>,
}

impl DisplayScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            cursor: 0,
            current: None,
            count: 0,
            urgent: None,
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn urgent(&self) -> Option<usize> {
        self.urgent
    }

    pub fn idle_count(&self) -> u32 {
        self.count
    }

    pub fn tick(&mut self, pages: &mut PageSet, bus: &dyn Bus, display: &mut dyn Display) {
        if self.claim_urgent(pages, bus, display) {
            return;
        }

        if self.count == 0 {
            self.roll(pages, bus, display, true);
            if display.backlight_on()
                && self
                    .settings
                    .backlight_policy
                    .should_dim(display, self.settings.backlight_timeout)
            {
                debug!("backlight idle, switching off");
                if let Err(err) = display.set_backlight(false) {
                    warn!("backlight off failed: {err}");
                }
            }
        } else if let Some(index) = self.current {
            if pages.get(index).is_some_and(|p| p.volatile()) {
                pages.display(index, bus, display);
            }
        }

        self.count = match self.count {
            0 => self.settings.roll_timeout,
            n => n - 1,
        };
    }

    pub fn key_pressed(&mut self, pages: &mut PageSet, bus: &dyn Bus, display: &mut dyn Display) {
        if let Some(index) = self.urgent.take() {
            info!("alarm on page {index} acknowledged");
            pages.key_pressed(index);
        }

        let timeout = self.settings.roll_timeout;
        if self.relight(display) {
            self.count = timeout;
            self.cursor = 0;
        } else {
            self.count = timeout.saturating_mul(self.settings.stay_multiplier);
        }
        self.roll(pages, bus, display, false);
    }

    /// Switch a dark backlight back on if the policy allows. Returns whether it did.
    fn relight(&self, display: &mut dyn Display) -> bool {
        if display.backlight_on() || !self.settings.backlight_policy.may_light(display) {
            return false;
        }
        match display.set_backlight(true) {
            Ok(()) => true,
            Err(err) => {
                warn!("backlight on failed: {err}");
                false
            }
        }
    }

    /// Show the next page that renders. Tries each page at most once; with `auto`, pages
    /// not eligible for rotation are passed over. Returns whether anything was shown.
    pub fn roll(
        &mut self,
        pages: &PageSet,
        bus: &dyn Bus,
        display: &mut dyn Display,
        auto: bool,
    ) -> bool {
        let n = pages.len();
        for _ in 0..n {
            let index = self.cursor % n;
            self.cursor = (index + 1) % n;
            let Some(page) = pages.get(index) else {
                continue;
            };
            if auto && !page.auto() {
                continue;
            }
            if pages.display(index, bus, display) {
                self.current = Some(index);
                return true;
            }
        }
        debug!("no page to show");
        self.current = None;
        false
    }

    /// An urgent page owns the display while it stays urgent. Returns true while one does.
    fn claim_urgent(&mut self, pages: &PageSet, bus: &dyn Bus, display: &mut dyn Display) -> bool {
        match pages.urgent_index() {
            Some(index) => {
                if self.urgent != Some(index) {
                    info!("page {index} is urgent");
                }
                self.urgent = Some(index);
                pages.display(index, bus, display)
            }
            None => {
                if self.urgent.take().is_some() {
                    // Resume rotation straight away.
                    self.count = 0;
                }
                false
            }
        }
    }
}
