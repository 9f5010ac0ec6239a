//! What each menu entry does once selected.

use log::{info, warn};

use super::{
    numeric::{EntryOutcome, NumericEntry},
    MenuContext,
};
use crate::{
    app::input::Key,
    pages::{PageKey, PageView},
    payg::TokenStatus,
    Result,
};

/// Behaviour behind a menu label. `update` receives every key while the entry is active
/// and `None` once per tick; returning false hands control back to the list.
pub trait MenuHandler {
    fn is_available(&self, ctx: &MenuContext<'_>) -> bool;

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()>;

    fn update(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool>;
}

fn centered(text: &str, cols: usize) -> String {
    format!("{text:^cols$}")
}

/// Two centred rows.
pub(super) fn show(ctx: &mut MenuContext<'_>, top: &str, bottom: &str) -> Result<()> {
    let cols = ctx.display.cols();
    ctx.display.display_string(&centered(top, cols), 0)?;
    ctx.display.display_string(&centered(bottom, cols), 1)
}

/// Shows a status page; any key leaves.
#[derive(Debug, Clone, Copy)]
pub struct StaticMenu {
    page: PageKey,
}

impl StaticMenu {
    pub fn new(page: PageKey) -> Self {
        Self { page }
    }

    fn render(&self, ctx: &mut MenuContext<'_>) {
        if let Some(index) = ctx.pages.find(self.page) {
            ctx.pages.display(index, ctx.bus, &mut *ctx.display);
        }
    }
}

impl MenuHandler for StaticMenu {
    fn is_available(&self, ctx: &MenuContext<'_>) -> bool {
        let Some(page) = ctx.pages.find(self.page).and_then(|i| ctx.pages.get(i)) else {
            return false;
        };
        let page_ctx = ctx.pages.context(ctx.bus, ctx.display.cols());
        matches!(page.get_text(&page_ctx), Ok(Some(_)))
    }

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        ctx.display.clear()?;
        self.render(ctx);
        Ok(())
    }

    fn update(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool> {
        if key.is_some() {
            return Ok(false);
        }
        let volatile = ctx
            .pages
            .find(self.page)
            .and_then(|i| ctx.pages.get(i))
            .is_some_and(|p| p.volatile());
        if volatile {
            self.render(ctx);
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaygStatusMenu;

impl MenuHandler for PaygStatusMenu {
    fn is_available(&self, ctx: &MenuContext<'_>) -> bool {
        ctx.payg.service_available(ctx.bus)
    }

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        ctx.display.clear()?;
        if !ctx.payg.is_payg_enabled(ctx.bus) {
            show(ctx, "Active", "Forever")
        } else if ctx.payg.is_active(ctx.bus) {
            let (days, hours) = ctx.payg.days_and_hours_left(ctx.bus, ctx.now);
            show(ctx, "Active For", &format!("{days} days, {hours} h"))
        } else {
            show(ctx, "Not Active", "Please Activate")
        }
    }

    fn update(&mut self, _ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool> {
        Ok(key.is_none())
    }
}

/// PAYG token entry, blocked while the backend reports a lockout.
#[derive(Debug, Clone)]
pub struct TokenEntryMenu {
    entry: NumericEntry,
    locked: bool,
}

impl TokenEntryMenu {
    pub fn new(length: usize) -> Self {
        Self {
            entry: NumericEntry::new("Enter Token", length),
            locked: false,
        }
    }

    fn show_lock(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        self.locked = true;
        let minutes = ctx.payg.minutes_of_token_block(ctx.bus, ctx.now);
        show(ctx, "Token entry lock", &format!("for {minutes} min."))
    }

    fn show_verdict(ctx: &mut MenuContext<'_>, status: TokenStatus) -> Result<()> {
        match status {
            TokenStatus::Valid if !ctx.payg.is_payg_enabled(ctx.bus) => {
                show(ctx, "Token Valid", "Active Forever")
            }
            TokenStatus::Valid => {
                let (days, hours) = ctx.payg.days_and_hours_left(ctx.bus, ctx.now);
                show(ctx, "Token Valid", &format!("{days} days, {hours} h"))
            }
            TokenStatus::AlreadyUsed => show(ctx, "Token", "Already Used"),
            TokenStatus::Invalid => show(ctx, "Token Invalid", ""),
        }
    }
}

impl MenuHandler for TokenEntryMenu {
    fn is_available(&self, ctx: &MenuContext<'_>) -> bool {
        ctx.payg.service_available(ctx.bus)
    }

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        self.locked = false;
        if !ctx.payg.token_entry_allowed(ctx.bus, ctx.now) {
            ctx.display.clear()?;
            return self.show_lock(ctx);
        }
        self.entry.enter(None, &mut *ctx.display)
    }

    fn update(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool> {
        if !ctx.payg.token_entry_allowed(ctx.bus, ctx.now) {
            self.show_lock(ctx)?;
            return Ok(key != Some(Key::Left));
        }
        if self.locked {
            self.locked = false;
            info!("token entry unlocked");
            self.entry.enter(None, &mut *ctx.display)?;
            return Ok(true);
        }
        match self.entry.update(key, &mut *ctx.display)? {
            EntryOutcome::Continue => Ok(true),
            EntryOutcome::Exit => Ok(false),
            EntryOutcome::Submitted(code) => {
                let status = ctx.payg.submit_token(ctx.bus, &code);
                info!("token submitted: {status:?}");
                Self::show_verdict(ctx, status)?;
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceStage {
    Password,
    Rejected,
    Threshold,
    Done,
}

/// Password-gated low-voltage-disconnect threshold setting.
#[derive(Debug, Clone)]
pub struct ServiceMenu {
    password: String,
    password_entry: NumericEntry,
    threshold_entry: NumericEntry,
    stage: ServiceStage,
}

const THRESHOLD_DIGITS: usize = 5;

/// Millivolt seed for the threshold entry, zero padded to the entry width.
fn millivolts(volts: f64) -> String {
    let mv = (volts * 1000.0).round().clamp(0.0, 99_999.0) as u32;
    format!("{mv:0width$}", width = THRESHOLD_DIGITS)
}

/// `11.5`, `11.85`, and `12.0` for whole volts.
fn format_volts(volts: f64) -> String {
    if volts.fract() == 0.0 {
        format!("{volts:.1}")
    } else {
        format!("{volts}")
    }
}

impl ServiceMenu {
    pub fn new(password: impl Into<String>) -> Self {
        let password = password.into();
        let length = password.chars().count();
        Self {
            password,
            password_entry: NumericEntry::new("Service Password", length),
            threshold_entry: NumericEntry::new("LVD Thres. (mV):", THRESHOLD_DIGITS),
            stage: ServiceStage::Password,
        }
    }

    fn save_threshold(&mut self, ctx: &mut MenuContext<'_>, mv: &str) -> Result<()> {
        self.stage = ServiceStage::Done;
        let volts = mv.parse::<u32>().map(|mv| f64::from(mv) / 1000.0);
        let saved = match volts {
            Ok(volts) => ctx
                .payg
                .set_lvd_threshold(ctx.bus, volts)
                .map(|()| volts),
            Err(err) => Err(crate::Error::Parse(format!("threshold {mv}: {err}"))),
        };
        match saved {
            Ok(volts) => {
                info!("LVD threshold set to {volts} V");
                show(ctx, "New LVD:", &format!("{} V", format_volts(volts)))
            }
            Err(err) => {
                warn!("saving LVD threshold failed: {err}");
                show(ctx, "LVD not saved", "Bus error")
            }
        }
    }
}

impl MenuHandler for ServiceMenu {
    fn is_available(&self, ctx: &MenuContext<'_>) -> bool {
        ctx.payg.service_available(ctx.bus)
    }

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        self.stage = ServiceStage::Password;
        self.password_entry.enter(None, &mut *ctx.display)
    }

    fn update(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool> {
        match self.stage {
            ServiceStage::Password => match self.password_entry.update(key, &mut *ctx.display)? {
                EntryOutcome::Continue => Ok(true),
                EntryOutcome::Exit => Ok(false),
                EntryOutcome::Submitted(typed) if typed == self.password => {
                    self.stage = ServiceStage::Threshold;
                    let seed = millivolts(ctx.payg.lvd_threshold(ctx.bus));
                    self.threshold_entry.enter(Some(&seed), &mut *ctx.display)?;
                    Ok(true)
                }
                EntryOutcome::Submitted(_) => {
                    warn!("service menu: wrong password");
                    self.stage = ServiceStage::Rejected;
                    show(ctx, "Wrong password!", "Try again")?;
                    Ok(true)
                }
            },
            ServiceStage::Threshold => match self.threshold_entry.update(key, &mut *ctx.display)? {
                EntryOutcome::Continue => Ok(true),
                EntryOutcome::Exit => Ok(false),
                EntryOutcome::Submitted(mv) => {
                    self.save_threshold(ctx, &mv)?;
                    Ok(true)
                }
            },
            ServiceStage::Rejected | ServiceStage::Done => Ok(key != Some(Key::Left)),
        }
    }
}

/// A bare numeric entry that echoes what was typed.
#[derive(Debug, Clone)]
pub struct NumericEntryMenu {
    entry: NumericEntry,
    listed: bool,
    last: Option<String>,
}

impl NumericEntryMenu {
    pub fn new(prompt: impl Into<String>, length: usize, listed: bool) -> Self {
        Self {
            entry: NumericEntry::new(prompt, length),
            listed,
            last: None,
        }
    }

    /// The most recently submitted number.
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl MenuHandler for NumericEntryMenu {
    fn is_available(&self, _ctx: &MenuContext<'_>) -> bool {
        self.listed
    }

    fn enter(&mut self, ctx: &mut MenuContext<'_>) -> Result<()> {
        self.entry.enter(None, &mut *ctx.display)
    }

    fn update(&mut self, ctx: &mut MenuContext<'_>, key: Option<Key>) -> Result<bool> {
        match self.entry.update(key, &mut *ctx.display)? {
            EntryOutcome::Continue => Ok(true),
            EntryOutcome::Exit => Ok(false),
            EntryOutcome::Submitted(value) => {
                show(ctx, "Entered:", &value)?;
                self.last = Some(value);
                Ok(true)
            }
        }
    }
}
