use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Deserializer};

use crate::{app::LogLevel, scheduler::BacklightPolicy, Error, Result};

pub mod loader;

pub const DEFAULT_LCD_PATH: &str = "/dev/i2c-1";
pub const DEFAULT_COLS: u8 = 16;
pub const DEFAULT_ROWS: u8 = 2;
pub const DEFAULT_PCF8574_ADDR: Pcf8574Addr = Pcf8574Addr::Auto;
pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_ROLL_TIMEOUT_TICKS: u32 = 5;
pub const DEFAULT_STAY_MULTIPLIER: u32 = 6;
pub const DEFAULT_BACKLIGHT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_SERVICE_PASSWORD: &str = "567415";
pub const DEFAULT_TOKEN_LENGTH: usize = 9;
const CONFIG_DIR_NAME: &str = ".characterdisplay";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAddr")]
pub enum Pcf8574Addr {
    Auto,
    Addr(u8),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddr {
    Text(String),
    Number(u8),
}

impl TryFrom<RawAddr> for Pcf8574Addr {
    type Error = String;

    fn try_from(raw: RawAddr) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawAddr::Text(text) => parse_pcf_addr(&text),
            RawAddr::Number(n) => Ok(Pcf8574Addr::Addr(n)),
        }
    }
}

impl FromStr for Pcf8574Addr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_pcf_addr(s)
    }
}

/// Which controller owns the display and the buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiMode {
    /// Rotating pages, any button pins a page.
    #[default]
    Simple,
    /// Scrolling menu driven by UP, DOWN, LEFT and RIGHT.
    FourButton,
}

impl FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(UiMode::Simple),
            "four-button" | "fourbutton" => Ok(UiMode::FourButton),
            other => Err(format!("unknown ui '{other}' (expected simple or four-button)")),
        }
    }
}

impl UiMode {
    fn as_str(self) -> &'static str {
        match self {
            UiMode::Simple => "simple",
            UiMode::FourButton => "four-button",
        }
    }
}

fn de_duration<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub lcd_path: String,
    pub pcf8574_addr: Pcf8574Addr,
    pub cols: u8,
    pub rows: u8,
    pub ui: UiMode,
    pub tick_ms: u64,
    pub roll_timeout_ticks: u32,
    pub stay_multiplier: u32,
    #[serde(deserialize_with = "de_duration")]
    pub backlight_timeout: Duration,
    pub backlight_policy: BacklightPolicy,
    pub daylight_sensor: Option<PathBuf>,
    pub button_gpio_pins: Vec<u8>,
    pub service_password: String,
    pub token_length: usize,
    pub log_level: Option<LogLevel>,
    pub log_file: Option<String>,
    pub log_syslog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lcd_path: DEFAULT_LCD_PATH.to_string(),
            pcf8574_addr: DEFAULT_PCF8574_ADDR,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            ui: UiMode::default(),
            tick_ms: DEFAULT_TICK_MS,
            roll_timeout_ticks: DEFAULT_ROLL_TIMEOUT_TICKS,
            stay_multiplier: DEFAULT_STAY_MULTIPLIER,
            backlight_timeout: DEFAULT_BACKLIGHT_TIMEOUT,
            backlight_policy: BacklightPolicy::default(),
            daylight_sensor: None,
            button_gpio_pins: Vec::new(),
            service_password: DEFAULT_SERVICE_PASSWORD.to_string(),
            token_length: DEFAULT_TOKEN_LENGTH,
            log_level: None,
            log_file: None,
            log_syslog: false,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    /// Load `path`, writing a default file there first when it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        loader::load_or_create(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }
}

pub(crate) fn validate(cfg: &Config) -> Result<()> {
    if !(8..=40).contains(&cfg.cols) {
        return Err(Error::InvalidArgs(format!(
            "cols must be between 8 and 40 (got {})",
            cfg.cols
        )));
    }
    if !(1..=4).contains(&cfg.rows) {
        return Err(Error::InvalidArgs(format!(
            "rows must be between 1 and 4 (got {})",
            cfg.rows
        )));
    }
    if cfg.tick_ms < 100 {
        return Err(Error::InvalidArgs("tick_ms must be at least 100".into()));
    }
    if cfg.roll_timeout_ticks == 0 {
        return Err(Error::InvalidArgs("roll_timeout_ticks must be at least 1".into()));
    }
    if cfg.stay_multiplier == 0 {
        return Err(Error::InvalidArgs("stay_multiplier must be at least 1".into()));
    }
    if !matches!(cfg.button_gpio_pins.len(), 0 | 1 | 4) {
        return Err(Error::InvalidArgs(
            "button_gpio_pins must list 0, 1 or 4 pins".into(),
        ));
    }
    if cfg.service_password.is_empty() || !cfg.service_password.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(Error::InvalidArgs(
            "service_password must be a non-empty string of digits".into(),
        ));
    }
    if !(1..=20).contains(&cfg.token_length) {
        return Err(Error::InvalidArgs("token_length must be between 1 and 20".into()));
    }
    Ok(())
}

fn parse_pcf_addr(raw: &str) -> std::result::Result<Pcf8574Addr, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(Pcf8574Addr::Auto);
    }
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u8>().ok(),
    };
    parsed
        .map(Pcf8574Addr::Addr)
        .ok_or_else(|| "expected 'auto' or a hex/decimal address (e.g., 0x27)".to_string())
}

fn format_pcf_addr(addr: Pcf8574Addr) -> String {
    match addr {
        Pcf8574Addr::Auto => "\"auto\"".into(),
        Pcf8574Addr::Addr(a) => format!("\"{a:#04x}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pcf_addresses() {
        assert_eq!("auto".parse::<Pcf8574Addr>(), Ok(Pcf8574Addr::Auto));
        assert_eq!("0x27".parse::<Pcf8574Addr>(), Ok(Pcf8574Addr::Addr(0x27)));
        assert_eq!("39".parse::<Pcf8574Addr>(), Ok(Pcf8574Addr::Addr(39)));
        assert!("0xzz".parse::<Pcf8574Addr>().is_err());
        assert_eq!(format_pcf_addr(Pcf8574Addr::Addr(0x27)), "\"0x27\"");
    }

    #[test]
    fn ui_mode_accepts_both_spellings() {
        assert_eq!("four-button".parse::<UiMode>(), Ok(UiMode::FourButton));
        assert_eq!("Simple".parse::<UiMode>(), Ok(UiMode::Simple));
        assert!("menu".parse::<UiMode>().is_err());
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_three_buttons() {
        let cfg = Config {
            button_gpio_pins: vec![5, 6, 13],
            ..Config::default()
        };
        let err = validate(&cfg).unwrap_err();
        assert!(format!("{err}").contains("button_gpio_pins"));
    }
}
