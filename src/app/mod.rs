use std::{io::BufRead, path::PathBuf, thread, time::Duration};

use log::{info, warn};

use crate::{
    bus::{memory::MemoryBus, Bus},
    cli::RunOptions,
    config::{Config, Pcf8574Addr, UiMode},
    display::{DaylightSensor, Display, Lcd, TextSink},
    menu::{MenuSettings, MenuStateMachine},
    scheduler::{BacklightPolicy, DisplayScheduler, SchedulerSettings},
    Result,
};

pub mod input;
mod lifecycle;
mod logger;
mod render_loop;

pub use logger::{LogLevel, Logger};
pub use render_loop::{message_channel, Message};

use input::{ButtonPanel, Key};
use render_loop::{run_render_loop, Daemon, Ui};

const SPLASH: [&str; 2] = ["characterdisplay", "starting..."];

/// Effective settings for one run: config file values with CLI overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub lcd_path: String,
    pub pcf8574_addr: Pcf8574Addr,
    pub cols: u8,
    pub rows: u8,
    pub ui: UiMode,
    pub tick: Duration,
    pub roll_timeout_ticks: u32,
    pub stay_multiplier: u32,
    pub backlight_timeout: Duration,
    pub backlight_policy: BacklightPolicy,
    pub daylight_sensor: Option<PathBuf>,
    pub button_gpio_pins: Vec<u8>,
    pub service_password: String,
    pub token_length: usize,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
    pub log_syslog: bool,
    pub debug: bool,
    pub scenario: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_sources(Config::default(), RunOptions::default())
    }
}

impl AppConfig {
    pub fn from_sources(config: Config, opts: RunOptions) -> Self {
        Self {
            lcd_path: opts.lcd_path.unwrap_or(config.lcd_path),
            pcf8574_addr: config.pcf8574_addr,
            cols: config.cols,
            rows: config.rows,
            ui: opts.ui.unwrap_or(config.ui),
            tick: Duration::from_millis(config.tick_ms),
            roll_timeout_ticks: config.roll_timeout_ticks,
            stay_multiplier: config.stay_multiplier,
            backlight_timeout: config.backlight_timeout,
            backlight_policy: config.backlight_policy,
            daylight_sensor: config.daylight_sensor,
            button_gpio_pins: config.button_gpio_pins,
            service_password: config.service_password,
            token_length: config.token_length,
            log_level: opts.log_level.or(config.log_level).unwrap_or_default(),
            log_file: opts.log_file.or(config.log_file),
            log_syslog: config.log_syslog,
            debug: opts.debug,
            scenario: opts.scenario,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            roll_timeout: self.roll_timeout_ticks,
            stay_multiplier: self.stay_multiplier,
            backlight_timeout: self.backlight_timeout,
            backlight_policy: self.backlight_policy,
        }
    }

    pub fn menu_settings(&self) -> MenuSettings {
        MenuSettings {
            backlight_timeout: self.backlight_timeout,
            backlight_policy: self.backlight_policy,
            service_password: self.service_password.clone(),
            token_length: self.token_length,
        }
    }
}

pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Logger::new(config.log_level, config.log_file.clone(), config.log_syslog).install();
        Self { config }
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = match &opts.config_path {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load_or_default()?,
        };
        Ok(Self::new(AppConfig::from_sources(cfg_file, opts)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Entry point for the daemon: splash, bus, buttons, then the event loop until ctrl-c.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;
        let mut display = self.open_display()?;
        display.clear()?;
        display.display_string(SPLASH[0], 0)?;
        display.display_string(SPLASH[1], 1)?;
        info!(
            "daemon start (ui={:?}, lcd={}, cols={}, rows={}, debug={})",
            config.ui, config.lcd_path, config.cols, config.rows, config.debug
        );

        let (sender, messages) = message_channel();
        let bus = self.open_bus(&sender)?;

        let buttons = match ButtonPanel::open(&config.button_gpio_pins) {
            Ok(panel) => panel,
            Err(err) => {
                warn!("buttons unavailable, continuing without them: {err}");
                ButtonPanel::default()
            }
        };
        if config.debug {
            spawn_stdin_keys(sender)?;
        }

        let ui = match config.ui {
            UiMode::Simple => Ui::Simple(DisplayScheduler::new(config.scheduler_settings())),
            UiMode::FourButton => Ui::FourButton(Box::new(MenuStateMachine::standard(
                &config.menu_settings(),
            ))),
        };
        let daemon = Daemon::new(bus, ui, display, buttons, config.tick);
        run_render_loop(daemon, messages)
    }

    fn open_display(&self) -> Result<Box<dyn Display>> {
        let config = &self.config;
        let daylight = DaylightSensor::new(config.daylight_sensor.clone());
        if config.debug {
            return Ok(Box::new(TextSink::stdout(
                usize::from(config.cols),
                config.rows,
                daylight,
            )));
        }
        let lcd = Lcd::open(
            &config.lcd_path,
            config.pcf8574_addr,
            config.cols,
            config.rows,
            daylight,
        )?;
        Ok(Box::new(lcd))
    }

    fn open_bus(&self, sender: &calloop::channel::Sender<Message>) -> Result<Box<dyn Bus>> {
        if self.config.debug {
            let bus = match &self.config.scenario {
                Some(path) => {
                    info!("loading scenario {}", path.display());
                    MemoryBus::from_scenario_file(path)?
                }
                None => MemoryBus::new(),
            };
            return Ok(Box::new(bus));
        }
        open_system_bus(sender)
    }
}

#[cfg(feature = "dbus")]
fn open_system_bus(sender: &calloop::channel::Sender<Message>) -> Result<Box<dyn Bus>> {
    let bus = crate::bus::dbus::DbusBus::system()?;
    let sender = sender.clone();
    bus.spawn_pump(move |event| sender.send(Message::Bus(event)).is_ok())?;
    Ok(Box::new(bus))
}

#[cfg(not(feature = "dbus"))]
fn open_system_bus(_sender: &calloop::channel::Sender<Message>) -> Result<Box<dyn Bus>> {
    Err(crate::Error::InvalidArgs(
        "built without the `dbus` feature; rebuild with --features dbus or run with --debug"
            .into(),
    ))
}

/// Feed typed lines from stdin to the loop as key presses.
fn spawn_stdin_keys(sender: calloop::channel::Sender<Message>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-keys".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let Some(key) = Key::from_line(&line) else {
                    continue;
                };
                if sender.send(Message::Key(key)).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn cli_overrides_file_values() {
        let opts = RunOptions {
            debug: true,
            lcd_path: Some("/dev/i2c-7".into()),
            ui: Some(UiMode::FourButton),
            log_level: Some(LogLevel::Trace),
            ..RunOptions::default()
        };
        let file = Config {
            lcd_path: "/dev/i2c-1".into(),
            ui: UiMode::Simple,
            log_level: Some(LogLevel::Warn),
            ..Config::default()
        };
        let cfg = AppConfig::from_sources(file, opts);
        assert_eq!(cfg.lcd_path, "/dev/i2c-7");
        assert_eq!(cfg.ui, UiMode::FourButton);
        assert_eq!(cfg.log_level, LogLevel::Trace);
        assert!(cfg.debug);
    }

    #[test]
    fn config_prefers_file_values_when_cli_missing() {
        let file = Config {
            lcd_path: "/dev/i2c-0".into(),
            tick_ms: 250,
            roll_timeout_ticks: 8,
            log_level: Some(LogLevel::Debug),
            log_file: Some("/tmp/display.log".into()),
            ..Config::default()
        };
        let cfg = AppConfig::from_sources(file, RunOptions::default());
        assert_eq!(cfg.lcd_path, "/dev/i2c-0");
        assert_eq!(cfg.tick, Duration::from_millis(250));
        assert_eq!(cfg.scheduler_settings().roll_timeout, 8);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.log_file.as_deref(), Some("/tmp/display.log"));
    }

    #[test]
    fn from_options_reads_explicit_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ui = \"four-button\"\nservice_password = \"1111\"\n").unwrap();
        let app = App::from_options(RunOptions {
            config_path: Some(path),
            ..RunOptions::default()
        })
        .unwrap();
        assert_eq!(app.config().ui, UiMode::FourButton);
        assert_eq!(app.config().menu_settings().service_password, "1111");
    }

    #[cfg(not(feature = "dbus"))]
    #[test]
    fn system_bus_needs_the_feature() {
        let (sender, _messages) = message_channel();
        assert!(matches!(
            open_system_bus(&sender),
            Err(Error::InvalidArgs(_))
        ));
    }
}
