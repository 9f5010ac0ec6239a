use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

pub fn load_or_default() -> Result<Config> {
    load_or_create(&config_path()?)
}

pub fn load_or_create(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        save_to_path(&cfg, path)?;
        info!("wrote default config to {}", path.display());
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pins = config
        .button_gpio_pins
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let policy = match config.backlight_policy {
        crate::scheduler::BacklightPolicy::Always => "always",
        crate::scheduler::BacklightPolicy::Ambient => "ambient",
    };

    let mut contents = format!(
        "# characterdisplay config\n\
lcd_path = \"{}\"\n\
pcf8574_addr = {}\n\
cols = {}\n\
rows = {}\n\
ui = \"{}\"\n\
tick_ms = {}\n\
roll_timeout_ticks = {}\n\
stay_multiplier = {}\n\
backlight_timeout = \"{}\"\n\
backlight_policy = \"{}\"\n\
button_gpio_pins = [{}]\n\
service_password = \"{}\"\n\
token_length = {}\n\
log_syslog = {}\n",
        config.lcd_path,
        super::format_pcf_addr(config.pcf8574_addr),
        config.cols,
        config.rows,
        config.ui.as_str(),
        config.tick_ms,
        config.roll_timeout_ticks,
        config.stay_multiplier,
        humantime::format_duration(config.backlight_timeout),
        policy,
        pins,
        config.service_password,
        config.token_length,
        config.log_syslog,
    );
    if let Some(path) = &config.daylight_sensor {
        contents.push_str(&format!("daylight_sensor = \"{}\"\n", path.display()));
    }
    if let Some(level) = config.log_level {
        contents.push_str(&format!("log_level = \"{}\"\n", level.as_str()));
    }
    if let Some(file) = &config.log_file {
        contents.push_str(&format!("log_file = \"{file}\"\n"));
    }
    fs::write(path, contents)?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let cfg: Config =
        toml::from_str(raw).map_err(|e| Error::InvalidArgs(format!("invalid config: {e}")))?;
    super::validate(&cfg)?;
    Ok(cfg)
}

fn config_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidArgs("HOME not set; cannot locate config directory".into()))?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::LogLevel,
        config::{Pcf8574Addr, UiMode},
        scheduler::BacklightPolicy,
    };
    use std::time::Duration;

    #[test]
    fn loads_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from_path(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parses_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let contents = r#"
            lcd_path = "/dev/i2c-0"
            pcf8574_addr = "0x23"
            cols = 20
            rows = 4
            ui = "four-button"
            tick_ms = 500
            roll_timeout_ticks = 3
            stay_multiplier = 4
            backlight_timeout = "90s"
            backlight_policy = "ambient"
            daylight_sensor = "/run/daylight"
            button_gpio_pins = [5, 6, 13, 19]
            service_password = "1234"
            token_length = 12
            log_level = "debug"
        "#;
        fs::write(&path, contents).unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.lcd_path, "/dev/i2c-0");
        assert_eq!(cfg.pcf8574_addr, Pcf8574Addr::Addr(0x23));
        assert_eq!(cfg.cols, 20);
        assert_eq!(cfg.rows, 4);
        assert_eq!(cfg.ui, UiMode::FourButton);
        assert_eq!(cfg.tick_ms, 500);
        assert_eq!(cfg.roll_timeout_ticks, 3);
        assert_eq!(cfg.stay_multiplier, 4);
        assert_eq!(cfg.backlight_timeout, Duration::from_secs(90));
        assert_eq!(cfg.backlight_policy, BacklightPolicy::Ambient);
        assert_eq!(cfg.daylight_sensor, Some("/run/daylight".into()));
        assert_eq!(cfg.button_gpio_pins, vec![5, 6, 13, 19]);
        assert_eq!(cfg.service_password, "1234");
        assert_eq!(cfg.token_length, 12);
        assert_eq!(cfg.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn numeric_address_is_accepted() {
        let cfg = parse("pcf8574_addr = 39").unwrap();
        assert_eq!(cfg.pcf8574_addr, Pcf8574Addr::Addr(39));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = parse("nope = 1").unwrap_err();
        assert!(format!("{err}").contains("unknown field"));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = parse("backlight_timeout = \"soon\"").unwrap_err();
        assert!(format!("{err}").contains("invalid config"));
    }

    #[test]
    fn rejects_cols_outside_range() {
        let err = parse("cols = 99").unwrap_err();
        assert!(format!("{err}").contains("cols must"));
    }

    #[test]
    fn rejects_tick_below_min() {
        let err = parse("tick_ms = 10").unwrap_err();
        assert!(format!("{err}").contains("tick_ms"));
    }

    #[test]
    fn saves_and_loads_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            lcd_path: "/dev/i2c-3".into(),
            pcf8574_addr: Pcf8574Addr::Addr(0x3f),
            ui: UiMode::FourButton,
            backlight_timeout: Duration::from_secs(150),
            backlight_policy: BacklightPolicy::Ambient,
            daylight_sensor: Some("/run/daylight".into()),
            button_gpio_pins: vec![17],
            log_level: Some(LogLevel::Warn),
            log_file: Some("/var/log/characterdisplay.log".into()),
            log_syslog: true,
            ..Config::default()
        };
        save_to_path(&cfg, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

        let cfg = load_or_create(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists(), "expected config file to be created");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("lcd_path ="));
        assert!(contents.contains("backlight_timeout = \"5m\""));
        assert_eq!(load_from_path(&path).unwrap(), cfg);
    }
}
