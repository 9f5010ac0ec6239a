use std::{fs, time::Duration};

use characterdisplay::{
    app::{App, AppConfig, LogLevel},
    cli::{Command, RunOptions},
    config::{Config, Pcf8574Addr, UiMode},
    scheduler::BacklightPolicy,
    Error,
};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn help_and_version_do_not_start_anything() {
    assert!(matches!(
        Command::parse(&args(&["--help"])),
        Ok(Command::ShowHelp(_))
    ));
    assert_eq!(
        Command::parse(&args(&["--version"])).unwrap(),
        Command::ShowVersion
    );
}

#[test]
fn bad_flag_is_invalid_args() {
    assert!(matches!(
        Command::parse(&args(&["--baud", "9600"])),
        Err(Error::InvalidArgs(_))
    ));
}

#[test]
fn cli_flags_layer_over_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
lcd_path = "/dev/i2c-2"
pcf8574_addr = "0x3f"
ui = "simple"
tick_ms = 500
backlight_timeout = "2m 30s"
backlight_policy = "ambient"
button_gpio_pins = [5, 6, 13, 19]
log_level = "warn"
"#,
    )
    .unwrap();

    let path_arg = path.to_string_lossy().into_owned();
    let Command::Run(opts) = Command::parse(&args(&[
        "--config",
        &path_arg,
        "--ui",
        "four-button",
        "--log-level",
        "debug",
    ]))
    .unwrap() else {
        panic!("expected a run command");
    };

    let app = App::from_options(opts).unwrap();
    let cfg = app.config();
    assert_eq!(cfg.lcd_path, "/dev/i2c-2");
    assert_eq!(cfg.pcf8574_addr, Pcf8574Addr::Addr(0x3f));
    assert_eq!(cfg.ui, UiMode::FourButton);
    assert_eq!(cfg.tick, Duration::from_millis(500));
    assert_eq!(cfg.backlight_timeout, Duration::from_secs(150));
    assert_eq!(cfg.backlight_policy, BacklightPolicy::Ambient);
    assert_eq!(cfg.button_gpio_pins, vec![5, 6, 13, 19]);
    assert_eq!(cfg.log_level, LogLevel::Debug);
}

#[test]
fn invalid_config_is_reported_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "rows = 9\n").unwrap();
    let err = App::from_options(RunOptions {
        config_path: Some(path),
        ..RunOptions::default()
    })
    .err()
    .unwrap();
    assert!(format!("{err}").contains("rows"));
}

#[test]
fn defaults_match_the_appliance() {
    let cfg = AppConfig::from_sources(Config::default(), RunOptions::default());
    assert_eq!(cfg.lcd_path, "/dev/i2c-1");
    assert_eq!((cfg.cols, cfg.rows), (16, 2));
    assert_eq!(cfg.ui, UiMode::Simple);
    assert_eq!(cfg.tick, Duration::from_secs(1));
    assert_eq!(cfg.backlight_timeout, Duration::from_secs(300));
    assert_eq!(cfg.service_password, "567415");
    assert_eq!(cfg.token_length, 9);
    assert_eq!(cfg.log_level, LogLevel::Info);
}
