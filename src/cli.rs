use std::path::PathBuf;

use clap::{error::ErrorKind, Parser};

use crate::{app::LogLevel, config::UiMode, Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "characterdisplay",
    version,
    about = "Character LCD status display for solar and inverter systems"
)]
struct Cli {
    /// Render to stdout, read keys from stdin, and use an in-memory bus
    #[arg(long)]
    debug: bool,

    /// I2C bus device of the LCD backpack
    #[arg(long, value_name = "PATH")]
    lcd: Option<String>,

    /// Config file (default: ~/.characterdisplay/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Controller: simple or four-button
    #[arg(long, value_name = "MODE")]
    ui: Option<UiMode>,

    /// JSON file seeding the in-memory bus in debug mode
    #[arg(long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Append log lines to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,
}

/// Options for a run; values are `None` when not provided on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub debug: bool,
    pub lcd_path: Option<String>,
    pub config_path: Option<PathBuf>,
    pub ui: Option<UiMode>,
    pub scenario: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub log_file: Option<String>,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ShowHelp(String),
    ShowVersion,
}

impl Command {
    /// Parse arguments without the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let argv = std::iter::once("characterdisplay").chain(args.iter().map(String::as_str));
        match Cli::try_parse_from(argv) {
            Ok(cli) => Ok(Command::Run(RunOptions {
                debug: cli.debug,
                lcd_path: cli.lcd,
                config_path: cli.config,
                ui: cli.ui,
                scenario: cli.scenario,
                log_level: cli.log_level,
                log_file: cli.log_file,
            })),
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp => Ok(Command::ShowHelp(err.render().to_string())),
                ErrorKind::DisplayVersion => Ok(Command::ShowVersion),
                _ => Err(Error::InvalidArgs(err.render().to_string().trim_end().to_string())),
            },
        }
    }
}
