use std::{
    fs::File,
    io::Write,
    str::FromStr,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Deserialize;
use syslog::{Facility, Formatter3164};

const ENV_LEVEL: &str = "CHARACTERDISPLAY_LOG_LEVEL";
const ENV_PATH: &str = "CHARACTERDISPLAY_LOG_PATH";

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    #[serde(alias = "warning")]
    Warn = 1,
    #[default]
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

type Syslog = syslog::Logger<syslog::LoggerBackend, Formatter3164>;

/// `log` backend writing to stderr, an optional file, and optionally the local syslog.
pub struct Logger {
    level: LogLevel,
    file: Option<Mutex<File>>,
    syslog: Option<Mutex<Syslog>>,
}

impl Logger {
    /// Environment variables override the configured level and file.
    pub fn new(level: LogLevel, file_path: Option<String>, use_syslog: bool) -> Self {
        let env_level = std::env::var(ENV_LEVEL)
            .ok()
            .and_then(|s| LogLevel::from_str(&s).ok());
        let effective_level = env_level.unwrap_or(level);

        let path = std::env::var(ENV_PATH).ok().or(file_path);
        let file = path.and_then(|p| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&p)
                .map_err(|e| eprintln!("cannot open log file {p}: {e}"))
                .ok()
        });

        let syslog = use_syslog
            .then(|| {
                let formatter = Formatter3164 {
                    facility: Facility::LOG_DAEMON,
                    hostname: None,
                    process: env!("CARGO_PKG_NAME").into(),
                    pid: std::process::id(),
                };
                syslog::unix(formatter)
                    .map_err(|e| eprintln!("syslog unavailable: {e}"))
                    .ok()
            })
            .flatten();

        Self {
            level: effective_level,
            file: file.map(Mutex::new),
            syslog: syslog.map(Mutex::new),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Register as the global `log` backend. Later calls keep the first logger.
    pub fn install(self) {
        let filter = self.level.to_filter();
        if log::set_boxed_logger(Box::new(self)).is_ok() {
            log::set_max_level(filter);
        }
    }

    fn line(record: &log::Record<'_>) -> String {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let level = match record.level() {
            log::Level::Error => "Error",
            log::Level::Warn => "Warn",
            log::Level::Info => "Info",
            log::Level::Debug => "Debug",
            log::Level::Trace => "Trace",
        };
        format!(
            "[{}.{:03}] [{level}] {}: {}",
            ts.as_secs(),
            ts.subsec_millis(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level.to_filter()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::line(record);
        eprintln!("{line}");
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
        if let Some(syslog) = &self.syslog {
            if let Ok(mut syslog) = syslog.lock() {
                let msg = format!("{}: {}", record.target(), record.args());
                let _ = match record.level() {
                    log::Level::Error => syslog.err(msg),
                    log::Level::Warn => syslog.warning(msg),
                    log::Level::Info => syslog.info(msg),
                    log::Level::Debug | log::Level::Trace => syslog.debug(msg),
                };
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn parses_levels_and_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.to_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn writes_filtered_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.log");
        let logger = Logger {
            level: LogLevel::Info,
            file: Some(Mutex::new(File::create(&path).unwrap())),
            syslog: None,
        };

        logger.log(
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("characterdisplay::pages")
                .args(format_args!("battery page skipped"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Debug)
                .target("characterdisplay::pages")
                .args(format_args!("hidden"))
                .build(),
        );
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[Warn] characterdisplay::pages: battery page skipped"));
        assert!(!contents.contains("hidden"));
    }
}
