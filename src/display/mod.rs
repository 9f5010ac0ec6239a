//! Display collaborator: the operations pages and controllers need from a character
//! display, with a hardware LCD, a stdout text sink and an in-memory recorder.

use std::{
    io::Write,
    path::PathBuf,
    time::{Duration, Instant},
};

use log::debug;

use crate::Result;

pub mod lcd;

pub use lcd::Lcd;

pub trait Display {
    fn cols(&self) -> usize;

    fn clear(&mut self) -> Result<()>;

    fn home(&mut self) -> Result<()>;

    /// Write a full row (0-based). Text beyond the row width is dropped.
    fn display_string(&mut self, text: &str, row: u8) -> Result<()>;

    /// Raw text at the current cursor position.
    fn write(&mut self, text: &str) -> Result<()>;

    fn set_backlight(&mut self, on: bool) -> Result<()>;

    fn backlight_on(&self) -> bool;

    /// How long the backlight has been lit; zero while it is off.
    fn on_time(&self) -> Duration;

    /// Ambient-light reading; false when no sensor is configured.
    fn daylight(&self) -> bool;
}

/// File-backed ambient light sensor: content `1` means daylight.
#[derive(Debug, Clone, Default)]
pub struct DaylightSensor {
    path: Option<PathBuf>,
}

impl DaylightSensor {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn read(&self) -> bool {
        let Some(path) = self.path.as_ref() else {
            return false;
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => raw.trim() == "1",
            Err(err) => {
                debug!("daylight sensor {} unreadable: {err}", path.display());
                false
            }
        }
    }
}

/// Tracks when the backlight was last switched on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BacklightClock {
    on_since: Option<Instant>,
}

impl BacklightClock {
    pub(crate) fn lit() -> Self {
        Self {
            on_since: Some(Instant::now()),
        }
    }

    pub(crate) fn set(&mut self, on: bool) {
        match (on, self.on_since) {
            (true, None) => self.on_since = Some(Instant::now()),
            (false, _) => self.on_since = None,
            (true, Some(_)) => {}
        }
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on_since.is_some()
    }

    pub(crate) fn on_time(&self) -> Duration {
        self.on_since.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// Text rendering for `--debug`: each row is echoed as `|<row>|`, and a rule closes every
/// full screen.
pub struct TextSink<W: Write = std::io::Stdout> {
    out: W,
    cols: usize,
    rows: u8,
    backlight: BacklightClock,
    daylight: DaylightSensor,
}

impl TextSink<std::io::Stdout> {
    pub fn stdout(cols: usize, rows: u8, daylight: DaylightSensor) -> Self {
        Self::new(std::io::stdout(), cols, rows, daylight)
    }
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W, cols: usize, rows: u8, daylight: DaylightSensor) -> Self {
        Self {
            out,
            cols,
            rows,
            backlight: BacklightClock::lit(),
            daylight,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for TextSink<W> {
    fn cols(&self) -> usize {
        self.cols
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    fn home(&mut self) -> Result<()> {
        Ok(())
    }

    fn display_string(&mut self, text: &str, row: u8) -> Result<()> {
        let line: String = text.chars().take(self.cols).collect();
        writeln!(self.out, "|{line:<width$}|", width = self.cols)?;
        if row + 1 == self.rows {
            writeln!(self.out, "|{}|", "-".repeat(self.cols))?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        write!(self.out, "{text}")?;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<()> {
        if on != self.backlight.is_on() {
            writeln!(self.out, "[backlight {}]", if on { "on" } else { "off" })?;
        }
        self.backlight.set(on);
        Ok(())
    }

    fn backlight_on(&self) -> bool {
        self.backlight.is_on()
    }

    fn on_time(&self) -> Duration {
        self.backlight.on_time()
    }

    fn daylight(&self) -> bool {
        self.daylight.read()
    }
}

/// Recording display for tests. Time is simulated: `advance` adds to the backlight's
/// on-time instead of reading a clock.
#[derive(Debug, Clone)]
pub struct MemoryDisplay {
    cols: usize,
    lines: Vec<String>,
    backlight: bool,
    on_time: Duration,
    daylight: bool,
    clears: usize,
    writes: usize,
    failing: bool,
}

impl MemoryDisplay {
    pub fn new(cols: usize, rows: u8) -> Self {
        Self {
            cols,
            lines: vec![" ".repeat(cols); usize::from(rows)],
            backlight: true,
            on_time: Duration::ZERO,
            daylight: false,
            clears: 0,
            writes: 0,
            failing: false,
        }
    }

    pub fn line(&self, row: usize) -> &str {
        self.lines.get(row).map(String::as_str).unwrap_or("")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn advance(&mut self, elapsed: Duration) {
        if self.backlight {
            self.on_time += elapsed;
        }
    }

    pub fn set_daylight(&mut self, daylight: bool) {
        self.daylight = daylight;
    }

    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Display for MemoryDisplay {
    fn cols(&self) -> usize {
        self.cols
    }

    fn clear(&mut self) -> Result<()> {
        self.clears += 1;
        for line in &mut self.lines {
            *line = " ".repeat(self.cols);
        }
        Ok(())
    }

    fn home(&mut self) -> Result<()> {
        Ok(())
    }

    fn display_string(&mut self, text: &str, row: u8) -> Result<()> {
        if self.failing {
            return Err(crate::Error::Display("write rejected".into()));
        }
        let cols = self.cols;
        let Some(line) = self.lines.get_mut(usize::from(row)) else {
            return Err(crate::Error::Display(format!("row {row} out of bounds")));
        };
        let clipped: String = text.chars().take(cols).collect();
        *line = format!("{clipped:<cols$}");
        self.writes += 1;
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.display_string(text, 0)
    }

    fn set_backlight(&mut self, on: bool) -> Result<()> {
        if on && !self.backlight {
            self.on_time = Duration::ZERO;
        }
        self.backlight = on;
        Ok(())
    }

    fn backlight_on(&self) -> bool {
        self.backlight
    }

    fn on_time(&self) -> Duration {
        if self.backlight {
            self.on_time
        } else {
            Duration::ZERO
        }
    }

    fn daylight(&self) -> bool {
        self.daylight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn text_sink_frames_rows_and_rules_screens() {
        let mut sink = TextSink::new(Vec::new(), 8, 2, DaylightSensor::default());
        sink.display_string("Battery:", 0).unwrap();
        sink.display_string("-120 W and more", 1).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "|Battery:|\n|-120 W a|\n|--------|\n");
    }

    #[test]
    fn memory_display_clips_and_pads_rows() {
        let mut display = MemoryDisplay::new(4, 2);
        display.display_string("abcdef", 0).unwrap();
        display.display_string("x", 1).unwrap();
        assert_eq!(display.lines(), ["abcd".to_string(), "x   ".to_string()]);
        assert!(display.display_string("y", 2).is_err());
    }

    #[test]
    fn on_time_restarts_when_backlight_comes_back() {
        let mut display = MemoryDisplay::new(16, 2);
        display.advance(Duration::from_secs(30));
        assert_eq!(display.on_time(), Duration::from_secs(30));
        display.set_backlight(false).unwrap();
        assert_eq!(display.on_time(), Duration::ZERO);
        display.set_backlight(true).unwrap();
        assert_eq!(display.on_time(), Duration::ZERO);
    }

    #[test]
    fn daylight_sensor_reads_flag_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1").unwrap();
        assert!(DaylightSensor::new(Some(file.path().to_path_buf())).read());
        assert!(!DaylightSensor::new(Some("/nonexistent/daylight".into())).read());
        assert!(!DaylightSensor::default().read());
    }
}
