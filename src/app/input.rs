#[cfg(target_os = "linux")]
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// A key event as the controllers see it. A single-button panel only produces `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Other,
}

impl Key {
    /// Parse a line typed on stdin in debug mode. Empty lines are ignored.
    pub fn from_line(line: &str) -> Option<Key> {
        let word = line.trim().to_ascii_lowercase();
        match word.as_str() {
            "" => None,
            "w" | "up" => Some(Key::Up),
            "s" | "down" => Some(Key::Down),
            "a" | "left" => Some(Key::Left),
            "d" | "right" => Some(Key::Right),
            _ => Some(Key::Other),
        }
    }
}

/// GPIO button wrapper; stubbed on non-Linux platforms. Reports one press per
/// debounced falling edge.
#[cfg(target_os = "linux")]
pub struct Button {
    pin: rppal::gpio::InputPin,
    key: Key,
    held: bool,
    last: Instant,
    debounce: Duration,
}

#[cfg(target_os = "linux")]
impl Button {
    pub fn new(pin: u8, key: Key) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let input = gpio
            .get(pin)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
            .into_input_pullup();
        Ok(Self {
            pin: input,
            key,
            held: false,
            last: Instant::now(),
            debounce: Duration::from_millis(150),
        })
    }

    pub fn poll(&mut self) -> Option<Key> {
        let low = self.pin.is_low();
        let was_held = std::mem::replace(&mut self.held, low);
        let now = Instant::now();
        if low && !was_held && now.duration_since(self.last) > self.debounce {
            self.last = now;
            Some(self.key)
        } else {
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub struct Button;

#[cfg(not(target_os = "linux"))]
impl Button {
    pub fn new(_pin: u8, _key: Key) -> Result<Self> {
        Err(Error::InvalidArgs("buttons are unsupported on this platform".into()))
    }

    pub fn poll(&mut self) -> Option<Key> {
        None
    }
}

/// The configured buttons: none, one generic button, or UP, DOWN, LEFT, RIGHT.
#[derive(Default)]
pub struct ButtonPanel {
    buttons: Vec<Button>,
}

impl ButtonPanel {
    pub fn open(pins: &[u8]) -> Result<Self> {
        let keys: &[Key] = match pins.len() {
            0 => &[],
            1 => &[Key::Other],
            4 => &[Key::Up, Key::Down, Key::Left, Key::Right],
            n => {
                return Err(Error::InvalidArgs(format!(
                    "button_gpio_pins needs 0, 1 or 4 pins, got {n}"
                )))
            }
        };
        let buttons = pins
            .iter()
            .zip(keys)
            .map(|(&pin, &key)| Button::new(pin, key))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buttons })
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn poll(&mut self) -> Vec<Key> {
        self.buttons.iter_mut().filter_map(Button::poll).collect()
    }
}
