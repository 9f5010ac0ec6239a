//! HD44780 character LCD behind a PCF8574 I2C backpack, driven in 4-bit mode.
//! Rows are written whole; there is no cursor wrapping.

use std::time::Duration;

use crate::Result;

pub mod pcf8574;

/// Byte-level I2C access, swappable for tests.
pub trait I2cBus {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<()>;
}

// PCF8574 pin mapping: P0 RS, P1 RW, P2 E, P3 backlight, P4-P7 data.
const PIN_RS: u8 = 0x01;
const PIN_E: u8 = 0x04;
const PIN_BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_HOME: u8 = 0x02;
const CMD_ENTRY_MODE_INC: u8 = 0x06;
const CMD_DISPLAY_OFF: u8 = 0x08;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT: u8 = 0x20;
const FLAG_TWO_LINES: u8 = 0x08;
const CMD_RESET: u8 = 0x30;
const CMD_SET_DDRAM: u8 = 0x80;

/// Probed in this order when the address is left on auto.
pub const CANDIDATE_ADDRS: [u8; 8] = [0x27, 0x26, 0x25, 0x24, 0x23, 0x22, 0x21, 0x20];

pub struct Hd44780<B: I2cBus> {
    bus: B,
    addr: u8,
    cols: u8,
    rows: u8,
    backlight: bool,
}

impl<B: I2cBus> Hd44780<B> {
    /// Run the power-on reset sequence and leave the display cleared, lit and on.
    pub fn new(bus: B, addr: u8, cols: u8, rows: u8) -> Result<Self> {
        let mut lcd = Self {
            bus,
            addr,
            cols: cols.min(40),
            rows: rows.clamp(1, 4),
            backlight: true,
        };
        lcd.bus.write_byte(addr, 0)?;
        sleep_ms(20);
        for delay in [5, 1, 1] {
            lcd.pulse(CMD_RESET)?;
            sleep_ms(delay);
        }
        lcd.pulse(CMD_FUNCTION_4BIT)?;
        sleep_ms(1);

        let lines = if lcd.rows > 1 { FLAG_TWO_LINES } else { 0 };
        lcd.command(CMD_FUNCTION_4BIT | lines)?;
        lcd.command(CMD_DISPLAY_OFF)?;
        lcd.clear()?;
        lcd.command(CMD_ENTRY_MODE_INC)?;
        lcd.command(CMD_DISPLAY_ON)?;
        Ok(lcd)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.command(CMD_CLEAR)
    }

    pub fn home(&mut self) -> Result<()> {
        self.command(CMD_HOME)
    }

    pub fn set_backlight(&mut self, on: bool) -> Result<()> {
        self.backlight = on;
        let mask = self.backlight_mask();
        self.bus.write_byte(self.addr, mask)
    }

    /// Overwrite `row` with `text`, padded or clipped to the row width.
    pub fn write_row(&mut self, row: u8, text: &str) -> Result<()> {
        self.move_to(0, row)?;
        let cols = usize::from(self.cols);
        let padded = format!("{:<cols$}", text.chars().take(cols).collect::<String>());
        self.write_text(&padded)
    }

    /// Raw characters at the current cursor. Non-ASCII characters become `?`.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let byte = if ch.is_ascii() { ch as u8 } else { b'?' };
            self.data(byte)?;
        }
        Ok(())
    }

    pub fn move_to(&mut self, col: u8, row: u8) -> Result<()> {
        let row = row % self.rows;
        let offset = match row {
            0 => 0,
            1 => 0x40,
            2 => self.cols,
            _ => 0x40 + self.cols,
        };
        self.command(CMD_SET_DDRAM | (offset + col.min(self.cols.saturating_sub(1))))
    }

    fn command(&mut self, cmd: u8) -> Result<()> {
        self.send(cmd, false)?;
        if cmd == CMD_CLEAR || cmd == CMD_HOME {
            sleep_ms(5);
        }
        Ok(())
    }

    fn data(&mut self, byte: u8) -> Result<()> {
        self.send(byte, true)
    }

    fn send(&mut self, byte: u8, is_data: bool) -> Result<()> {
        let mut base = self.backlight_mask();
        if is_data {
            base |= PIN_RS;
        }
        for nibble in [byte & 0xF0, byte << 4] {
            let out = base | nibble;
            self.bus.write_byte(self.addr, out | PIN_E)?;
            self.bus.write_byte(self.addr, out)?;
        }
        Ok(())
    }

    // Init nibbles go out before the backlight/RS bits mean anything.
    fn pulse(&mut self, high_nibble: u8) -> Result<()> {
        let out = high_nibble & 0xF0;
        self.bus.write_byte(self.addr, out | PIN_E)?;
        self.bus.write_byte(self.addr, out)
    }

    fn backlight_mask(&self) -> u8 {
        if self.backlight {
            PIN_BACKLIGHT
        } else {
            0
        }
    }
}

fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reassembles the nibble stream into whole bytes tagged command/data.
    #[derive(Debug, Default)]
    struct MockBus {
        raw: Vec<u8>,
        latched: Vec<(bool, u8)>,
        half: Option<(bool, u8)>,
        strobe: Option<u8>,
    }

    impl I2cBus for MockBus {
        fn write_byte(&mut self, _addr: u8, byte: u8) -> Result<()> {
            self.raw.push(byte);
            if byte & PIN_E != 0 {
                self.strobe = Some(byte);
            } else if let Some(strobed) = self.strobe.take() {
                let rs = strobed & PIN_RS != 0;
                let nibble = strobed >> 4;
                match self.half.take() {
                    Some((_, high)) => self.latched.push((rs, (high << 4) | nibble)),
                    None => self.half = Some((rs, nibble)),
                }
            }
            Ok(())
        }
    }

    impl MockBus {
        fn commands(&self) -> Vec<u8> {
            self.latched
                .iter()
                .filter(|(rs, _)| !rs)
                .map(|(_, b)| *b)
                .collect()
        }

        fn text(&self) -> String {
            self.latched
                .iter()
                .filter(|(rs, _)| *rs)
                .map(|(_, b)| *b as char)
                .collect()
        }
    }

    fn driver(cols: u8, rows: u8) -> Hd44780<MockBus> {
        let mut lcd = Hd44780::new(MockBus::default(), 0x27, cols, rows).unwrap();
        lcd.bus.latched.clear();
        lcd.bus.half = None;
        lcd
    }

    #[test]
    fn init_starts_with_reset_nibbles() {
        let lcd = Hd44780::new(MockBus::default(), 0x27, 16, 2).unwrap();
        assert_eq!(&lcd.bus.raw[..3], &[0x00, 0x34, 0x30]);
        assert!(lcd.bus.raw.iter().any(|b| b & PIN_BACKLIGHT != 0));
    }

    #[test]
    fn write_row_addresses_second_line_and_pads() {
        let mut lcd = driver(8, 2);
        lcd.write_row(1, "abc").unwrap();
        assert_eq!(lcd.bus.commands(), vec![CMD_SET_DDRAM | 0x40]);
        assert_eq!(lcd.bus.text(), "abc     ");
    }

    #[test]
    fn write_row_clips_and_replaces_non_ascii() {
        let mut lcd = driver(4, 2);
        lcd.write_row(0, "°C and more").unwrap();
        assert_eq!(lcd.bus.text(), "?C a");
    }

    #[test]
    fn backlight_off_clears_mask_on_later_writes() {
        let mut lcd = driver(16, 2);
        lcd.set_backlight(false).unwrap();
        let before = lcd.bus.raw.len();
        lcd.write_text("x").unwrap();
        assert!(lcd.bus.raw[before..].iter().all(|b| b & PIN_BACKLIGHT == 0));
    }

    #[test]
    fn data_nibbles_use_rs_on_p0_and_enable_on_p2() {
        let mut lcd = driver(16, 2);
        let before = lcd.bus.raw.len();
        lcd.write_text("A").unwrap();
        assert_eq!(&lcd.bus.raw[before..], &[0x4D, 0x49, 0x1D, 0x19]);
    }

    #[test]
    fn four_row_offsets_follow_column_count() {
        let mut lcd = driver(20, 4);
        lcd.move_to(0, 2).unwrap();
        lcd.move_to(0, 3).unwrap();
        assert_eq!(
            lcd.bus.commands(),
            vec![CMD_SET_DDRAM | 20, CMD_SET_DDRAM | (0x40 + 20)]
        );
    }
}
