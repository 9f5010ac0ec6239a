use std::time::Duration;

use log::info;

use crate::{
    config::Pcf8574Addr,
    lcd_driver::{pcf8574::RppalBus, Hd44780, CANDIDATE_ADDRS},
    Result,
};

use super::{BacklightClock, DaylightSensor, Display};

/// The appliance's I2C character LCD.
pub struct Lcd {
    driver: Hd44780<RppalBus>,
    cols: u8,
    backlight: BacklightClock,
    daylight: DaylightSensor,
}

impl Lcd {
    pub fn open(
        path: &str,
        addr: Pcf8574Addr,
        cols: u8,
        rows: u8,
        daylight: DaylightSensor,
    ) -> Result<Self> {
        let mut bus = RppalBus::open(path)?;
        let addr = match addr {
            Pcf8574Addr::Auto => bus.detect_address(&CANDIDATE_ADDRS, CANDIDATE_ADDRS[0]),
            Pcf8574Addr::Addr(a) => a,
        };
        info!("lcd on {path} at 0x{addr:02x} ({cols}x{rows})");
        let driver = Hd44780::new(bus, addr, cols, rows)?;
        Ok(Self {
            driver,
            cols,
            backlight: BacklightClock::lit(),
            daylight,
        })
    }
}

impl Display for Lcd {
    fn cols(&self) -> usize {
        usize::from(self.cols)
    }

    fn clear(&mut self) -> Result<()> {
        self.driver.clear()
    }

    fn home(&mut self) -> Result<()> {
        self.driver.home()
    }

    fn display_string(&mut self, text: &str, row: u8) -> Result<()> {
        self.driver.write_row(row, text)
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.driver.write_text(text)
    }

    fn set_backlight(&mut self, on: bool) -> Result<()> {
        self.backlight.set(on);
        self.driver.set_backlight(on)
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
