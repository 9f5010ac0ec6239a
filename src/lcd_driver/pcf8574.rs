use crate::{lcd_driver::I2cBus, Error, Result};

/// Bus number of an I2C device node such as `/dev/i2c-1`.
pub fn bus_number(path: &str) -> Result<u8> {
    path.rsplit_once("i2c-")
        .and_then(|(_, n)| n.parse::<u8>().ok())
        .ok_or_else(|| Error::InvalidArgs(format!("lcd_path '{path}' is not an i2c device node")))
}

#[cfg(target_os = "linux")]
fn map_i2c_err(err: rppal::i2c::Error) -> Error {
    Error::Display(format!("i2c: {err}"))
}

/// rppal-backed I2C bus.
#[cfg(target_os = "linux")]
pub struct RppalBus {
    inner: rppal::i2c::I2c,
}

#[cfg(target_os = "linux")]
impl RppalBus {
    pub fn open(path: &str) -> Result<Self> {
        let inner = rppal::i2c::I2c::with_bus(bus_number(path)?).map_err(map_i2c_err)?;
        Ok(Self { inner })
    }

    /// First candidate address that acknowledges a write, or `fallback`.
    pub fn detect_address(&mut self, candidates: &[u8], fallback: u8) -> u8 {
        for &addr in candidates {
            if self.inner.set_slave_address(u16::from(addr)).is_ok()
                && self.inner.block_write(0, &[]).is_ok()
            {
                return addr;
            }
        }
        fallback
    }
}

#[cfg(target_os = "linux")]
impl I2cBus for RppalBus {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<()> {
        self.inner
            .set_slave_address(u16::from(addr))
            .map_err(map_i2c_err)?;
        self.inner.write(&[byte]).map(|_| ()).map_err(map_i2c_err)
    }
}

/// Stand-in on hosts without I2C; opening always fails.
#[cfg(not(target_os = "linux"))]
pub struct RppalBus;

#[cfg(not(target_os = "linux"))]
impl RppalBus {
    pub fn open(path: &str) -> Result<Self> {
        bus_number(path)?;
        Err(Error::Display("I2C is only available on Linux targets".into()))
    }

    pub fn detect_address(&mut self, _candidates: &[u8], fallback: u8) -> u8 {
        fallback
    }
}

#[cfg(not(target_os = "linux"))]
impl I2cBus for RppalBus {
    fn write_byte(&mut self, _addr: u8, _byte: u8) -> Result<()> {
        Err(Error::Display("I2C is only available on Linux targets".into()))
    }
}
