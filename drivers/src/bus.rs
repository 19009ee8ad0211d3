use embedded_hal::{
    delay::DelayNs,
    digital::{self, OutputPin},
    spi::{self, SpiBus},
};
use thiserror::Error as ThisError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum BusError {
    #[error("SPI transfer failed: {0:?}")]
    Spi(spi::ErrorKind),
    #[error("chip select failed: {0:?}")]
    ChipSelect(digital::ErrorKind),
}

/// Minimum delays around the chip select edges of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsTiming {
    /// Chip select asserted to first clock edge.
    pub setup_ns: u32,
    /// Last clock edge to chip select deasserted.
    pub hold_ns: u32,
}

/// A SPI bus with a single, manually driven, active low chip select.
///
/// Every transaction is bracketed by the [`CsTiming`] delays. Timing between consecutive
/// transactions is up to the chip driver.
#[derive(Debug)]
pub struct Bus<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
    timing: CsTiming,
}

impl<SPI, CS, D> Bus<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    /// Creates the bus, leaving the chip deselected.
    pub fn new(spi: SPI, cs: CS, delay: D, timing: CsTiming) -> Result<Self, BusError> {
        let mut bus = Self {
            spi,
            cs,
            delay,
            timing,
        };
        bus.cs.set_high().map_err(cs_error)?;
        Ok(bus)
    }

    pub fn select(&mut self) -> Result<(), BusError> {
        self.cs.set_low().map_err(cs_error)?;
        self.delay.delay_ns(self.timing.setup_ns);
        Ok(())
    }

    pub fn deselect(&mut self) -> Result<(), BusError> {
        let flushed = self.spi.flush().map_err(spi_error);
        self.delay.delay_ns(self.timing.hold_ns);
        self.cs.set_high().map_err(cs_error)?;
        flushed
    }

    /// Runs `f` with the chip selected.
    ///
    /// The chip is deselected afterwards even if `f` fails. The first error wins.
    pub fn transaction<R, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, E>) -> Result<R, E>
    where
        E: From<BusError>,
    {
        self.select()?;
        let result = f(self);
        let deselected = self.deselect();
        let value = result?;
        deselected?;
        Ok(value)
    }

    /// Full duplex exchange of a single byte.
    pub fn exchange(&mut self, byte: u8) -> Result<u8, BusError> {
        let mut buf = [byte];
        self.spi.transfer_in_place(&mut buf).map_err(spi_error)?;
        Ok(buf[0])
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.spi.write(bytes).map_err(spi_error)
    }

    /// Clocks out zeros, filling `buf` with what comes back.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        buf.fill(0);
        self.spi.transfer_in_place(buf).map_err(spi_error)
    }

    /// Deselects the chip for `us` microseconds in the middle of a transaction.
    pub fn pause_us(&mut self, us: u32) -> Result<(), BusError> {
        self.deselect()?;
        self.delay.delay_us(us);
        self.select()
    }

    pub fn pause_ms(&mut self, ms: u32) -> Result<(), BusError> {
        self.deselect()?;
        self.delay.delay_ms(ms);
        self.select()
    }

    #[inline]
    pub fn delay_ns(&mut self, ns: u32) {
        self.delay.delay_ns(ns);
    }

    #[inline]
    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    #[inline]
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }
}

fn spi_error<E: spi::Error>(e: E) -> BusError {
    BusError::Spi(e.kind())
}

fn cs_error<E: digital::Error>(e: E) -> BusError {
    BusError::ChipSelect(e.kind())
}
