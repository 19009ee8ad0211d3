//! Driver for Microchip 25xx family SPI EEPROMs.

use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
use thiserror::Error as ThisError;

use crate::bus::{Bus, BusError, CsTiming};

const READ: u8 = 0x03;
const WRITE: u8 = 0x02;
const WRITE_ENABLE: u8 = 0x06;
const READ_STATUS: u8 = 0x05;
const PAGE_ERASE: u8 = 0x42;
const CHIP_ERASE: u8 = 0xC7;
/// Carries the 9th address bit in the opcode of 512 byte devices.
const HIGH_HALF: u8 = 0x08;

const STATUS_BUSY: u8 = 0x01;
const BUSY_POLL_US: u32 = 10;
/// Upper bound on status polls while waiting for a write or erase to finish.
const MAX_BUSY_POLLS: u32 = 5_000;
/// Devices at least this big have dedicated page and chip erase instructions.
const ERASE_OPCODES_FROM: u32 = 0x1_0000;
const ERASED: u8 = 0xFF;

pub const TIMING: CsTiming = CsTiming {
    setup_ns: 1_000,
    hold_ns: 1_000,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("{len} bytes at {start:#x} exceed the {capacity} byte device")]
    OutOfRange { start: u32, len: usize, capacity: u32 },
    #[error("device stayed busy")]
    Unresponsive,
    #[error("{page_size} byte pages do not tile a {capacity} byte device")]
    Geometry { capacity: u32, page_size: u32 },
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Size and page layout of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    capacity: u32,
    page_size: u32,
}

impl Geometry {
    /// Both sizes must be powers of two and a page cannot be larger than the device.
    pub fn new(capacity: u32, page_size: u32) -> Result<Self, Error> {
        if !capacity.is_power_of_two()
            || !page_size.is_power_of_two()
            || page_size > capacity
        {
            return Err(Error::Geometry {
                capacity,
                page_size,
            });
        }

        Ok(Self {
            capacity,
            page_size,
        })
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[inline]
    #[must_use]
    pub fn pages(&self) -> u32 {
        self.capacity / self.page_size
    }

    /// Number of address bytes following an opcode.
    #[must_use]
    pub fn address_width(&self) -> usize {
        match self.capacity {
            ..=512 => 1,
            ..0x2_0000 => 2,
            _ => 3,
        }
    }

    /// Opcode for `base` when addressing `address`.
    #[must_use]
    pub fn opcode(&self, base: u8, address: u32) -> u8 {
        if self.capacity == 512 && address > 0xFF {
            base | HIGH_HALF
        } else {
            base
        }
    }

    /// Builds the instruction header: opcode followed by the address, most significant byte
    /// first.
    fn header(&self, base: u8, address: u32) -> ([u8; 4], usize) {
        let width = self.address_width();
        let mut header = [0; 4];

        header[0] = self.opcode(base, address);
        header[1..=width].copy_from_slice(&address.to_be_bytes()[4 - width..]);

        (header, width + 1)
    }

    fn check_range(&self, start: u32, len: usize) -> Result<(), Error> {
        let end = u32::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len));

        match end {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Error::OutOfRange {
                start,
                len,
                capacity: self.capacity,
            }),
        }
    }
}

#[derive(Debug)]
pub struct Eeprom<SPI, CS, D> {
    bus: Bus<SPI, CS, D>,
    geometry: Geometry,
}

impl<SPI, CS, D> Eeprom<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: D, geometry: Geometry) -> Result<Self, Error> {
        let bus = Bus::new(spi, cs, delay, TIMING)?;
        Ok(Self { bus, geometry })
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Fills `buf` with the bytes starting at `start`.
    pub fn read(&mut self, start: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.geometry.check_range(start, buf.len())?;
        let (header, len) = self.geometry.header(READ, start);

        self.bus.transaction(|bus| {
            bus.write(&header[..len])?;
            bus.read(buf)
        })?;

        Ok(())
    }

    /// Writes `data` at `start`, one page program per page touched.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&mut self, start: u32, data: &[u8]) -> Result<(), Error> {
        self.geometry.check_range(start, data.len())?;

        let mut address = start;
        let mut remaining = data;

        while !remaining.is_empty() {
            let room = self.geometry.page_size - address % self.geometry.page_size;
            let len = remaining.len().min(room as usize);
            let (chunk, rest) = remaining.split_at(len);

            self.program(address, |bus| bus.write(chunk))?;

            address += len as u32;
            remaining = rest;
        }

        Ok(())
    }

    /// Erases a single page.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clear_page(&mut self, page: u32) -> Result<(), Error> {
        let page_size = self.geometry.page_size;

        if page >= self.geometry.pages() {
            return Err(Error::OutOfRange {
                start: page.saturating_mul(page_size),
                len: page_size as usize,
                capacity: self.geometry.capacity,
            });
        }

        let address = page * page_size;

        if self.geometry.capacity < ERASE_OPCODES_FROM {
            return self.program(address, |bus| fill(bus, page_size as usize));
        }

        let (header, len) = self.geometry.header(PAGE_ERASE, address);
        self.enable_write()?;
        self.bus.transaction(|bus| bus.write(&header[..len]))?;
        self.wait_for_write()
    }

    /// Erases the whole device.
    pub fn clear_mem(&mut self) -> Result<(), Error> {
        if self.geometry.capacity < ERASE_OPCODES_FROM {
            return (0..self.geometry.pages()).try_for_each(|page| self.clear_page(page));
        }

        self.enable_write()?;
        self.bus.transaction(|bus| bus.write(&[CHIP_ERASE]))?;
        self.wait_for_write()
    }

    pub fn read_status(&mut self) -> Result<u8, Error> {
        let status = self.bus.transaction(|bus| {
            bus.write(&[READ_STATUS])?;
            bus.exchange(0)
        })?;

        Ok(status)
    }

    pub fn release(self) -> (SPI, CS, D) {
        self.bus.release()
    }

    /// Programs bytes produced by `payload` starting at `address`, then waits for the write
    /// cycle to finish. The payload must not cross a page boundary.
    fn program<F>(&mut self, address: u32, payload: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Bus<SPI, CS, D>) -> Result<(), BusError>,
    {
        let (header, len) = self.geometry.header(WRITE, address);

        self.enable_write()?;
        self.bus.transaction(|bus| {
            bus.write(&header[..len])?;
            payload(bus)
        })?;

        self.wait_for_write()
    }

    fn enable_write(&mut self) -> Result<(), Error> {
        self.bus.transaction(|bus| bus.write(&[WRITE_ENABLE]))?;
        Ok(())
    }

    fn wait_for_write(&mut self) -> Result<(), Error> {
        for _ in 0..MAX_BUSY_POLLS {
            if self.read_status()? & STATUS_BUSY == 0 {
                return Ok(());
            }
            self.bus.delay_us(BUSY_POLL_US);
        }

        Err(Error::Unresponsive)
    }
}

fn fill<SPI, CS, D>(bus: &mut Bus<SPI, CS, D>, mut len: usize) -> Result<(), BusError>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    const BLOCK: [u8; 16] = [ERASED; 16];

    while len > 0 {
        let n = len.min(BLOCK.len());
        bus.write(&BLOCK[..n])?;
        len -= n;
    }

    Ok(())
}
