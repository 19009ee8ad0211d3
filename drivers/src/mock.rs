//! Simulated chips behind `embedded-hal` mocks.
//!
//! The SPI bus, the chip select pin and the delay share one [`Sim`], which routes every byte
//! exchanged while the chip is selected to a behavioural model and records the traffic.

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use embedded_hal::{
    delay::DelayNs,
    digital::{self, OutputPin},
    spi::{self, ErrorKind, SpiBus},
};

pub type SharedSim = Rc<RefCell<Sim>>;

#[derive(Debug)]
pub struct Sim {
    pub chip: Chip,
    pub selected: bool,
    frame: Vec<u8>,
    /// Bytes sent during each completed transaction.
    pub transactions: Vec<Vec<u8>>,
    /// Bytes clocked while the chip was not selected.
    pub stray_bytes: usize,
    pub elapsed_ns: u64,
    pub fail_spi: bool,
}

#[derive(Debug)]
pub enum Chip {
    Eeprom(EepromModel),
    Sensor(SensorModel),
}

impl Sim {
    fn new(chip: Chip) -> SharedSim {
        Rc::new(RefCell::new(Self {
            chip,
            selected: false,
            frame: Vec::new(),
            transactions: Vec::new(),
            stray_bytes: 0,
            elapsed_ns: 0,
            fail_spi: false,
        }))
    }

    pub fn eeprom(&self) -> &EepromModel {
        match &self.chip {
            Chip::Eeprom(model) => model,
            Chip::Sensor(_) => panic!("not an EEPROM"),
        }
    }

    pub fn eeprom_mut(&mut self) -> &mut EepromModel {
        match &mut self.chip {
            Chip::Eeprom(model) => model,
            Chip::Sensor(_) => panic!("not an EEPROM"),
        }
    }

    pub fn sensor(&self) -> &SensorModel {
        match &self.chip {
            Chip::Sensor(model) => model,
            Chip::Eeprom(_) => panic!("not a sensor"),
        }
    }

    pub fn sensor_mut(&mut self) -> &mut SensorModel {
        match &mut self.chip {
            Chip::Sensor(model) => model,
            Chip::Eeprom(_) => panic!("not a sensor"),
        }
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        if !self.selected {
            self.stray_bytes += 1;
            return 0xFF;
        }

        self.frame.push(mosi);

        match &mut self.chip {
            Chip::Eeprom(model) => model.exchange(&self.frame),
            Chip::Sensor(model) => model.exchange(mosi, self.elapsed_ns),
        }
    }

    fn select(&mut self) {
        self.selected = true;
    }

    fn deselect(&mut self) {
        if !self.selected {
            return;
        }

        self.selected = false;
        let frame = std::mem::take(&mut self.frame);

        match &mut self.chip {
            Chip::Eeprom(model) => model.end(&frame),
            Chip::Sensor(model) => model.end(),
        }

        if !frame.is_empty() {
            self.transactions.push(frame);
        }
    }
}

#[derive(Debug)]
pub struct MockSpi(SharedSim);

#[derive(Debug)]
pub struct MockPin(SharedSim);

#[derive(Debug)]
pub struct MockDelay(SharedSim);

#[derive(Clone, Copy, Debug)]
pub struct MockSpiError;

impl spi::Error for MockSpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl spi::ErrorType for MockSpi {
    type Error = MockSpiError;
}

impl SpiBus for MockSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        self.transfer_in_place(words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut sim = self.0.borrow_mut();
        if sim.fail_spi {
            return Err(MockSpiError);
        }

        for word in words {
            sim.exchange(*word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut sim = self.0.borrow_mut();
        if sim.fail_spi {
            return Err(MockSpiError);
        }

        for i in 0..read.len().max(write.len()) {
            let miso = sim.exchange(write.get(i).copied().unwrap_or_default());
            if let Some(word) = read.get_mut(i) {
                *word = miso;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut sim = self.0.borrow_mut();
        if sim.fail_spi {
            return Err(MockSpiError);
        }

        for word in words {
            *word = sim.exchange(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().deselect();
        Ok(())
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().elapsed_ns += u64::from(ns);
    }
}

fn parts(sim: &SharedSim) -> (MockSpi, MockPin, MockDelay) {
    (
        MockSpi(sim.clone()),
        MockPin(sim.clone()),
        MockDelay(sim.clone()),
    )
}

pub fn eeprom(capacity: u32, page_size: u32) -> (SharedSim, MockSpi, MockPin, MockDelay) {
    let sim = Sim::new(Chip::Eeprom(EepromModel::new(capacity, page_size)));
    let (spi, cs, delay) = parts(&sim);
    (sim, spi, cs, delay)
}

pub fn sensor() -> (SharedSim, MockSpi, MockPin, MockDelay) {
    let sim = Sim::new(Chip::Sensor(SensorModel::new()));
    let (spi, cs, delay) = parts(&sim);
    (sim, spi, cs, delay)
}

/// A 25xx EEPROM.
#[derive(Clone, Debug)]
pub struct EepromModel {
    pub memory: Vec<u8>,
    page_size: usize,
    pub write_enabled: bool,
    /// Status reads reporting busy after each write or erase.
    pub busy_cycles: u32,
    /// Status reads left reporting busy.
    pub busy_polls: u32,
    /// Never finishes a write cycle.
    pub stuck: bool,
    /// `(address, len)` of every page program.
    pub page_writes: Vec<(usize, usize)>,
}

impl EepromModel {
    fn new(capacity: u32, page_size: u32) -> Self {
        Self {
            memory: vec![0xFF; capacity as usize],
            page_size: page_size as usize,
            write_enabled: false,
            busy_cycles: 0,
            busy_polls: 0,
            stuck: false,
            page_writes: Vec::new(),
        }
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }

    fn address_width(&self) -> usize {
        match self.capacity() {
            ..=512 => 1,
            ..0x2_0000 => 2,
            _ => 3,
        }
    }

    /// Decodes the address following the opcode, if the frame is long enough to hold it.
    fn address(&self, frame: &[u8]) -> Option<usize> {
        let width = self.address_width();
        let bytes = frame.get(1..=width)?;
        let mut address = bytes
            .iter()
            .fold(0, |acc, b| (acc << 8) | usize::from(*b));

        if self.capacity() == 512 && frame[0] & 0x08 != 0 {
            address |= 0x100;
        }

        Some(address)
    }

    fn status(&self) -> u8 {
        let busy = self.stuck || self.busy_polls > 0;
        u8::from(busy) | (u8::from(self.write_enabled) << 1)
    }

    fn exchange(&mut self, frame: &[u8]) -> u8 {
        let header = self.address_width() + 1;

        match frame[0] {
            0x03 | 0x0B if frame.len() > header => self
                .address(frame)
                .map_or(0xFF, |a| self.memory[(a + frame.len() - header - 1) % self.capacity()]),
            0x05 if frame.len() == 2 => self.status(),
            _ => 0xFF,
        }
    }

    fn end(&mut self, frame: &[u8]) {
        let Some(&opcode) = frame.first() else {
            return;
        };

        if self.busy_polls > 0 || self.stuck {
            // Only status reads are honoured during a write cycle.
            if opcode == 0x05 && self.busy_polls > 0 {
                self.busy_polls -= 1;
            }
            return;
        }

        match opcode {
            0x06 => self.write_enabled = true,
            0x02 | 0x0A if self.write_enabled => {
                let header = self.address_width() + 1;
                let Some(address) = self.address(frame) else {
                    return;
                };
                let data = &frame[header..];
                let page = address - address % self.page_size;

                for (i, byte) in data.iter().enumerate() {
                    let offset = (address - page + i) % self.page_size;
                    self.memory[page + offset] = *byte;
                }
                self.page_writes.push((address, data.len()));
                self.start_write_cycle();
            }
            0x42 if self.write_enabled => {
                if let Some(address) = self.address(frame) {
                    let page = address - address % self.page_size;
                    self.memory[page..page + self.page_size].fill(0xFF);
                }
                self.start_write_cycle();
            }
            0xC7 if self.write_enabled => {
                self.memory.fill(0xFF);
                self.start_write_cycle();
            }
            _ => (),
        }
    }

    fn start_write_cycle(&mut self) {
        self.write_enabled = false;
        self.busy_polls = self.busy_cycles;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SensorState {
    Idle,
    ReadAddress(u8),
    WriteAddress(u8),
    MotionBurst(usize),
    SromLoad,
    /// Burst load issued out of sequence, the bytes go nowhere.
    SromIgnored,
    PixelBurst(usize),
}

/// Progress through the SROM download preamble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SromSequence {
    Idle,
    Initiated { at_ns: u64 },
    Ready,
}

/// Longest frame period at the default frame rate, which must pass between the initiate and
/// burst load codes.
const FRAME_PERIOD_NS: u64 = 511_000;

/// An ADNS-9500 register file.
#[derive(Clone, Debug)]
pub struct SensorModel {
    state: SensorState,
    srom_sequence: SromSequence,
    pub registers: [u8; 0x80],
    /// Observation register value once a frame has passed after it was cleared.
    pub observation: u8,
    pub product_id: u8,
    pub revision_id: u8,
    /// Bytes received during the last SROM burst load.
    pub srom: Vec<u8>,
    /// SROM ID reported after a successful download.
    pub srom_id: u8,
    /// CRC reported after a download.
    pub srom_crc: u16,
    pub laser_fault: bool,
    pub burst: [u8; 14],
    /// Pending motion, as reported by the delta registers.
    pub delta: Option<(i16, i16)>,
    latched: (i16, i16),
    /// Motion reads before the first pixel of a captured frame is ready. `None` never gets ready.
    pub first_pixel_after: Option<u32>,
    frame_unlock: bool,
    frame_armed: bool,
    pub resets: u32,
}

impl SensorModel {
    fn new() -> Self {
        let mut model = Self {
            state: SensorState::Idle,
            srom_sequence: SromSequence::Idle,
            registers: [0; 0x80],
            observation: 0x3F,
            product_id: 0x33,
            revision_id: 0x03,
            srom: Vec::new(),
            srom_id: 0xA4,
            srom_crc: 0xBEEF,
            laser_fault: false,
            burst: [0; 14],
            delta: None,
            latched: (0, 0),
            first_pixel_after: Some(0),
            frame_unlock: false,
            frame_armed: false,
            resets: 0,
        };
        model.power_up();
        model
    }

    fn power_up(&mut self) {
        self.registers = [0; 0x80];
        self.registers[0x0F] = 0x12;
        self.registers[0x20] = 0x01;
        self.srom.clear();
        self.srom_sequence = SromSequence::Idle;
        self.frame_unlock = false;
        self.frame_armed = false;
    }

    fn read(&mut self, address: u8) -> u8 {
        match address {
            0x00 => self.product_id,
            0x01 => self.revision_id,
            0x02 => {
                let mut motion = 0;
                if let Some(delta) = self.delta.take() {
                    self.latched = delta;
                    motion |= 0x80;
                }
                if self.laser_fault {
                    motion |= 0x40;
                }
                if self.frame_armed {
                    match &mut self.first_pixel_after {
                        Some(0) => motion |= 0x01,
                        Some(n) => *n -= 1,
                        None => (),
                    }
                }
                motion
            }
            0x03 => self.latched.0.to_le_bytes()[0],
            0x04 => self.latched.0.to_le_bytes()[1],
            0x05 => self.latched.1.to_le_bytes()[0],
            0x06 => self.latched.1.to_le_bytes()[1],
            0x2A if !self.srom.is_empty() => self.srom_id,
            0x25 => self.srom_crc.to_le_bytes()[0],
            0x26 => self.srom_crc.to_le_bytes()[1],
            _ => self.registers[usize::from(address)],
        }
    }

    fn write(&mut self, address: u8, value: u8, now_ns: u64) {
        match (address, value) {
            (0x13, 0x1D) => {
                self.srom_sequence = if self.registers[0x39] & 0x02 == 0 {
                    SromSequence::Idle
                } else {
                    SromSequence::Initiated { at_ns: now_ns }
                };
                self.registers[0x13] = value;
            }
            (0x13, 0x18) => {
                self.srom_sequence = match self.srom_sequence {
                    SromSequence::Initiated { at_ns } if now_ns - at_ns >= FRAME_PERIOD_NS => {
                        SromSequence::Ready
                    }
                    _ => SromSequence::Idle,
                };
                self.registers[0x13] = value;
            }
            (0x3A, 0x5A) => {
                self.resets += 1;
                self.power_up();
            }
            (0x24, _) => self.registers[0x24] = self.observation,
            (0x12, 0x93) => self.frame_unlock = true,
            (0x12, 0xC5) if self.frame_unlock => self.frame_armed = true,
            _ => self.registers[usize::from(address)] = value,
        }
    }

    fn exchange(&mut self, mosi: u8, now_ns: u64) -> u8 {
        let (next, miso) = match self.state {
            SensorState::Idle => {
                let next = match mosi {
                    0x50 => SensorState::MotionBurst(0),
                    0xE2 if self.srom_sequence == SromSequence::Ready => {
                        self.srom.clear();
                        self.srom_sequence = SromSequence::Idle;
                        SensorState::SromLoad
                    }
                    0xE2 => SensorState::SromIgnored,
                    0x64 => SensorState::PixelBurst(0),
                    a if a & 0x80 != 0 => SensorState::WriteAddress(a & 0x7F),
                    a => SensorState::ReadAddress(a),
                };
                (next, 0)
            }
            SensorState::ReadAddress(address) => (SensorState::Idle, self.read(address)),
            SensorState::WriteAddress(address) => {
                self.write(address, mosi, now_ns);
                (SensorState::Idle, 0)
            }
            SensorState::MotionBurst(i) => (
                SensorState::MotionBurst(i + 1),
                self.burst.get(i).copied().unwrap_or_default(),
            ),
            SensorState::SromLoad => {
                self.srom.push(mosi);
                (SensorState::SromLoad, 0)
            }
            SensorState::SromIgnored => (SensorState::SromIgnored, 0),
            #[allow(clippy::cast_possible_truncation)]
            SensorState::PixelBurst(i) => (SensorState::PixelBurst(i + 1), i as u8),
        };

        self.state = next;
        miso
    }

    fn end(&mut self) {
        self.state = SensorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};

    use super::*;

    fn send(spi: &mut MockSpi, cs: &mut MockPin, bytes: &[u8]) {
        cs.set_low().unwrap();
        spi.write(bytes).unwrap();
        cs.set_high().unwrap();
    }

    #[test]
    fn test_srom_download_in_sequence() {
        let (sim, mut spi, mut cs, mut delay) = sensor();

        send(&mut spi, &mut cs, &[0xB9, 0x02, 0x93, 0x1D]);
        delay.delay_us(511);
        send(&mut spi, &mut cs, &[0x93, 0x18, 0xE2, 0x01, 0x02]);

        assert_eq!(sim.borrow().sensor().srom, [0x01, 0x02]);
    }

    #[test]
    fn test_srom_download_out_of_sequence() {
        // Burst load without the preamble.
        let (sim, mut spi, mut cs, _) = sensor();
        send(&mut spi, &mut cs, &[0xE2, 0x01, 0x02]);
        assert!(sim.borrow().sensor().srom.is_empty());

        // Initiate without SROM size reporting.
        let (sim, mut spi, mut cs, mut delay) = sensor();
        send(&mut spi, &mut cs, &[0x93, 0x1D]);
        delay.delay_us(511);
        send(&mut spi, &mut cs, &[0x93, 0x18, 0xE2, 0x01]);
        assert!(sim.borrow().sensor().srom.is_empty());

        // Burst load code before a frame has passed.
        let (sim, mut spi, mut cs, _) = sensor();
        send(&mut spi, &mut cs, &[0xB9, 0x02, 0x93, 0x1D]);
        send(&mut spi, &mut cs, &[0x93, 0x18, 0xE2, 0x01]);
        assert!(sim.borrow().sensor().srom.is_empty());

        // Burst load code before initiate.
        let (sim, mut spi, mut cs, mut delay) = sensor();
        send(&mut spi, &mut cs, &[0xB9, 0x02, 0x93, 0x18]);
        delay.delay_us(511);
        send(&mut spi, &mut cs, &[0x93, 0x1D, 0xE2, 0x01]);
        assert!(sim.borrow().sensor().srom.is_empty());
    }
}
