//! Driver for the Avago ADNS-9500 laser mouse sensor.
//!
//! The sensor only tracks properly once its SROM has been downloaded, see
//! [`Adns9500::reset_with_firmware`]. Every operation except [`Adns9500::reset`] requires a
//! successful reset first and fails with [`Error::NotEnabled`] otherwise.

pub mod motion;
pub mod register;
mod timing;

use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
use thiserror::Error as ThisError;

pub use motion::{BURST_LEN, CPI_UNIT, DEFAULT_CPI, Delta, MotionBurst, cpi_to_resolution};
pub use register::Register;

use crate::bus::{Bus, BusError, CsTiming};
use register::{
    CONFIGURATION_II_RPT_MOD, CONFIGURATION_IV_SROM_SIZE, FRAME_CAPTURE_UNLOCK,
    LASER_CTRL0_FORCE_DISABLED, MOTION_FAULT, MOTION_MOT, MOTION_PIXEL_FIRST, OBSERVATION_TEST,
    POWER_UP_RESET, PRODUCT_ID, REVISION_ID, SROM_BURST_LOAD, SROM_CRC, SROM_INITIATE,
};
use timing::{
    MAX_FRAME_PERIOD, POWER_UP_MS, SROM_CRC_MS, SROM_SETTLE, T_BEXIT_NS, T_LOAD, T_NCS_SCLK_NS,
    T_SCLK_NCS_NS, T_SRAD, T_SRR, T_SRW, T_SWW,
};

pub const PIXELS_PER_FRAME: usize = 900;
/// Upper bound on motion register polls while waiting for a captured frame.
const FIRST_PIXEL_POLLS: u32 = 1_000;

pub const TIMING: CsTiming = CsTiming {
    setup_ns: T_NCS_SCLK_NS,
    hold_ns: T_SCLK_NCS_NS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("sensor is not enabled")]
    NotEnabled,
    #[error("observation self test failed: {0:#04x}")]
    ObservationTest(u8),
    #[error("unexpected product ID {0:#04x}")]
    ProductId(u8),
    #[error("unexpected revision ID {0:#04x}")]
    RevisionId(u8),
    #[error("SROM download was not accepted")]
    FirmwareRejected,
    #[error("laser fault detected")]
    LaserFault,
    #[error("SROM CRC {actual:#06x}, expected {expected:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("SROM ID {actual:#04x}, expected {expected:#04x}")]
    SromId { expected: u8, actual: u8 },
    #[error("sensor did not become ready")]
    Unresponsive,
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// An SROM image along with what the sensor should report after downloading it.
#[derive(Clone, Copy, Debug)]
pub struct Firmware<I> {
    pub image: I,
    pub crc: u16,
    pub id: Option<u8>,
}

/// What the sensor reported after an SROM download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Srom {
    pub id: u8,
    pub crc: u16,
}

/// Register access within a transaction.
trait Registers {
    fn send(&mut self, register: Register, value: u8) -> Result<(), BusError>;

    fn receive(&mut self, register: Register) -> Result<u8, BusError>;
}

impl<SPI, CS, D> Registers for Bus<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    fn send(&mut self, register: Register, value: u8) -> Result<(), BusError> {
        self.write(&[register.write_address(), value])
    }

    fn receive(&mut self, register: Register) -> Result<u8, BusError> {
        self.write(&[register.read_address()])?;
        self.delay_us(T_SRAD);
        self.exchange(0)
    }
}

#[derive(Debug)]
pub struct Adns9500<SPI, CS, D> {
    bus: Bus<SPI, CS, D>,
    enabled: bool,
    x_cpi: u16,
    y_cpi: u16,
}

impl<SPI, CS, D> Adns9500<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    /// Creates the driver. The SPI bus must run in mode 3 at 2 MHz at most.
    pub fn new(spi: SPI, cs: CS, delay: D) -> Result<Self, Error> {
        Ok(Self {
            bus: Bus::new(spi, cs, delay, TIMING)?,
            enabled: false,
            x_cpi: DEFAULT_CPI,
            y_cpi: DEFAULT_CPI,
        })
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current X and Y resolution, in counts per inch.
    #[inline]
    #[must_use]
    pub fn cpi(&self) -> (u16, u16) {
        (self.x_cpi, self.y_cpi)
    }

    /// Power cycles the sensor and checks that it is the expected chip.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.enabled = false;

        // Resynchronizes the serial port.
        self.bus.deselect()?;

        let (product, revision) = self.bus.transaction(|bus| -> Result<_, Error> {
            bus.send(Register::PowerUpReset, POWER_UP_RESET)?;
            bus.pause_ms(POWER_UP_MS)?;

            // Takes the sensor out of shutdown.
            bus.send(Register::Observation, 0)?;
            bus.pause_us(MAX_FRAME_PERIOD)?;

            let observation = bus.receive(Register::Observation)?;
            if observation & OBSERVATION_TEST == 0 {
                return Err(Error::ObservationTest(observation));
            }

            for register in [
                Register::Motion,
                Register::DeltaXL,
                Register::DeltaXH,
                Register::DeltaYL,
                Register::DeltaYH,
            ] {
                bus.delay_us(T_SRR);
                bus.receive(register)?;
            }

            bus.delay_us(T_SRR);
            let product = bus.receive(Register::ProductId)?;
            bus.delay_us(T_SRR);
            let revision = bus.receive(Register::RevisionId)?;

            Ok((product, revision))
        })?;

        if product != PRODUCT_ID {
            return Err(Error::ProductId(product));
        }
        if revision != REVISION_ID {
            return Err(Error::RevisionId(revision));
        }

        self.x_cpi = DEFAULT_CPI;
        self.y_cpi = DEFAULT_CPI;
        self.enabled = true;
        Ok(())
    }

    /// Resets the sensor, downloads `firmware`, verifies it and turns the laser on.
    pub fn reset_with_firmware<I>(&mut self, firmware: Firmware<I>) -> Result<Srom, Error>
    where
        I: IntoIterator<Item = u8>,
    {
        self.reset()?;
        let srom = self.upload_firmware(firmware.image)?;

        if srom.crc != firmware.crc {
            return Err(Error::CrcMismatch {
                expected: firmware.crc,
                actual: srom.crc,
            });
        }

        if let Some(expected) = firmware.id.filter(|id| *id != srom.id) {
            return Err(Error::SromId {
                expected,
                actual: srom.id,
            });
        }

        self.enable_laser(true)?;
        Ok(srom)
    }

    pub fn shutdown(&mut self) -> Result<(), Error> {
        self.ensure_enabled()?;
        self.bus
            .transaction(|bus| bus.send(Register::PowerUpReset, POWER_UP_RESET))?;
        self.enabled = false;
        Ok(())
    }

    pub fn read(&mut self, register: Register) -> Result<u8, Error> {
        self.ensure_enabled()?;
        let value = self.bus.transaction(|bus| bus.receive(register))?;
        Ok(value)
    }

    /// Reads a 16-bit value split over two registers, lower half first.
    pub fn read_pair(&mut self, upper: Register, lower: Register) -> Result<u16, Error> {
        self.ensure_enabled()?;

        let value = self.bus.transaction(|bus| -> Result<_, BusError> {
            let lower = bus.receive(lower)?;
            bus.delay_us(T_SRR);
            let upper = bus.receive(upper)?;
            Ok(u16::from_be_bytes([upper, lower]))
        })?;

        Ok(value)
    }

    pub fn write(&mut self, register: Register, value: u8) -> Result<(), Error> {
        self.ensure_enabled()?;
        self.bus.transaction(|bus| bus.send(register, value))?;
        self.bus.delay_us(T_SWW);
        Ok(())
    }

    /// Downloads an SROM image.
    ///
    /// Returns the SROM ID and CRC the sensor reports afterwards. Checking them against the
    /// expected values is up to the caller.
    pub fn upload_firmware<I>(&mut self, image: I) -> Result<Srom, Error>
    where
        I: IntoIterator<Item = u8>,
    {
        self.ensure_enabled()?;

        self.bus.transaction(|bus| -> Result<_, BusError> {
            bus.send(Register::ConfigurationIV, CONFIGURATION_IV_SROM_SIZE)?;
            bus.delay_us(T_SWW);
            bus.send(Register::SromEnable, SROM_INITIATE)?;
            bus.pause_us(MAX_FRAME_PERIOD)?;

            bus.send(Register::SromEnable, SROM_BURST_LOAD)?;
            bus.delay_us(T_SWW);
            bus.write(&[Register::SromLoadBurst.write_address()])?;

            for byte in image {
                bus.delay_us(T_LOAD);
                bus.write(&[byte])?;
            }

            Ok(())
        })?;
        self.bus.delay_ns(T_BEXIT_NS);
        self.bus.delay_us(SROM_SETTLE);

        let id = self.bus.transaction(|bus| bus.receive(Register::SromId))?;
        if id == 0 {
            return Err(Error::FirmwareRejected);
        }

        let motion = self.bus.transaction(|bus| bus.receive(Register::Motion))?;
        if motion & MOTION_FAULT != 0 {
            return Err(Error::LaserFault);
        }

        let crc = self.bus.transaction(|bus| -> Result<_, BusError> {
            bus.send(Register::SromEnable, SROM_CRC)?;
            bus.pause_ms(SROM_CRC_MS)?;
            let lower = bus.receive(Register::DataOutLower)?;
            bus.delay_us(T_SRR);
            let upper = bus.receive(Register::DataOutUpper)?;
            Ok(u16::from_be_bytes([upper, lower]))
        })?;

        Ok(Srom { id, crc })
    }

    pub fn enable_laser(&mut self, enable: bool) -> Result<(), Error> {
        self.ensure_enabled()?;

        self.bus.transaction(|bus| {
            let ctrl = bus.receive(Register::LaserCtrl0)?;
            let ctrl = if enable {
                ctrl & !LASER_CTRL0_FORCE_DISABLED
            } else {
                ctrl | LASER_CTRL0_FORCE_DISABLED
            };
            bus.delay_us(T_SRW);
            bus.send(Register::LaserCtrl0, ctrl)
        })?;
        self.bus.delay_us(T_SWW);

        Ok(())
    }

    /// Sets the same resolution on both axes.
    pub fn set_resolution(&mut self, cpi: u16) -> Result<(), Error> {
        self.ensure_enabled()?;
        let code = cpi_to_resolution(cpi);

        self.bus.transaction(|bus| {
            let config = bus.receive(Register::ConfigurationII)?;
            bus.delay_us(T_SRW);
            bus.send(Register::ConfigurationII, config & !CONFIGURATION_II_RPT_MOD)?;
            bus.delay_us(T_SWW);
            bus.send(Register::ConfigurationI, code)
        })?;
        self.bus.delay_us(T_SWW);

        self.x_cpi = u16::from(code) * CPI_UNIT;
        self.y_cpi = self.x_cpi;
        Ok(())
    }

    /// Sets independent X and Y resolutions.
    pub fn set_resolution_xy(&mut self, cpi_x: u16, cpi_y: u16) -> Result<(), Error> {
        self.ensure_enabled()?;
        let code_x = cpi_to_resolution(cpi_x);
        let code_y = cpi_to_resolution(cpi_y);

        self.bus.transaction(|bus| {
            let config = bus.receive(Register::ConfigurationII)?;
            bus.delay_us(T_SRW);
            bus.send(Register::ConfigurationII, config | CONFIGURATION_II_RPT_MOD)?;
            bus.delay_us(T_SWW);
            bus.send(Register::ConfigurationI, code_x)?;
            bus.delay_us(T_SWW);
            bus.send(Register::ConfigurationV, code_y)
        })?;
        self.bus.delay_us(T_SWW);

        self.x_cpi = u16::from(code_x) * CPI_UNIT;
        self.y_cpi = u16::from(code_y) * CPI_UNIT;
        Ok(())
    }

    /// Motion since the last call, if any. Reading the motion register resets it.
    pub fn motion_delta(&mut self) -> Result<Option<Delta<i16>>, Error> {
        self.ensure_enabled()?;

        let delta = self.bus.transaction(|bus| -> Result<_, BusError> {
            if bus.receive(Register::Motion)? & MOTION_MOT == 0 {
                return Ok(None);
            }

            let mut raw = [0; 4];
            for (byte, register) in raw.iter_mut().zip([
                Register::DeltaXL,
                Register::DeltaXH,
                Register::DeltaYL,
                Register::DeltaYH,
            ]) {
                bus.delay_us(T_SRR);
                *byte = bus.receive(register)?;
            }

            Ok(Some(Delta {
                dx: i16::from_le_bytes([raw[0], raw[1]]),
                dy: i16::from_le_bytes([raw[2], raw[3]]),
            }))
        })?;

        Ok(delta)
    }

    /// Same as [`Adns9500::motion_delta`], in millimeters.
    pub fn motion_delta_mm(&mut self) -> Result<Option<Delta<f32>>, Error> {
        let (x_cpi, y_cpi) = self.cpi();

        Ok(self.motion_delta()?.map(|delta| Delta {
            dx: motion::counts_to_mm(delta.dx, x_cpi),
            dy: motion::counts_to_mm(delta.dy, y_cpi),
        }))
    }

    /// Reads the motion burst and clears the latched motion flag.
    pub fn motion_burst(&mut self) -> Result<MotionBurst, Error> {
        self.ensure_enabled()?;
        let mut raw = [0; BURST_LEN];

        self.bus.transaction(|bus| {
            bus.write(&[Register::MotionBurst.read_address()])?;
            bus.delay_us(T_SRAD);
            bus.read(&mut raw)
        })?;
        self.bus.delay_ns(T_BEXIT_NS);

        self.bus.transaction(|bus| bus.send(Register::Motion, 0))?;
        self.bus.delay_us(T_SWW);

        Ok(MotionBurst::decode(&raw, self.x_cpi, self.y_cpi))
    }

    /// Captures a raw frame.
    ///
    /// The sensor stops navigating and loses its SROM, so it has to be reset afterwards. Until
    /// then every operation fails with [`Error::NotEnabled`].
    pub fn capture_frame(&mut self, pixels: &mut [u8; PIXELS_PER_FRAME]) -> Result<(), Error> {
        self.ensure_enabled()?;
        self.enabled = false;

        self.bus.transaction(|bus| -> Result<_, Error> {
            let [unlock, capture] = FRAME_CAPTURE_UNLOCK;
            bus.send(Register::FrameCapture, unlock)?;
            bus.delay_us(T_SWW);
            bus.send(Register::FrameCapture, capture)?;
            bus.pause_us(2 * MAX_FRAME_PERIOD)?;

            let mut polls = 0;
            while bus.receive(Register::Motion)? & MOTION_PIXEL_FIRST == 0 {
                polls += 1;
                if polls == FIRST_PIXEL_POLLS {
                    return Err(Error::Unresponsive);
                }
                bus.delay_us(T_SRR);
            }
            bus.delay_us(T_SRR);

            bus.write(&[Register::PixelBurst.read_address()])?;
            bus.delay_us(T_SRAD);

            for pixel in pixels.iter_mut() {
                *pixel = bus.exchange(0)?;
                bus.delay_us(T_LOAD);
            }

            Ok(())
        })?;
        self.bus.delay_ns(T_BEXIT_NS);

        Ok(())
    }

    /// Shuts the sensor down if needed and gives back the bus.
    pub fn release(mut self) -> Result<(SPI, CS, D), Error> {
        if self.enabled {
            self.shutdown()?;
        }
        Ok(self.bus.release())
    }

    fn ensure_enabled(&self) -> Result<(), Error> {
        if self.enabled {
            Ok(())
        } else {
            Err(Error::NotEnabled)
        }
    }
}
