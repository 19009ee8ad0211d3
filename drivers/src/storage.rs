//! Settings persistence and the configuration channel backend, on top of the EEPROM.

use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
use shared::{
    ConfigRequest, ConfigResponse, ERASED, FirmwareLocation, MAX_READ_LEN, PROFILE_LEN,
    REPORT_LEN, SETTING_COUNT, SETTINGS_BASE, Setting, Settings, Status,
};

use crate::eeprom::{Eeprom, Error};

/// Chunk size used when streaming data out of the EEPROM.
const STREAM_CHUNK: usize = 32;

#[derive(Debug)]
pub struct Storage<SPI, CS, D> {
    eeprom: Eeprom<SPI, CS, D>,
}

impl<SPI, CS, D> Storage<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(eeprom: Eeprom<SPI, CS, D>) -> Self {
        Self { eeprom }
    }

    /// Overrides `settings` with every stored, non-erased word.
    pub fn load_settings(&mut self, settings: &mut Settings) -> Result<(), Error> {
        let mut raw = [0; SETTING_COUNT * 2];
        self.eeprom.read(SETTINGS_BASE.into(), &mut raw)?;
        settings.apply_stored_words(&raw);
        Ok(())
    }

    /// Overrides the profile settings with the stored words of `profile`.
    ///
    /// Returns `false`, leaving `settings` untouched, if there is no such profile.
    pub fn load_profile(&mut self, profile: u8, settings: &mut Settings) -> Result<bool, Error> {
        let Some(base) = Setting::CpiX.profile_address(profile) else {
            return Ok(false);
        };

        let mut raw = [0; PROFILE_LEN * 2];
        self.eeprom.read(base.into(), &mut raw)?;
        settings.apply_stored_words(&raw);
        Ok(true)
    }

    /// Raw stored word, [`ERASED`] if never written.
    pub fn read_setting(&mut self, setting: Setting) -> Result<u16, Error> {
        let mut raw = [0; 2];
        self.eeprom.read(setting.address().into(), &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    pub fn store_setting(&mut self, setting: Setting, value: u16) -> Result<(), Error> {
        self.eeprom
            .write(setting.address().into(), &value.to_le_bytes())
    }

    /// Erases a stored setting so its default applies again.
    pub fn clear_setting(&mut self, setting: Setting) -> Result<(), Error> {
        self.store_setting(setting, ERASED)
    }

    /// Streams the sensor firmware image out of the EEPROM.
    pub fn firmware(&mut self, location: FirmwareLocation) -> FirmwareReader<'_, SPI, CS, D> {
        FirmwareReader {
            eeprom: &mut self.eeprom,
            next: location.offset.into(),
            end: u32::from(location.offset) + u32::from(location.len),
            buf: [0; STREAM_CHUNK],
            pos: 0,
            filled: 0,
            error: None,
        }
    }

    /// Services a configuration channel request.
    pub fn handle(&mut self, report: &[u8; REPORT_LEN]) -> ConfigResponse {
        let request = match ConfigRequest::parse(report) {
            Ok(request) => request,
            Err(e) => return ConfigResponse::new(e.status()),
        };

        self.service(request)
            .unwrap_or_else(|_| ConfigResponse::new(Status::StorageFailure))
    }

    fn service(&mut self, request: ConfigRequest<'_>) -> Result<ConfigResponse, Error> {
        let response = match request {
            ConfigRequest::Set { setting, value } => {
                self.store_setting(setting, value)?;
                ConfigResponse::new(Status::Ok)
            }
            ConfigRequest::Get { setting } => ConfigResponse::with_value(self.read_setting(setting)?),
            ConfigRequest::Clear { setting } => {
                self.clear_setting(setting)?;
                ConfigResponse::new(Status::Ok)
            }
            ConfigRequest::Init => {
                self.eeprom.clear_mem()?;
                ConfigResponse::new(Status::Ok)
            }
            ConfigRequest::LoadData { base, data } => {
                self.eeprom.write(base.into(), data)?;
                self.read_back(base, data.len())?
            }
            ConfigRequest::GetData { base, len } => self.read_back(base, len.into())?,
        };

        Ok(response)
    }

    fn read_back(&mut self, base: u16, len: usize) -> Result<ConfigResponse, Error> {
        let mut response = ConfigResponse::new(Status::Ok);
        let len = len.min(MAX_READ_LEN);
        self.eeprom
            .read(base.into(), &mut response.payload_mut()[..len])?;
        Ok(response)
    }

    pub fn release(self) -> Eeprom<SPI, CS, D> {
        self.eeprom
    }
}

/// Byte iterator over a region of the EEPROM.
///
/// Iteration stops at the first read error, which is kept for [`FirmwareReader::finish`].
#[derive(Debug)]
pub struct FirmwareReader<'a, SPI, CS, D> {
    eeprom: &'a mut Eeprom<SPI, CS, D>,
    next: u32,
    end: u32,
    buf: [u8; STREAM_CHUNK],
    pos: usize,
    filled: usize,
    error: Option<Error>,
}

impl<SPI, CS, D> FirmwareReader<'_, SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    /// Whether the whole region could be read.
    pub fn finish(self) -> Result<(), Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<SPI, CS, D> Iterator for FirmwareReader<'_, SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    type Item = u8;

    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> Option<u8> {
        if self.pos == self.filled {
            if self.error.is_some() || self.next >= self.end {
                return None;
            }

            let len = (self.end - self.next).min(STREAM_CHUNK as u32) as usize;

            if let Err(e) = self.eeprom.read(self.next, &mut self.buf[..len]) {
                self.error = Some(e);
                return None;
            }

            self.next += len as u32;
            self.pos = 0;
            self.filled = len;
        }

        let byte = self.buf[self.pos];
        self.pos += 1;
        Some(byte)
    }
}
