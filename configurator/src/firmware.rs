use std::{fs, path::Path};

use anyhow::Context as _;
use shared::{ERASED, Setting};
use thiserror::Error as ThisError;
use tracing::instrument;

use crate::{
    AnyResult,
    channel::{Channel, Transport},
};

/// An ADNS-9500 SROM image along with the values the sensor must report once it runs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareImage {
    pub bytes: Vec<u8>,
    pub crc: u16,
    pub id: Option<u8>,
}

impl FirmwareImage {
    /// Reads an image from disk. See [`FirmwareImage::decode`] for the accepted formats.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds no usable image.
    pub fn from_file(path: &Path, crc: u16, id: Option<u8>) -> AnyResult<Self> {
        let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let bytes = Self::decode(&raw).with_context(|| format!("decoding {}", path.display()))?;

        Ok(Self { bytes, crc, id })
    }

    /// Decodes an image that is either a text file with one hexadecimal byte per line, the way
    /// Avago distributes them, or the raw binary.
    ///
    /// # Errors
    /// Returns an error if the image is empty or too big to be addressed.
    pub fn decode(raw: &[u8]) -> Result<Vec<u8>, FirmwareError> {
        let bytes = std::str::from_utf8(raw)
            .ok()
            .and_then(parse_hex_lines)
            .unwrap_or_else(|| raw.to_vec());

        if bytes.is_empty() {
            return Err(FirmwareError::Empty);
        }

        if bytes.len() >= usize::from(ERASED) {
            return Err(FirmwareError::TooLarge(bytes.len()));
        }

        Ok(bytes)
    }

    /// Writes the image to where the device expects it, verifying every chunk, and only then
    /// stores its length and checksum so the device never loads a partial image.
    ///
    /// # Errors
    /// Returns an error if a request fails or the image does not fit.
    #[instrument(skip_all, fields(len = self.bytes.len(), crc = self.crc), err(Debug))]
    pub fn upload<T>(&self, channel: &mut Channel<T>) -> AnyResult<()>
    where
        T: Transport,
    {
        let offset = match channel.get(Setting::AdnsFwOffset)? {
            ERASED => Setting::AdnsFwOffset.default_value(),
            offset => offset,
        };

        let len = u16::try_from(self.bytes.len())?;

        // Invalidate the current image first, a failed upload must not leave a stale length
        // pointing at a half written one.
        channel.clear(Setting::AdnsFwLen)?;
        channel.write(offset, &self.bytes)?;
        tracing::info!("{len} bytes written at {offset:#06x}");

        channel.set(Setting::AdnsCrc, self.crc)?;
        match self.id {
            Some(id) => channel.set(Setting::AdnsId, id.into())?,
            None => channel.clear(Setting::AdnsId)?,
        }
        channel.set(Setting::AdnsFwLen, len)?;

        Ok(())
    }
}

/// Parses one hexadecimal byte per line, with or without a `0x` prefix. Blank lines are skipped.
///
/// Returns `None` as soon as a line is not a byte, meaning the file is not in that format.
fn parse_hex_lines(text: &str) -> Option<Vec<u8>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let digits = line
                .strip_prefix("0x")
                .or_else(|| line.strip_prefix("0X"))
                .unwrap_or(line);
            u8::from_str_radix(digits, 16).ok()
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum FirmwareError {
    #[error("firmware image is empty")]
    Empty,
    #[error("firmware image of {0} bytes is too large")]
    TooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, tests::FakeDevice};

    #[test]
    fn test_decode_hex_lines() {
        let raw = b"0x03\n0xa4\r\n\n6e\n0XFF\n";
        assert_eq!(FirmwareImage::decode(raw), Ok(vec![0x03, 0xA4, 0x6E, 0xFF]));
    }

    #[test]
    fn test_decode_binary() {
        let raw = [0x03, 0xA4, 0x6E, 0x00, 0xFF];
        assert_eq!(FirmwareImage::decode(&raw), Ok(raw.to_vec()));

        // Valid UTF-8, but not one byte per line.
        let raw = b"hello\nworld";
        assert_eq!(FirmwareImage::decode(raw), Ok(raw.to_vec()));
    }

    #[test]
    fn test_decode_invalid() {
        assert_eq!(FirmwareImage::decode(b""), Err(FirmwareError::Empty));
        assert_eq!(FirmwareImage::decode(b"\n\n"), Err(FirmwareError::Empty));
        assert_eq!(
            FirmwareImage::decode(&vec![0; 0xFFFF]),
            Err(FirmwareError::TooLarge(0xFFFF))
        );
    }

    #[test]
    fn test_upload() {
        let image = FirmwareImage {
            bytes: (0..=255).cycle().take(3070).collect(),
            crc: 0xBEEF,
            id: Some(0xA4),
        };
        let mut device = FakeDevice::new();

        image.upload(&mut Channel::new(&mut device)).unwrap();

        let offset = usize::from(Setting::AdnsFwOffset.default_value());
        assert_eq!(&device.memory[offset..offset + 3070], &image.bytes[..]);
        assert_eq!(device.word(Setting::AdnsFwLen.address()), 3070);
        assert_eq!(device.word(Setting::AdnsCrc.address()), 0xBEEF);
        assert_eq!(device.word(Setting::AdnsId.address()), 0xA4);
    }

    #[test]
    fn test_upload_honors_stored_offset() {
        let image = FirmwareImage {
            bytes: vec![0x5A; 100],
            crc: 0x1234,
            id: None,
        };
        let mut device = FakeDevice::new();
        let address = usize::from(Setting::AdnsFwOffset.address());
        device.memory[address..address + 2].copy_from_slice(&0xF000u16.to_le_bytes());
        device.memory[usize::from(Setting::AdnsId.address())] = 0x56;

        image.upload(&mut Channel::new(&mut device)).unwrap();

        assert_eq!(&device.memory[0xF000..0xF000 + 100], &[0x5A; 100]);
        assert_eq!(device.word(Setting::AdnsId.address()), ERASED);
    }

    #[test]
    fn test_failed_upload_leaves_no_length() {
        let image = FirmwareImage {
            bytes: vec![1; 10],
            crc: 0x1234,
            id: None,
        };
        let mut device = FakeDevice::new();
        let address = usize::from(Setting::AdnsFwLen.address());
        device.memory[address..address + 2].copy_from_slice(&10u16.to_le_bytes());
        device.corrupt_writes = true;

        let err = image.upload(&mut Channel::new(&mut device)).unwrap_err();

        assert!(err.downcast_ref::<ChannelError>().is_some());
        assert_eq!(device.word(Setting::AdnsFwLen.address()), ERASED);
    }
}
