use thiserror::Error as ThisError;

use crate::setting::{Setting, SettingConvError};

/// Size of every report exchanged over the configuration channel, in both directions.
pub const REPORT_LEN: usize = 64;
/// Maximum payload of a single `LOAD_DATA` request.
pub const MAX_LOAD_LEN: usize = REPORT_LEN - 4;
/// Maximum payload of a single `GET_DATA` response.
pub const MAX_READ_LEN: usize = REPORT_LEN - 1;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum ConfigCommand {
    Set = 1,
    Get,
    LoadData,
    GetData,
    Clear,
    Init,
}

impl From<ConfigCommand> for u8 {
    fn from(value: ConfigCommand) -> Self {
        value as Self
    }
}

impl TryFrom<u8> for ConfigCommand {
    type Error = CommandConvError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ConfigCommand::Set),
            2 => Ok(ConfigCommand::Get),
            3 => Ok(ConfigCommand::LoadData),
            4 => Ok(ConfigCommand::GetData),
            5 => Ok(ConfigCommand::Clear),
            6 => Ok(ConfigCommand::Init),
            _ => Err(CommandConvError(value)),
        }
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[cfg_attr(test, derive(PartialEq))]
#[error("unknown configuration command {0:#04x}")]
pub struct CommandConvError(pub u8);

/// Request received over the configuration channel.
///
/// Multi-byte fields travel most significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigRequest<'a> {
    Set { setting: Setting, value: u16 },
    Get { setting: Setting },
    LoadData { base: u16, data: &'a [u8] },
    GetData { base: u16, len: u8 },
    Clear { setting: Setting },
    /// Erases the whole EEPROM.
    Init,
}

impl<'a> ConfigRequest<'a> {
    pub fn parse(report: &'a [u8; REPORT_LEN]) -> Result<Self, RequestError> {
        let command = ConfigCommand::try_from(report[0])?;
        let base = u16::from_be_bytes([report[1], report[2]]);
        let len = report[3];

        let request = match command {
            ConfigCommand::Set => ConfigRequest::Set {
                setting: report[1].try_into()?,
                value: u16::from_be_bytes([report[2], report[3]]),
            },
            ConfigCommand::Get => ConfigRequest::Get {
                setting: report[1].try_into()?,
            },
            ConfigCommand::Clear => ConfigRequest::Clear {
                setting: report[1].try_into()?,
            },
            ConfigCommand::Init => ConfigRequest::Init,
            ConfigCommand::LoadData if usize::from(len) <= MAX_LOAD_LEN => {
                ConfigRequest::LoadData {
                    base,
                    data: &report[4..4 + usize::from(len)],
                }
            }
            ConfigCommand::GetData if usize::from(len) <= MAX_READ_LEN => {
                ConfigRequest::GetData { base, len }
            }
            ConfigCommand::LoadData | ConfigCommand::GetData => {
                return Err(RequestError::Length(len));
            }
        };

        Ok(request)
    }

    #[must_use]
    pub fn command(&self) -> ConfigCommand {
        match self {
            ConfigRequest::Set { .. } => ConfigCommand::Set,
            ConfigRequest::Get { .. } => ConfigCommand::Get,
            ConfigRequest::LoadData { .. } => ConfigCommand::LoadData,
            ConfigRequest::GetData { .. } => ConfigCommand::GetData,
            ConfigRequest::Clear { .. } => ConfigCommand::Clear,
            ConfigRequest::Init => ConfigCommand::Init,
        }
    }

    /// Serializes the request into a report.
    ///
    /// `LOAD_DATA` payloads longer than [`MAX_LOAD_LEN`] are truncated.
    #[must_use]
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut report = [0; REPORT_LEN];
        report[0] = self.command().into();

        match *self {
            ConfigRequest::Set { setting, value } => {
                report[1] = setting.into();
                report[2..4].copy_from_slice(&value.to_be_bytes());
            }
            ConfigRequest::Get { setting } | ConfigRequest::Clear { setting } => {
                report[1] = setting.into();
            }
            ConfigRequest::LoadData { base, data } => {
                let data = &data[..data.len().min(MAX_LOAD_LEN)];
                report[1..3].copy_from_slice(&base.to_be_bytes());
                #[allow(clippy::cast_possible_truncation)]
                let len = data.len() as u8;
                report[3] = len;
                report[4..4 + data.len()].copy_from_slice(data);
            }
            ConfigRequest::GetData { base, len } => {
                report[1..3].copy_from_slice(&base.to_be_bytes());
                report[3] = len;
            }
            ConfigRequest::Init => (),
        }

        report
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[cfg_attr(test, derive(PartialEq))]
pub enum RequestError {
    #[error(transparent)]
    UnknownCommand(#[from] CommandConvError),
    #[error(transparent)]
    UnknownSetting(#[from] SettingConvError),
    #[error("invalid data length {0}")]
    Length(u8),
}

impl RequestError {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            RequestError::UnknownCommand(_) => Status::UnknownCommand,
            RequestError::UnknownSetting(_) | RequestError::Length(_) => Status::Malformed,
        }
    }
}

/// First byte of every response.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum Status {
    #[error("ok")]
    Ok,
    #[error("unknown command")]
    UnknownCommand,
    #[error("malformed request")]
    Malformed,
    #[error("storage failure")]
    StorageFailure,
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        value as Self
    }
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            0 => Status::Ok,
            1 => Status::UnknownCommand,
            2 => Status::Malformed,
            _ => Status::StorageFailure,
        }
    }
}

/// Response sent back for every request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigResponse {
    report: [u8; REPORT_LEN],
}

impl ConfigResponse {
    #[must_use]
    pub fn new(status: Status) -> Self {
        let mut report = [0; REPORT_LEN];
        report[0] = status.into();
        Self { report }
    }

    /// Successful response carrying a 16-bit value, least significant byte first.
    #[must_use]
    pub fn with_value(value: u16) -> Self {
        let mut response = Self::new(Status::Ok);
        response.payload_mut()[..2].copy_from_slice(&value.to_le_bytes());
        response
    }

    /// Successful response carrying raw bytes. Anything past [`MAX_READ_LEN`] is dropped.
    #[must_use]
    pub fn with_data(data: &[u8]) -> Self {
        let mut response = Self::new(Status::Ok);
        let len = data.len().min(MAX_READ_LEN);
        response.payload_mut()[..len].copy_from_slice(&data[..len]);
        response
    }

    #[must_use]
    pub fn from_report(report: [u8; REPORT_LEN]) -> Self {
        Self { report }
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> Status {
        self.report[0].into()
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.report[1..]
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.report[1..]
    }

    #[must_use]
    pub fn value(&self) -> u16 {
        u16::from_le_bytes([self.report[1], self.report[2]])
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_command_conversion() {
        for command in ConfigCommand::iter() {
            assert_eq!(u8::from(command).try_into(), Ok(command));
        }

        assert_eq!(ConfigCommand::try_from(0), Err(CommandConvError(0)));
        assert_eq!(ConfigCommand::try_from(7), Err(CommandConvError(7)));
    }

    #[test]
    fn test_parse_set() {
        let mut report = [0; REPORT_LEN];
        report[..4].copy_from_slice(&[1, 12, 0x01, 0x68]);

        assert_eq!(
            ConfigRequest::parse(&report),
            Ok(ConfigRequest::Set {
                setting: Setting::CpiHrX,
                value: 360,
            })
        );
        assert_eq!(ConfigRequest::parse(&report).map(|r| r.encode()), Ok(report));
    }

    #[test]
    fn test_parse_load_data() {
        let mut report = [0; REPORT_LEN];
        report[..7].copy_from_slice(&[3, 0xEA, 0x60, 3, 0xAA, 0xBB, 0xCC]);

        assert_eq!(
            ConfigRequest::parse(&report),
            Ok(ConfigRequest::LoadData {
                base: 0xEA60,
                data: &[0xAA, 0xBB, 0xCC],
            })
        );

        report[3] = 61;
        assert_eq!(
            ConfigRequest::parse(&report),
            Err(RequestError::Length(61))
        );
    }

    #[test]
    fn test_parse_get_data() {
        let mut report = [0; REPORT_LEN];
        report[..4].copy_from_slice(&[4, 0x01, 0x00, 63]);

        assert_eq!(
            ConfigRequest::parse(&report),
            Ok(ConfigRequest::GetData {
                base: 0x100,
                len: 63,
            })
        );

        report[3] = 64;
        assert_eq!(
            ConfigRequest::parse(&report).map_err(|e| e.status()),
            Err(Status::Malformed)
        );
    }

    #[test]
    fn test_parse_errors() {
        let mut report = [0; REPORT_LEN];
        report[0] = 9;
        let err = ConfigRequest::parse(&report).unwrap_err();
        assert_eq!(err, RequestError::UnknownCommand(CommandConvError(9)));
        assert_eq!(err.status(), Status::UnknownCommand);

        report[..2].copy_from_slice(&[2, 31]);
        let err = ConfigRequest::parse(&report).unwrap_err();
        assert_eq!(err, RequestError::UnknownSetting(SettingConvError(31)));
        assert_eq!(err.status(), Status::Malformed);
    }

    #[test]
    fn test_encode_truncates_load_data() {
        let data = [0x55; 80];
        let report = ConfigRequest::LoadData { base: 0, data: &data }.encode();

        assert_eq!(usize::from(report[3]), MAX_LOAD_LEN);
        assert!(report[4..].iter().all(|b| *b == 0x55));
    }

    #[test]
    fn test_responses() {
        let response = ConfigResponse::with_value(0x1620);
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(&response.as_bytes()[..3], &[0, 0x20, 0x16]);
        assert_eq!(response.value(), 0x1620);

        let response = ConfigResponse::with_data(&[1, 2, 3]);
        assert_eq!(&response.payload()[..4], &[1, 2, 3, 0]);

        let response = ConfigResponse::new(Status::StorageFailure);
        assert_eq!(
            ConfigResponse::from_report(*response.as_bytes()).status(),
            Status::StorageFailure
        );
    }
}
