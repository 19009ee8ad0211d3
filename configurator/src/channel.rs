use shared::{
    ConfigRequest, ConfigResponse, MAX_LOAD_LEN, MAX_READ_LEN, REPORT_LEN, Setting, Status,
};
use thiserror::Error as ThisError;
use tracing::instrument;

use crate::AnyResult;

/// Moves raw configuration reports to and from the device.
pub trait Transport {
    /// # Errors
    /// Returns an error if the report could not be delivered.
    fn send(&mut self, report: &[u8; REPORT_LEN]) -> AnyResult<()>;

    /// # Errors
    /// Returns an error if no report arrived in time.
    fn receive(&mut self) -> AnyResult<[u8; REPORT_LEN]>;
}

/// What went wrong on the device side of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum ChannelError {
    #[error("device rejected the request: {0}")]
    Rejected(Status),
    #[error("data read back at {base:#06x} does not match what was written")]
    Verification { base: u16 },
    #[error("{len} bytes at {base:#06x} do not fit in the 16-bit address space")]
    OutOfRange { base: u16, len: usize },
}

/// Client side of the configuration channel.
#[derive(Debug)]
pub struct Channel<T> {
    transport: T,
}

impl<T> Channel<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    /// Returns an error if the transport fails or the device reports anything but success.
    pub fn request(&mut self, request: &ConfigRequest<'_>) -> AnyResult<ConfigResponse> {
        tracing::debug!("sending {:?}", request.command());
        self.transport.send(&request.encode())?;

        let response = ConfigResponse::from_report(self.transport.receive()?);

        match response.status() {
            Status::Ok => Ok(response),
            status => Err(ChannelError::Rejected(status).into()),
        }
    }

    /// # Errors
    /// See [`Channel::request`].
    #[instrument(skip(self), err(Debug))]
    pub fn set(&mut self, setting: Setting, value: u16) -> AnyResult<()> {
        self.request(&ConfigRequest::Set { setting, value })?;
        Ok(())
    }

    /// # Errors
    /// See [`Channel::request`].
    #[instrument(skip(self), err(Debug))]
    pub fn get(&mut self, setting: Setting) -> AnyResult<u16> {
        let response = self.request(&ConfigRequest::Get { setting })?;
        Ok(response.value())
    }

    /// # Errors
    /// See [`Channel::request`].
    #[instrument(skip(self), err(Debug))]
    pub fn clear(&mut self, setting: Setting) -> AnyResult<()> {
        self.request(&ConfigRequest::Clear { setting })?;
        Ok(())
    }

    /// Erases the whole EEPROM, sensor firmware included.
    ///
    /// # Errors
    /// See [`Channel::request`].
    #[instrument(skip(self), err(Debug))]
    pub fn init(&mut self) -> AnyResult<()> {
        self.request(&ConfigRequest::Init)?;
        Ok(())
    }

    /// Writes `data` at `base`, in as many requests as needed, checking what the device reads back
    /// after every write.
    ///
    /// # Errors
    /// Returns an error if a request fails or the data read back differs.
    #[instrument(skip(self, data), fields(len = data.len()), err(Debug))]
    pub fn write(&mut self, base: u16, data: &[u8]) -> AnyResult<()> {
        check_range(base, data.len())?;

        let mut address = base;

        for chunk in data.chunks(MAX_LOAD_LEN) {
            let response = self.request(&ConfigRequest::LoadData {
                base: address,
                data: chunk,
            })?;

            if &response.payload()[..chunk.len()] != chunk {
                return Err(ChannelError::Verification { base: address }.into());
            }

            tracing::debug!("wrote {} bytes at {address:#06x}", chunk.len());
            // Cannot overflow, the range got checked.
            address = address.wrapping_add(u16::try_from(chunk.len())?);
        }

        Ok(())
    }

    /// Reads `len` bytes starting at `base`.
    ///
    /// # Errors
    /// See [`Channel::request`].
    #[instrument(skip(self), err(Debug))]
    pub fn read(&mut self, base: u16, len: usize) -> AnyResult<Vec<u8>> {
        check_range(base, len)?;

        let mut data = Vec::with_capacity(len);
        let mut address = base;

        while data.len() < len {
            let chunk = (len - data.len()).min(MAX_READ_LEN);
            let response = self.request(&ConfigRequest::GetData {
                base: address,
                len: u8::try_from(chunk)?,
            })?;

            data.extend_from_slice(&response.payload()[..chunk]);
            address = address.wrapping_add(u16::try_from(chunk)?);
        }

        Ok(data)
    }
}

fn check_range(base: u16, len: usize) -> Result<(), ChannelError> {
    if usize::from(base) + len > usize::from(u16::MAX) + 1 {
        return Err(ChannelError::OutOfRange { base, len });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use anyhow::anyhow;
    use shared::ERASED;

    use super::*;

    /// In-memory stand-in for the device in programming mode.
    #[derive(Debug)]
    pub struct FakeDevice {
        pub memory: Vec<u8>,
        pub requests: Vec<[u8; REPORT_LEN]>,
        responses: VecDeque<[u8; REPORT_LEN]>,
        /// Corrupts the data read back after every write.
        pub corrupt_writes: bool,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self {
                memory: vec![0xFF; 0x1_0000],
                requests: Vec::new(),
                responses: VecDeque::new(),
                corrupt_writes: false,
            }
        }

        pub fn word(&self, address: u16) -> u16 {
            let address = usize::from(address);
            u16::from_le_bytes([self.memory[address], self.memory[address + 1]])
        }

        fn read_back(&self, base: u16, len: usize) -> ConfigResponse {
            let start = usize::from(base);
            ConfigResponse::with_data(&self.memory[start..start + len])
        }

        fn service(&mut self, report: &[u8; REPORT_LEN]) -> ConfigResponse {
            let request = match ConfigRequest::parse(report) {
                Ok(request) => request,
                Err(e) => return ConfigResponse::new(e.status()),
            };

            match request {
                ConfigRequest::Set { setting, value } => {
                    let address = usize::from(setting.address());
                    self.memory[address..address + 2].copy_from_slice(&value.to_le_bytes());
                    ConfigResponse::new(Status::Ok)
                }
                ConfigRequest::Get { setting } => {
                    ConfigResponse::with_value(self.word(setting.address()))
                }
                ConfigRequest::Clear { setting } => {
                    let address = usize::from(setting.address());
                    self.memory[address..address + 2].copy_from_slice(&ERASED.to_le_bytes());
                    ConfigResponse::new(Status::Ok)
                }
                ConfigRequest::Init => {
                    self.memory.fill(0xFF);
                    ConfigResponse::new(Status::Ok)
                }
                ConfigRequest::LoadData { base, data } => {
                    let start = usize::from(base);
                    self.memory[start..start + data.len()].copy_from_slice(data);
                    let mut response = self.read_back(base, data.len());
                    if self.corrupt_writes {
                        response.payload_mut()[0] ^= 1;
                    }
                    response
                }
                ConfigRequest::GetData { base, len } => self.read_back(base, len.into()),
            }
        }
    }

    impl Transport for &mut FakeDevice {
        fn send(&mut self, report: &[u8; REPORT_LEN]) -> AnyResult<()> {
            self.requests.push(*report);
            let response = self.service(report);
            self.responses.push_back(*response.as_bytes());
            Ok(())
        }

        fn receive(&mut self) -> AnyResult<[u8; REPORT_LEN]> {
            self.responses
                .pop_front()
                .ok_or_else(|| anyhow!("no response pending"))
        }
    }

    #[test]
    fn test_settings() {
        let mut device = FakeDevice::new();
        let mut channel = Channel::new(&mut device);

        channel.set(Setting::CpiX, 4320).unwrap();
        assert_eq!(channel.get(Setting::CpiX).unwrap(), 4320);

        channel.clear(Setting::CpiX).unwrap();
        assert_eq!(channel.get(Setting::CpiX).unwrap(), ERASED);

        assert_eq!(device.requests.len(), 4);
        assert_eq!(device.requests[0][..4], [1, 0, 0x10, 0xE0]);
    }

    #[test]
    fn test_write_is_chunked() {
        let mut device = FakeDevice::new();
        let data: Vec<u8> = (0..=149).collect();

        Channel::new(&mut device).write(0xEA60, &data).unwrap();

        assert_eq!(&device.memory[0xEA60..0xEA60 + 150], &data[..]);

        let chunks: Vec<_> = device
            .requests
            .iter()
            .map(|r| (u16::from_be_bytes([r[1], r[2]]), r[3]))
            .collect();
        assert_eq!(chunks, [(0xEA60, 60), (0xEA9C, 60), (0xEAD8, 30)]);
    }

    #[test]
    fn test_write_verification_failure() {
        let mut device = FakeDevice::new();
        device.corrupt_writes = true;

        let err = Channel::new(&mut device).write(0x200, &[1, 2, 3]).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ChannelError>(),
            Some(&ChannelError::Verification { base: 0x200 })
        );
    }

    #[test]
    fn test_read_is_chunked() {
        let mut device = FakeDevice::new();
        device.memory[0x100..0x100 + 100].fill(0xAB);

        let data = Channel::new(&mut device).read(0x100, 100).unwrap();

        assert_eq!(data, vec![0xAB; 100]);
        assert_eq!(device.requests.len(), 2);
        assert_eq!(device.requests[1][1..4], [0x01, 0x3F, 37]);
    }

    #[test]
    fn test_out_of_range() {
        let mut device = FakeDevice::new();

        let err = Channel::new(&mut device).read(0xFFF0, 17).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ChannelError>(),
            Some(&ChannelError::OutOfRange {
                base: 0xFFF0,
                len: 17
            })
        );
        assert!(device.requests.is_empty());
    }

    #[test]
    fn test_rejected_request() {
        let mut device = FakeDevice::new();
        let mut report = [0; REPORT_LEN];
        report[0] = 9;

        (&mut device).send(&report).unwrap();
        let response = ConfigResponse::from_report((&mut device).receive().unwrap());
        assert_eq!(response.status(), Status::UnknownCommand);

        let err = Channel::new(&mut device)
            .request(&ConfigRequest::GetData { base: 0, len: 64 })
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChannelError>(),
            Some(&ChannelError::Rejected(Status::Malformed))
        );
    }
}
