mod channel;
mod config;
mod device;
mod exactly_one;
mod firmware;
mod value;

pub use anyhow::Result as AnyResult;
pub use channel::{Channel, ChannelError, Transport};
pub use config::{Config, ConfigError};
pub use device::Device;
pub use exactly_one::{ExactlyOneError, ExactlyOneIter};
pub use firmware::{FirmwareError, FirmwareImage};
pub use value::{ValueError, parse_action, parse_setting, parse_value, word};
