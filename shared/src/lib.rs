#![no_std]

mod button;
mod config;
mod debounce;
mod pointer;
mod setting;

pub use button::{ButtonAction, ButtonActionConvError, MouseButtons};
pub use config::{
    CommandConvError, ConfigCommand, ConfigRequest, ConfigResponse, MAX_LOAD_LEN, MAX_READ_LEN,
    REPORT_LEN, RequestError, Status,
};
pub use debounce::{Debouncer, Edge};
pub use pointer::{Controls, CpiTarget, Motion, MotionShaper, PendingReport, ReportData};
pub use setting::{
    ERASED, FirmwareLocation, PROFILE_BASE, PROFILE_COUNT, PROFILE_LEN, SETTING_COUNT,
    SETTINGS_BASE, Setting, SettingConvError, Settings,
};

/// Identifiers used by the configuration channel. The pointer function enumerates with the
/// VID/PID/release stored in the [`Settings`] instead.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x4C53;
pub const USB_MANUFACTURER: &str = "Trackstone";
pub const USB_PRODUCT: &str = "Trackstone Configuration";
pub const USB_POLL_MS: u8 = 10;
