/// Set on the address byte of a register write.
pub const WRITE_BIT: u8 = 0x80;

/// ADNS-9500 registers.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum Register {
    ProductId = 0x00,
    RevisionId = 0x01,
    Motion = 0x02,
    DeltaXL = 0x03,
    DeltaXH = 0x04,
    DeltaYL = 0x05,
    DeltaYH = 0x06,
    Squal = 0x07,
    PixelSum = 0x08,
    MaximumPixel = 0x09,
    MinimumPixel = 0x0A,
    ShutterLower = 0x0B,
    ShutterUpper = 0x0C,
    FramePeriodLower = 0x0D,
    FramePeriodUpper = 0x0E,
    /// Resolution, or X resolution when the axes are configured independently.
    ConfigurationI = 0x0F,
    ConfigurationII = 0x10,
    FrameCapture = 0x12,
    SromEnable = 0x13,
    LaserCtrl0 = 0x20,
    Observation = 0x24,
    DataOutLower = 0x25,
    DataOutUpper = 0x26,
    SromId = 0x2A,
    /// Y resolution when the axes are configured independently.
    ConfigurationV = 0x2F,
    ConfigurationIV = 0x39,
    PowerUpReset = 0x3A,
    MotionBurst = 0x50,
    SromLoadBurst = 0x62,
    PixelBurst = 0x64,
}

impl Register {
    #[inline]
    #[must_use]
    pub fn read_address(self) -> u8 {
        self as u8 & !WRITE_BIT
    }

    #[inline]
    #[must_use]
    pub fn write_address(self) -> u8 {
        self as u8 | WRITE_BIT
    }
}

// Register bits and codes.
pub const POWER_UP_RESET: u8 = 0x5A;
pub const OBSERVATION_TEST: u8 = 0x3F;
pub const MOTION_MOT: u8 = 0x80;
pub const MOTION_FAULT: u8 = 0x40;
pub const MOTION_PIXEL_FIRST: u8 = 0x01;
pub const CONFIGURATION_II_RPT_MOD: u8 = 1 << 2;
pub const CONFIGURATION_IV_SROM_SIZE: u8 = 1 << 1;
pub const LASER_CTRL0_FORCE_DISABLED: u8 = 1 << 0;
pub const SROM_INITIATE: u8 = 0x1D;
pub const SROM_BURST_LOAD: u8 = 0x18;
pub const SROM_CRC: u8 = 0x15;
pub const FRAME_CAPTURE_UNLOCK: [u8; 2] = [0x93, 0xC5];

pub const PRODUCT_ID: u8 = 0x33;
pub const REVISION_ID: u8 = 0x03;
