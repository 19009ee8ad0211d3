//! Wait states, in microseconds unless suffixed otherwise.

/// Address to data, for reads.
pub const T_SRAD: u32 = 100;
/// Read to read.
pub const T_SRR: u32 = 20;
/// Read to write.
pub const T_SRW: u32 = 20;
/// Write to any following command.
pub const T_SWW: u32 = 120;
/// Burst exit.
pub const T_BEXIT_NS: u32 = 500;
/// Per byte during SROM and pixel bursts.
pub const T_LOAD: u32 = 15;

/// Chip select to first clock.
pub const T_NCS_SCLK_NS: u32 = 120;
/// Last clock to chip select release.
pub const T_SCLK_NCS_NS: u32 = 20_000;

const DEFAULT_MAX_FPS: u32 = 1958;
/// Longest frame period at the default frame rate.
pub const MAX_FRAME_PERIOD: u32 = 1_000_000 / DEFAULT_MAX_FPS + 1;

pub const POWER_UP_MS: u32 = 50;
/// After an SROM download, before the SROM ID is valid.
pub const SROM_SETTLE: u32 = 160;
/// After requesting the SROM CRC.
pub const SROM_CRC_MS: u32 = 10;
