use strum::{EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use thiserror::Error as ThisError;

use crate::button::ButtonAction;

/// EEPROM address of the first settings word.
pub const SETTINGS_BASE: u16 = 0x0000;
/// EEPROM address of the first profile block.
pub const PROFILE_BASE: u16 = 0x0100;
/// Number of selectable profiles.
pub const PROFILE_COUNT: u8 = 5;
/// Number of leading settings a profile overrides.
pub const PROFILE_LEN: usize = Setting::CpiHrY as usize + 1;
/// Number of words in the settings block.
pub const SETTING_COUNT: usize = Setting::COUNT;
/// Value of an erased EEPROM word. A stored setting with this value falls back to its default.
pub const ERASED: u16 = 0xFFFF;

/// Persisted settings.
///
/// The discriminant is the index of the 16-bit word holding the setting in EEPROM, so the
/// variant order is part of the storage layout and must not change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumCount, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Setting {
    CpiX,
    CpiY,
    CpiXMultiplier,
    CpiYMultiplier,
    CoordXSkew,
    CoordYSkew,
    ScrollSkip,
    // Not used by the firmware, kept for layout compatibility.
    CpiMax,
    CpiMin,
    CpiStep,
    CpiZ,
    CpiH,
    CpiHrX,
    CpiHrY,
    BtnA,
    BtnB,
    BtnC,
    BtnD,
    BtnE,
    BtnF,
    BtnG,
    LedAction,
    Vid,
    Pid,
    Release,
    ProfileDefault,
    ProfileCurrent,
    AdnsCrc,
    AdnsId,
    AdnsFwLen,
    AdnsFwOffset,
}

impl Setting {
    /// Physical buttons, in wiring order.
    pub const BUTTONS: [Setting; 7] = [
        Setting::BtnA,
        Setting::BtnB,
        Setting::BtnC,
        Setting::BtnD,
        Setting::BtnE,
        Setting::BtnF,
        Setting::BtnG,
    ];

    #[must_use]
    pub const fn default_value(self) -> u16 {
        match self {
            Setting::CpiX | Setting::CpiY | Setting::CpiMax => 5670,
            Setting::CpiXMultiplier
            | Setting::CpiYMultiplier
            | Setting::CoordXSkew
            | Setting::CoordYSkew
            | Setting::CpiMin
            | Setting::CpiZ
            | Setting::CpiH
            | Setting::LedAction
            | Setting::Pid
            | Setting::Release
            | Setting::ProfileDefault
            | Setting::ProfileCurrent => 0,
            Setting::ScrollSkip => 4,
            Setting::CpiStep => 90,
            Setting::CpiHrX | Setting::CpiHrY => 360,
            Setting::BtnA => ButtonAction::Scroll as u16,
            Setting::BtnB => ButtonAction::Middle as u16,
            Setting::BtnC => ButtonAction::Right as u16,
            Setting::BtnD => ButtonAction::Left as u16,
            Setting::BtnE => ButtonAction::HighRes as u16,
            Setting::BtnF => ButtonAction::Forward as u16,
            Setting::BtnG => ButtonAction::Back as u16,
            Setting::Vid => 0x192F,
            Setting::AdnsCrc | Setting::AdnsId | Setting::AdnsFwLen => ERASED,
            Setting::AdnsFwOffset => 0xEA60,
        }
    }

    /// EEPROM address of the setting's word.
    #[inline]
    #[must_use]
    pub const fn address(self) -> u16 {
        SETTINGS_BASE + 2 * self as u16
    }

    /// EEPROM address of the setting's word inside a profile block, if the setting is part of
    /// profiles and the profile exists.
    #[must_use]
    pub fn profile_address(self, profile: u8) -> Option<u16> {
        let index = self as u16;
        let in_profile = usize::from(self as u8) < PROFILE_LEN && profile < PROFILE_COUNT;
        #[allow(clippy::cast_possible_truncation)]
        let block = u16::from(profile) * (PROFILE_LEN as u16) * 2;
        in_profile.then(|| PROFILE_BASE + block + 2 * index)
    }

    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl From<Setting> for u8 {
    fn from(value: Setting) -> Self {
        value as Self
    }
}

impl TryFrom<u8> for Setting {
    type Error = SettingConvError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Setting::iter()
            .nth(usize::from(value))
            .ok_or(SettingConvError(value))
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[cfg_attr(test, derive(PartialEq))]
#[error("no setting with index {0}")]
pub struct SettingConvError(pub u8);

/// Where the sensor SROM image lives in EEPROM and what it is expected to look like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirmwareLocation {
    pub offset: u16,
    pub len: u16,
    pub crc: u16,
    /// Expected SROM ID reported by the sensor after the upload, if configured.
    pub id: Option<u8>,
}

/// The live settings record.
///
/// Starts out with compiled in defaults and gets overridden word by word with whatever is stored
/// in EEPROM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    values: [u16; Setting::COUNT],
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        let mut values = [0; Setting::COUNT];

        for setting in Setting::iter() {
            values[setting as usize] = setting.default_value();
        }

        Self { values }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, setting: Setting) -> u16 {
        self.values[setting as usize]
    }

    #[inline]
    pub fn set(&mut self, setting: Setting, value: u16) {
        self.values[setting as usize] = value;
    }

    /// Applies a word read back from storage. Erased words leave the current value in place.
    ///
    /// Returns whether the value was applied.
    #[inline]
    pub fn apply_stored(&mut self, setting: Setting, stored: u16) -> bool {
        let applied = stored != ERASED;
        if applied {
            self.set(setting, stored);
        }
        applied
    }

    /// Applies consecutive little endian words read back from storage, starting with the first
    /// setting.
    pub fn apply_stored_words(&mut self, raw: &[u8]) {
        for (setting, word) in Setting::iter().zip(raw.chunks_exact(2)) {
            self.apply_stored(setting, u16::from_le_bytes([word[0], word[1]]));
        }
    }

    /// Regular X/Y resolution.
    #[must_use]
    pub fn cpi(&self) -> (u16, u16) {
        (self.get(Setting::CpiX), self.get(Setting::CpiY))
    }

    /// Resolution while the high resolution button is held.
    #[must_use]
    pub fn high_res_cpi(&self) -> (u16, u16) {
        (self.get(Setting::CpiHrX), self.get(Setting::CpiHrY))
    }

    /// Resolution while scrolling.
    #[must_use]
    pub fn scroll_cpi(&self) -> (u16, u16) {
        (self.get(Setting::CpiZ), self.get(Setting::CpiH))
    }

    /// Action bound to the physical button at `index`, in wiring order.
    #[must_use]
    pub fn button_action(&self, index: usize) -> Option<ButtonAction> {
        let setting = Setting::BUTTONS.get(index)?;
        ButtonAction::try_from(self.get(*setting)).ok()
    }

    /// The sensor firmware location, if an image was ever uploaded.
    #[must_use]
    pub fn firmware(&self) -> Option<FirmwareLocation> {
        let len = self.get(Setting::AdnsFwLen);
        let crc = self.get(Setting::AdnsCrc);

        if len == ERASED || len == 0 || crc == ERASED {
            return None;
        }

        let id = u8::try_from(self.get(Setting::AdnsId)).ok();

        Some(FirmwareLocation {
            offset: self.get(Setting::AdnsFwOffset),
            len,
            crc,
            id,
        })
    }

    /// USB vendor ID, product ID and device release of the pointer function.
    #[must_use]
    pub fn usb_ids(&self) -> (u16, u16, u16) {
        (
            self.get(Setting::Vid),
            self.get(Setting::Pid),
            self.get(Setting::Release),
        )
    }

    /// Currently selected profile.
    #[must_use]
    pub fn profile(&self) -> u8 {
        u8::try_from(self.get(Setting::ProfileCurrent))
            .ok()
            .filter(|p| *p < PROFILE_COUNT)
            .unwrap_or_default()
    }
}
