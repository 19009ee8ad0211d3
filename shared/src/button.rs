use strum::{EnumString, IntoStaticStr};
use thiserror::Error as ThisError;

/// What a physical button does when pressed.
///
/// The discriminants are what gets stored in the `BTN_*` settings.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, IntoStaticStr)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonAction {
    Left,
    Middle,
    Right,
    Forward,
    Back,
    /// Held: motion scrolls instead of moving the pointer.
    #[strum(serialize = "Z")]
    Scroll,
    /// Held: switch to the high resolution CPI.
    HighRes,
}

impl ButtonAction {
    /// The HID mouse button this action presses, if it is a plain mouse button.
    #[must_use]
    pub fn mouse_button(self) -> Option<MouseButtons> {
        match self {
            ButtonAction::Left => Some(MouseButtons::LEFT),
            ButtonAction::Right => Some(MouseButtons::RIGHT),
            ButtonAction::Middle => Some(MouseButtons::MIDDLE),
            ButtonAction::Back => Some(MouseButtons::BACK),
            ButtonAction::Forward => Some(MouseButtons::FORWARD),
            ButtonAction::Scroll | ButtonAction::HighRes => None,
        }
    }
}

impl From<ButtonAction> for u16 {
    fn from(value: ButtonAction) -> Self {
        value as Self
    }
}

impl TryFrom<u16> for ButtonAction {
    type Error = ButtonActionConvError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ButtonAction::Left),
            1 => Ok(ButtonAction::Middle),
            2 => Ok(ButtonAction::Right),
            3 => Ok(ButtonAction::Forward),
            4 => Ok(ButtonAction::Back),
            5 => Ok(ButtonAction::Scroll),
            6 => Ok(ButtonAction::HighRes),
            _ => Err(ButtonActionConvError),
        }
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[cfg_attr(test, derive(PartialEq))]
#[error("integer to button action conversion failed")]
pub struct ButtonActionConvError;

/// HID mouse button bit mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MouseButtons(u8);

impl MouseButtons {
    pub const LEFT: Self = Self(0x01);
    pub const RIGHT: Self = Self(0x02);
    pub const MIDDLE: Self = Self(0x04);
    pub const BACK: Self = Self(0x08);
    pub const FORWARD: Self = Self(0x10);

    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn press(&mut self, button: Self) {
        self.0 |= button.0;
    }

    #[inline]
    pub fn release(&mut self, button: Self) {
        self.0 &= !button.0;
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}
