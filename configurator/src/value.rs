use std::{num::ParseIntError, str::FromStr};

use shared::{ButtonAction, Setting};
use thiserror::Error as ThisError;

/// Parses a setting name the way it is spelled in configuration files, e.g. `CPI_X` or `cpi_x`.
///
/// # Errors
/// Returns an error if no setting has that name.
pub fn parse_setting(name: &str) -> Result<Setting, ValueError> {
    Setting::from_str(&name.to_ascii_uppercase())
        .map_err(|_| ValueError::UnknownSetting(name.to_owned()))
}

/// Parses the value of a setting given on the command line.
///
/// Accepts decimal and `0x` prefixed hexadecimal numbers, plus action names such as `LEFT` or
/// `HIGH_RES` for the button settings.
///
/// # Errors
/// Returns an error if the value cannot be parsed or does not fit a setting word.
pub fn parse_value(setting: Setting, value: &str) -> Result<u16, ValueError> {
    let value = value.trim();

    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        return Ok(u16::from_str_radix(hex, 16)?);
    }

    if value.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return word(i64::from_str(value)?);
    }

    parse_action(setting, value)
}

/// Parses a button action name into the word stored for one of the button settings.
///
/// # Errors
/// Returns an error if `setting` is not a button or no action has that name.
pub fn parse_action(setting: Setting, action: &str) -> Result<u16, ValueError> {
    if !Setting::BUTTONS.contains(&setting) {
        return Err(ValueError::NotAButton(setting));
    }

    ButtonAction::from_str(&action.to_ascii_uppercase())
        .map(u16::from)
        .map_err(|_| ValueError::UnknownAction(action.to_owned()))
}

/// Converts an integer to a setting word. Negative values, used for the skew angles, are stored
/// as two's complement.
///
/// # Errors
/// Returns an error if the integer does not fit in 16 bits.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn word(value: i64) -> Result<u16, ValueError> {
    if let Ok(value) = u16::try_from(value) {
        return Ok(value);
    }

    i16::try_from(value)
        .map(|value| value as u16)
        .map_err(|_| ValueError::OutOfRange(value))
}

#[derive(Debug, ThisError)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ValueError {
    #[error("unknown setting `{0}`")]
    UnknownSetting(String),
    #[error("unknown button action `{0}`")]
    UnknownAction(String),
    #[error("{0:?} does not take a button action")]
    NotAButton(Setting),
    #[error("{0} does not fit in a 16-bit setting")]
    OutOfRange(i64),
    #[error(transparent)]
    Int(#[from] ParseIntError),
}
