use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context as _;
use serde::Deserialize;
use shared::{PROFILE_COUNT, PROFILE_LEN, Setting, Settings};
use strum::IntoEnumIterator;
use thiserror::Error as ThisError;
use tracing::instrument;

use crate::{
    AnyResult,
    channel::{Channel, ChannelError, Transport},
    value::{self, ValueError},
};

/// Configuration file as written by the user.
///
/// ```toml
/// [settings]
/// CPI_X = 4320
/// BTN_D = "Z"
///
/// [[profiles]]
/// CPI_X = 1800
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    settings: BTreeMap<String, RawValue>,
    #[serde(default)]
    profiles: Vec<BTreeMap<String, RawValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(i64),
    Action(String),
}

/// Validated configuration, ready to be written to the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Settings to store, in setting order.
    pub settings: Vec<(Setting, u16)>,
    /// Full profile blocks, profile A first.
    ///
    /// Every profile starts out with the configured settings, or the defaults where nothing is
    /// configured, and then gets its own overrides applied.
    pub profiles: Vec<[u16; PROFILE_LEN]>,
}

impl Config {
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> AnyResult<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// # Errors
    /// Returns an error if the text is not a valid configuration.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;

        if raw.profiles.len() > PROFILE_COUNT.into() {
            return Err(ConfigError::TooManyProfiles(raw.profiles.len()));
        }

        let settings = resolve("settings", &raw.settings)?;

        let mut base = Settings::new();
        for (setting, value) in &settings {
            base.set(*setting, *value);
        }

        let profiles = raw
            .profiles
            .iter()
            .enumerate()
            .map(|(index, overrides)| {
                let section = format!("profiles[{index}]");
                let mut profile = base;

                for (setting, value) in resolve(&section, overrides)? {
                    if setting.profile_address(0).is_none() {
                        return Err(ConfigError::NotInProfile(setting));
                    }
                    profile.set(setting, value);
                }

                let mut block = [0; PROFILE_LEN];
                for (word, setting) in block.iter_mut().zip(Setting::iter()) {
                    *word = profile.get(setting);
                }

                Ok(block)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { settings, profiles })
    }

    /// Stores the settings one by one, reading each of them back, then writes the profile
    /// blocks.
    ///
    /// # Errors
    /// Returns an error if the device rejects a request or something reads back differently.
    #[instrument(skip_all, err(Debug))]
    pub fn load<T>(&self, channel: &mut Channel<T>) -> AnyResult<()>
    where
        T: Transport,
    {
        for (setting, value) in &self.settings {
            channel.set(*setting, *value)?;

            if channel.get(*setting)? != *value {
                return Err(ChannelError::Verification {
                    base: setting.address(),
                }
                .into());
            }

            tracing::info!("{} = {value}", setting.name());
        }

        for (profile, block) in (0..PROFILE_COUNT).zip(&self.profiles) {
            let base = Setting::CpiX
                .profile_address(profile)
                .context("profile outside of the profile area")?;
            let bytes: Vec<u8> = block.iter().flat_map(|word| word.to_le_bytes()).collect();

            channel.write(base, &bytes)?;
            tracing::info!("profile {} written", char::from(b'A' + profile));
        }

        Ok(())
    }
}

fn resolve(
    section: &str,
    entries: &BTreeMap<String, RawValue>,
) -> Result<Vec<(Setting, u16)>, ConfigError> {
    let in_section = |source| ConfigError::Value {
        section: section.to_owned(),
        source,
    };

    let mut resolved = entries
        .iter()
        .map(|(name, value)| {
            let setting = value::parse_setting(name)?;
            let value = match value {
                RawValue::Number(number) => value::word(*number)?,
                RawValue::Action(action) => value::parse_action(setting, action)?,
            };
            Ok((setting, value))
        })
        .collect::<Result<Vec<_>, ValueError>>()
        .map_err(in_section)?;

    resolved.sort_by_key(|(setting, _)| *setting as u8);
    Ok(resolved)
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("in [{section}]: {source}")]
    Value { section: String, source: ValueError },
    #[error("{0:?} cannot be part of a profile")]
    NotInProfile(Setting),
    #[error("{0} profiles given, the device holds {max}", max = PROFILE_COUNT)]
    TooManyProfiles(usize),
}
