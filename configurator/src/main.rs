use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use configurator::{AnyResult, Channel, Config, Device, FirmwareImage, parse_setting, parse_value};
use shared::{ERASED, Setting};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Manages the settings and sensor firmware of a Trackstone booted in programming mode.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Log every request sent to the device.
    #[arg(short, long)]
    verbose: bool,
    /// How long to wait for each report, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Erase the whole EEPROM, sensor firmware included.
    Init,
    /// Store the settings and profiles of a TOML configuration file.
    Load { file: PathBuf },
    /// Print the stored value of a setting.
    Get {
        #[arg(value_parser = parse_setting)]
        setting: Setting,
    },
    /// Store a value for a setting: a number, `0x` hexadecimal or a button action.
    Set {
        #[arg(value_parser = parse_setting)]
        setting: Setting,
        value: String,
    },
    /// Erase a setting so the device falls back to its default.
    Clear {
        #[arg(value_parser = parse_setting)]
        setting: Setting,
    },
    /// Print a hex dump of the EEPROM.
    Dump {
        #[arg(value_parser = parse_u16)]
        base: u16,
        #[arg(value_parser = parse_usize)]
        len: usize,
    },
    /// Upload the ADNS-9500 SROM image, raw or one hex byte per line.
    Firmware {
        file: PathBuf,
        /// SROM CRC the sensor must report once the image is loaded.
        #[arg(long, value_parser = parse_u16)]
        crc: u16,
        /// SROM ID the sensor must report once the image is loaded.
        #[arg(long, value_parser = parse_u8)]
        id: Option<u8>,
    },
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let device = Device::open(Duration::from_millis(cli.timeout_ms))
        .context("no Trackstone in programming mode found")?;
    let mut channel = Channel::new(device);

    match cli.command {
        Command::Init => {
            channel.init().context("erasing EEPROM")?;
            tracing::info!("EEPROM erased");
        }
        Command::Load { file } => {
            let config = Config::from_file(&file)?;
            config.load(&mut channel).context("loading configuration")?;
        }
        Command::Get { setting } => match channel.get(setting)? {
            ERASED => println!("{} = unset", setting.name()),
            value => println!("{} = {value} ({value:#06x})", setting.name()),
        },
        Command::Set { setting, value } => {
            let value = parse_value(setting, &value)?;
            channel.set(setting, value)?;
            tracing::info!("{} = {value}", setting.name());
        }
        Command::Clear { setting } => {
            channel.clear(setting)?;
            tracing::info!("{} cleared", setting.name());
        }
        Command::Dump { base, len } => {
            let data = channel.read(base, len).context("reading EEPROM")?;
            for (row, bytes) in (usize::from(base)..).step_by(16).zip(data.chunks(16)) {
                let hex: Vec<_> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                println!("{row:04x}: {}", hex.join(" "));
            }
        }
        Command::Firmware { file, crc, id } => {
            let image = FirmwareImage::from_file(&file, crc, id)?;
            image.upload(&mut channel).context("uploading firmware")?;
            tracing::info!("firmware uploaded");
        }
    }

    Ok(())
}

fn parse_number(value: &str) -> Result<u64, std::num::ParseIntError> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

fn parse_u16(value: &str) -> AnyResult<u16> {
    Ok(u16::try_from(parse_number(value)?)?)
}

fn parse_u8(value: &str) -> AnyResult<u8> {
    Ok(u8::try_from(parse_number(value)?)?)
}

fn parse_usize(value: &str) -> AnyResult<usize> {
    Ok(usize::try_from(parse_number(value)?)?)
}
