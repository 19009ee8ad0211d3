#![cfg_attr(not(test), no_std)]

pub mod adns9500;
mod bus;
pub mod eeprom;
#[cfg(test)]
mod mock;
pub mod storage;

pub use bus::{Bus, BusError, CsTiming};
