#![no_std]
#![feature(abi_avr_interrupt)]

pub mod bitbang_spi;
mod isr_cell;
pub mod monitor;
pub mod shared_state;
pub mod usb;

use arduino_hal::{
    delay_ms,
    port::{Pin, mode::Output},
};
use avr_device::interrupt;
use drivers::{adns9500, eeprom};
use usb_device::device::BuilderError;

/// Number of physical mouse buttons, `BTN_A` through `BTN_G`.
pub const BUTTON_COUNT: usize = 7;

/// Something the firmware cannot recover from. The only way to report it is the activity LED,
/// so each kind blinks at its own rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// The sensor failed a self check, rejected its firmware or stopped answering.
    Sensor,
    /// The EEPROM could not be read or written.
    Storage,
    /// The USB device could not be built.
    Usb,
}

impl Fault {
    const fn blink_ms(self) -> u32 {
        match self {
            Fault::Sensor => 200,
            Fault::Storage => 500,
            Fault::Usb => 1000,
        }
    }
}

impl From<adns9500::Error> for Fault {
    fn from(_: adns9500::Error) -> Self {
        Self::Sensor
    }
}

impl From<eeprom::Error> for Fault {
    fn from(_: eeprom::Error) -> Self {
        Self::Storage
    }
}

impl From<BuilderError> for Fault {
    fn from(_: BuilderError) -> Self {
        Self::Usb
    }
}

/// Stops the firmware for good, blinking the activity LED at the rate of the `fault`.
pub fn halt(mut led: Pin<Output>, fault: Fault) -> ! {
    interrupt::disable();

    loop {
        led.toggle();
        delay_ms(fault.blink_ms());
    }
}
