use core::convert::Infallible;

use arduino_hal::port::{
    Pin,
    mode::{Input, Output, PullUp},
};
use embedded_hal::spi::{ErrorType, SpiBus};

/// Software SPI bus, mode 0, most significant bit first.
///
/// The hardware SPI peripheral is owned by the sensor, which needs mode 3 and has to be driven
/// while the firmware image gets streamed out of the EEPROM, so the EEPROM gets its own pins.
/// Toggling the pins from software stays well below the clock limit of 25xx parts.
/// 25xx parts accept both mode 0 and mode 3, mode 0 keeps the clock idle low.
#[derive(Debug)]
pub struct BitBangSpi {
    sck: Pin<Output>,
    mosi: Pin<Output>,
    miso: Pin<Input<PullUp>>,
}

impl BitBangSpi {
    pub fn new(mut sck: Pin<Output>, mosi: Pin<Output>, miso: Pin<Input<PullUp>>) -> Self {
        sck.set_low();
        Self { sck, mosi, miso }
    }

    fn exchange(&mut self, out: u8) -> u8 {
        let mut received = 0;

        for bit in (0..u8::BITS).rev() {
            if out & (1 << bit) == 0 {
                self.mosi.set_low();
            } else {
                self.mosi.set_high();
            }

            self.sck.set_high();
            received = (received << 1) | u8::from(self.miso.is_high());
            self.sck.set_low();
        }

        received
    }
}

impl ErrorType for BitBangSpi {
    type Error = Infallible;
}

impl SpiBus for BitBangSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.exchange(0);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for word in words {
            self.exchange(*word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());

        for i in 0..len {
            let received = self.exchange(write.get(i).copied().unwrap_or_default());
            if let Some(word) = read.get_mut(i) {
                *word = received;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.exchange(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
