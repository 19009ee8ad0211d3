//! Trackstone firmware.
//!
//! The code was developed for an Arduino Leonardo with an ATmega32u4 running at 5V.
//! Hardware components used:
//! - TIMER0
//! - SPI, talking to the ADNS-9500 (SCK, MOSI, MISO, PB0 as chip select)
//! - Pins: D0-D12, D13 (activity LED), A0-A4
//! - USB
//! - PLL
//!
//! A4 selects the run mode on boot. Left floating the device tracks and enumerates as a mouse.
//! Tied low it enumerates as the configuration channel instead, for the host configurator to
//! manage the EEPROM contents.

#![no_std]
#![no_main]

use core::convert::Infallible;

use arduino_hal::{
    Delay,
    hal::port::PB0,
    pac::{PLL, TC0, USB_DEVICE},
    port::{
        Pin,
        mode::{Input, Output, PullUp},
    },
    spi::{self, ChipSelectPin, DataOrder, SerialClockRate},
};
use avr_device::{asm::sleep, interrupt};
use device::{
    BUTTON_COUNT, Fault,
    bitbang_spi::BitBangSpi,
    halt,
    monitor::setup_monitor,
    shared_state::{Event, SHARED_STATE},
    usb::{UsbFunction, setup_usb},
};
use drivers::{
    adns9500::{Adns9500, Firmware},
    eeprom::{Eeprom, Geometry},
    storage::Storage,
};
use panic_halt as _;
use shared::{Controls, MotionShaper, PROFILE_COUNT, Setting, Settings};

type Sensor = Adns9500<arduino_hal::Spi, ChipSelectPin<PB0>, Delay>;
type SettingsStorage = Storage<BitBangSpi, Pin<Output>, Delay>;

/// 25LC512: 64 KiB in 128 byte pages.
const EEPROM_CAPACITY: u32 = 0x1_0000;
const EEPROM_PAGE_SIZE: u32 = 0x80;

#[arduino_hal::entry]
fn main() -> ! {
    let peripherals = arduino_hal::Peripherals::take().unwrap();
    power_down_unused(&peripherals);

    let pins = arduino_hal::pins!(peripherals);

    let mut led = pins.d13.into_output().downgrade();
    let programming = pins.a4.into_pull_up_input().is_low();

    let eeprom_spi = BitBangSpi::new(
        pins.a0.into_output().downgrade(),
        pins.a1.into_output().downgrade(),
        pins.a2.into_pull_up_input().downgrade(),
    );
    let eeprom_cs = pins.a3.into_output().downgrade();

    let storage = match Geometry::new(EEPROM_CAPACITY, EEPROM_PAGE_SIZE)
        .and_then(|geometry| Eeprom::new(eeprom_spi, eeprom_cs, Delay::new(), geometry))
    {
        Ok(eeprom) => Storage::new(eeprom),
        Err(e) => halt(led, e.into()),
    };

    let result = if programming {
        program(peripherals.PLL, peripherals.USB_DEVICE, storage, &mut led)
    } else {
        let (spi, sensor_cs) = arduino_hal::Spi::new(
            peripherals.SPI,
            pins.sck.into_output(),
            pins.mosi.into_output(),
            pins.miso.into_pull_up_input(),
            pins.led_rx.into_output(),
            spi::Settings {
                data_order: DataOrder::MostSignificantFirst,
                // 2 MHz, the most the sensor supports.
                clock: SerialClockRate::OscfOver8,
                mode: embedded_hal::spi::MODE_3,
            },
        );

        let buttons = [
            pins.d4.into_pull_up_input().downgrade(),
            pins.d5.into_pull_up_input().downgrade(),
            pins.d6.into_pull_up_input().downgrade(),
            pins.d8.into_pull_up_input().downgrade(),
            pins.d9.into_pull_up_input().downgrade(),
            pins.d10.into_pull_up_input().downgrade(),
            pins.d12.into_pull_up_input().downgrade(),
        ];

        let profiles = [
            pins.d0.into_pull_up_input().downgrade(),
            pins.d1.into_pull_up_input().downgrade(),
            pins.d2.into_pull_up_input().downgrade(),
            pins.d3.into_pull_up_input().downgrade(),
            pins.d11.into_pull_up_input().downgrade(),
        ];

        Adns9500::new(spi, sensor_cs, Delay::new())
            .map_err(Fault::from)
            .and_then(|sensor| {
                let tracker = Tracker {
                    sensor,
                    storage,
                    motion_pin: pins.d7.into_pull_up_input().downgrade(),
                    settings: Settings::new(),
                    controls: Controls::new(),
                    shaper: MotionShaper::new(),
                };

                tracker.run(
                    &peripherals.TC0,
                    peripherals.PLL,
                    peripherals.USB_DEVICE,
                    buttons,
                    profiles,
                    &mut led,
                )
            })
    };

    match result {
        Ok(never) => match never {},
        Err(fault) => halt(led, fault),
    }
}

/// Services configuration requests until the device gets unplugged.
fn program(
    pll: PLL,
    usb: USB_DEVICE,
    mut storage: SettingsStorage,
    led: &mut Pin<Output>,
) -> Result<Infallible, Fault> {
    setup_usb(pll, usb, UsbFunction::Config)?;

    // Enable interrupts globally.
    unsafe { interrupt::enable() };
    led.set_high();

    loop {
        let request = interrupt::free(|cs| SHARED_STATE.borrow(cs).borrow_mut().take_request());

        // Requests can involve whole page writes, so they get serviced outside the critical
        // section and the response is handed back to the USB interrupt afterwards.
        if let Some(request) = request {
            led.toggle();
            let response = storage.handle(&request);
            interrupt::free(|cs| SHARED_STATE.borrow(cs).borrow_mut().set_response(response));
        }
    }
}

/// Everything the main loop owns while tracking.
struct Tracker {
    sensor: Sensor,
    storage: SettingsStorage,
    /// The sensor pulls this low while it has motion to report.
    motion_pin: Pin<Input<PullUp>>,
    settings: Settings,
    controls: Controls,
    shaper: MotionShaper,
}

impl Tracker {
    fn run(
        mut self,
        timer: &TC0,
        pll: PLL,
        usb: USB_DEVICE,
        buttons: [Pin<Input<PullUp>>; BUTTON_COUNT],
        profiles: [Pin<Input<PullUp>>; PROFILE_COUNT as usize],
        led: &mut Pin<Output>,
    ) -> Result<Infallible, Fault> {
        led.set_high();
        self.init_sensor()?;
        led.set_low();

        let (vid, pid, release) = self.settings.usb_ids();

        // USB must get setup after the timer, otherwise enumeration is unreliable.
        setup_monitor(timer, buttons, profiles);
        setup_usb(pll, usb, UsbFunction::Pointer { vid, pid, release })?;

        // Enable interrupts globally.
        unsafe { interrupt::enable() };

        loop {
            // NOTE: The critical section only pops the event, acting on it can take a while.
            let event = interrupt::free(|cs| SHARED_STATE.borrow(cs).borrow_mut().pop_event());

            if let Some(event) = event {
                self.handle_event(event)?;
            }

            if let Some(target) = self.controls.take_cpi_change() {
                let (cpi_x, cpi_y) = target.cpi(&self.settings);
                self.sensor.set_resolution_xy(cpi_x, cpi_y)?;
            }

            if self.motion_pin.is_low() {
                self.track()?;
            } else if event.is_none() {
                sleep();
            }
        }
    }

    /// Loads the settings, brings the sensor up with the stored firmware image, if any, and
    /// applies the configured resolution.
    fn init_sensor(&mut self) -> Result<(), Fault> {
        self.storage.load_settings(&mut self.settings)?;
        self.storage
            .load_profile(self.settings.profile(), &mut self.settings)?;

        if let Some(location) = self.settings.firmware() {
            let mut reader = self.storage.firmware(location);
            let uploaded = self.sensor.reset_with_firmware(Firmware {
                image: &mut reader,
                crc: location.crc,
                id: location.id,
            });

            // A failed read cuts the image short, which the sensor would report as a CRC mismatch.
            reader.finish()?;
            uploaded?;
        } else {
            self.sensor.reset()?;
            self.sensor.enable_laser(true)?;
        }

        let (cpi_x, cpi_y) = self.settings.cpi();
        self.sensor.set_resolution_xy(cpi_x, cpi_y)?;

        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<(), Fault> {
        match event {
            Event::Button { index, edge } => {
                let Some(action) = self.settings.button_action(index.into()) else {
                    return Ok(());
                };

                self.controls.apply(action, edge);
                let buttons = self.controls.buttons();
                interrupt::free(|cs| SHARED_STATE.borrow(cs).borrow_mut().set_buttons(buttons));
            }
            Event::Profile(profile) => {
                self.settings.set(Setting::ProfileCurrent, profile.into());
                self.storage.load_profile(profile, &mut self.settings)?;
                self.controls.request_default_cpi();
            }
            Event::Suspend => self.sensor.enable_laser(false)?,
            Event::Resume => self.sensor.enable_laser(true)?,
        }

        Ok(())
    }

    /// Reads the pending motion and queues it for the next pointer report.
    fn track(&mut self) -> Result<(), Fault> {
        let Some(delta) = self.sensor.motion_delta()? else {
            return Ok(());
        };

        let scroll = self.controls.scroll_active();

        if let Some(motion) = self.shaper.shape(delta.dx, delta.dy, scroll, &self.settings) {
            interrupt::free(|cs| SHARED_STATE.borrow(cs).borrow_mut().add_motion(motion));
        }

        Ok(())
    }
}

/// Turns off the peripherals neither mode uses. The SPI, TIMER0 and USB stay powered.
fn power_down_unused(dp: &arduino_hal::Peripherals) {
    dp.AC.acsr.write(|w| w.acd().set_bit());
    dp.ADC.adcsra.write(|w| w.aden().clear_bit());
    dp.TWI.twcr.write(|w| w.twen().clear_bit());
    dp.USART1
        .ucsr1b
        .write(|w| w.rxen1().clear_bit().txen1().clear_bit());

    dp.CPU
        .prr0
        .write(|w| w.pradc().set_bit().prtwi().set_bit().prtim1().set_bit());
    dp.CPU.prr1.write(|w| {
        w.prusart1()
            .set_bit()
            .prtim3()
            .set_bit()
            .prtim4()
            .set_bit()
    });

    // JTD only takes effect when written twice within four cycles.
    dp.CPU.mcucr.write(|w| w.jtd().set_bit());
    dp.CPU.mcucr.write(|w| w.jtd().set_bit());
}
