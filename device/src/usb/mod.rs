mod hid_report;
mod suspender;

use arduino_hal::{
    pac::{PLL, USB_DEVICE},
    usb::AvrGenericUsbBus,
};
use avr_device::interrupt;
use hid_report::{ConfigReport, PointerReport};
use shared::{REPORT_LEN, USB_MANUFACTURER, USB_PID, USB_POLL_MS, USB_PRODUCT, USB_VID};
use suspender::Suspender;
use usb_device::{
    LangID,
    bus::UsbBusAllocator,
    device::{BuilderError, StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbVidPid},
};
use usbd_hid::{descriptor::SerializedDescriptor, hid_class::HIDClass};

use crate::{isr_cell::IsrCell, shared_state::SHARED_STATE};

type UsbBus = AvrGenericUsbBus<Suspender>;

/// Product string of the pointer function.
const POINTER_PRODUCT: &str = "Trackstone";

static USB_DEVICE: IsrCell<UsbContext> = IsrCell::new();

/// What the device enumerates as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbFunction {
    /// A mouse, with the identifiers stored in the settings.
    Pointer { vid: u16, pid: u16, release: u16 },
    /// The configuration channel, with the fixed identifiers the configurator looks for.
    Config,
}

pub fn setup_usb(pll: PLL, usb: USB_DEVICE, function: UsbFunction) -> Result<(), BuilderError> {
    static USB_BUS: IsrCell<UsbBusAllocator<UsbBus>> = IsrCell::new();

    // Configure PLL interface
    // prescale 16MHz crystal -> 8MHz
    pll.pllcsr.write(|w| w.pindiv().set_bit());
    // 96MHz PLL output; /1.5 for 64MHz timers, /2 for 48MHz USB
    pll.pllfrq
        .write(|w| w.pdiv().mhz96().plltm().factor_15().pllusb().set_bit());

    // Enable PLL
    pll.pllcsr.modify(|_, w| w.plle().set_bit());

    // Check PLL lock
    while pll.pllcsr.read().plock().bit_is_clear() {}

    let usb_bus: &'static _ = USB_BUS.init(UsbBus::with_suspend_notifier(usb, Suspender::new(pll)));

    let (vid, pid, release, product, descriptor) = match function {
        UsbFunction::Pointer { vid, pid, release } => {
            (vid, pid, release, POINTER_PRODUCT, PointerReport::desc())
        }
        UsbFunction::Config => (USB_VID, USB_PID, 0, USB_PRODUCT, ConfigReport::desc()),
    };

    let strings = StringDescriptors::new(LangID::EN)
        .manufacturer(USB_MANUFACTURER)
        .product(product);

    let hid_class = HIDClass::new(usb_bus, descriptor, USB_POLL_MS);
    let usb_device = UsbDeviceBuilder::new(usb_bus, UsbVidPid(vid, pid))
        .strings(&[strings])?
        .device_release(release)
        .max_power(100)?
        .build();

    USB_DEVICE.init(UsbContext {
        usb_device,
        hid_class,
        function,
    });

    Ok(())
}

#[interrupt(atmega32u4)]
fn USB_GEN() {
    if let Some(ctx) = USB_DEVICE.get_mut() {
        ctx.poll();
    }
}

#[interrupt(atmega32u4)]
fn USB_COM() {
    if let Some(ctx) = USB_DEVICE.get_mut() {
        ctx.poll();
    }
}

struct UsbContext {
    usb_device: UsbDevice<'static, UsbBus>,
    hid_class: HIDClass<'static, UsbBus>,
    function: UsbFunction,
}

impl UsbContext {
    /// The USB interrupt code.
    #[inline]
    fn poll(&mut self) {
        // Polling must happen regardless of whether the shared state can be accessed.
        self.usb_device.poll(&mut [&mut self.hid_class]);

        interrupt::free(|cs| {
            // Both USB interrupts end up here, so the shared state might already be borrowed.
            let Ok(shared_state) = &mut SHARED_STATE.borrow(cs).try_borrow_mut() else {
                return;
            };

            match self.function {
                UsbFunction::Pointer { .. } => shared_state.if_report(|report| {
                    let res = self.hid_class.push_input(&PointerReport::from(*report));
                    matches!(res, Ok(len) if len > 0)
                }),
                UsbFunction::Config => {
                    let mut request = [0u8; REPORT_LEN];

                    if let Ok(REPORT_LEN) = self.hid_class.pull_raw_output(&mut request) {
                        shared_state.push_request(request);
                    }

                    shared_state.if_response(|response| {
                        let res = self.hid_class.push_raw_input(response.as_bytes());
                        matches!(res, Ok(REPORT_LEN))
                    });
                }
            }
        });
    }
}
