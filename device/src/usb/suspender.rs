use arduino_hal::{pac::PLL, usb::SuspendNotifier};
use avr_device::interrupt;

use crate::shared_state::{Event, SHARED_STATE};

/// Implementor of [`SuspendNotifier`] that gates the PLL and lets the main loop know it should
/// turn the laser off while the bus is suspended and back on when it resumes.
pub struct Suspender(PLL);

impl Suspender {
    #[inline]
    pub fn new(pll: PLL) -> Self {
        Self(pll)
    }

    fn notify(event: Event) {
        interrupt::free(|cs| {
            if let Ok(mut shared_state) = SHARED_STATE.borrow(cs).try_borrow_mut() {
                shared_state.push_event(event);
            }
        });
    }
}

impl SuspendNotifier for Suspender {
    fn suspend(&self) {
        self.0.suspend();
        Self::notify(Event::Suspend);
    }

    fn resume(&self) {
        self.0.resume();
        Self::notify(Event::Resume);
    }
}
