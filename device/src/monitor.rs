use arduino_hal::{
    pac::TC0,
    port::{
        Pin,
        mode::{Input, PullUp},
    },
};
use avr_device::interrupt;
use shared::{Debouncer, Edge, PROFILE_COUNT};

use crate::{
    BUTTON_COUNT,
    isr_cell::IsrCell,
    shared_state::{Event, SHARED_STATE},
};

const PROFILE_SWITCHES: usize = PROFILE_COUNT as usize;

/// Monitor context that gets setup prior to enabling interrupts and is used exclusively from the
/// `TIMER0_COMPA` interrupt.
static MONITOR_CTX: IsrCell<MonitorContext> = IsrCell::new();

/// Sets up `TIMER0_COMPA` interrupt to trigger every millisecond and constructs the
/// [`IsrCell`] used exclusively within it.
///
/// Timer comparison value formula: 16 MHz / (64 * (1 + 249)) = 1000 Hz
pub fn setup_monitor(
    timer: &TC0,
    buttons: [Pin<Input<PullUp>>; BUTTON_COUNT],
    profiles: [Pin<Input<PullUp>>; PROFILE_SWITCHES],
) {
    // WGM
    timer.tccr0a.write(|w| w.wgm0().bits(0b10));
    timer.tccr0b.write(|w| w.wgm02().clear_bit());

    // Prescaler
    timer.tccr0b.write(|w| w.cs0().prescale_64());
    timer.ocr0a.write(|w| w.bits(249));

    // Enable the timer interrupt
    timer.timsk0.write(|w| w.ocie0a().set_bit());

    MONITOR_CTX.init(MonitorContext {
        buttons: buttons.map(InputMonitor::new),
        profiles: profiles.map(InputMonitor::new),
    });
}

#[interrupt(atmega32u4)]
fn TIMER0_COMPA() {
    if let Some(ctx) = MONITOR_CTX.get_mut() {
        ctx.monitor();
    }
}

/// Debounces every physical input once per millisecond and queues the resulting [`Event`]s.
struct MonitorContext {
    buttons: [InputMonitor; BUTTON_COUNT],
    profiles: [InputMonitor; PROFILE_SWITCHES],
}

impl MonitorContext {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn monitor(&mut self) {
        interrupt::free(|cs| {
            let shared_state = &mut *SHARED_STATE.borrow(cs).borrow_mut();

            for (index, button) in self.buttons.iter_mut().enumerate() {
                if let Some(edge) = button.sample() {
                    shared_state.push_event(Event::Button {
                        index: index as u8,
                        edge,
                    });
                }
            }

            // Profile switches only act on press.
            for (index, profile) in self.profiles.iter_mut().enumerate() {
                if let Some(Edge::Pressed) = profile.sample() {
                    shared_state.push_event(Event::Profile(index as u8));
                }
            }
        });
    }
}

/// An active low input, pulled up while idle.
struct InputMonitor {
    pin: Pin<Input<PullUp>>,
    debouncer: Debouncer,
}

impl InputMonitor {
    #[inline]
    fn new(pin: Pin<Input<PullUp>>) -> Self {
        Self {
            pin,
            debouncer: Debouncer::new(),
        }
    }

    #[inline]
    fn sample(&mut self) -> Option<Edge> {
        self.debouncer.update(self.pin.is_low())
    }
}
