use core::cell::RefCell;

use avr_device::interrupt::Mutex;
use circular_buffer::CircularBuffer;
use shared::{ConfigResponse, Edge, Motion, MouseButtons, PendingReport, REPORT_LEN, ReportData};

/// Mutex locked state shared between the interrupts and the main loop.
pub static SHARED_STATE: Mutex<RefCell<SharedState>> = Mutex::new(RefCell::new(SharedState::new()));

/// Something that happened in interrupt context and must be acted upon by the main loop.
///
/// Interrupt handlers only record these. Everything touching the sensor or the EEPROM takes far
/// too long to run in an interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A debounced edge on the physical button at the given wiring index.
    Button { index: u8, edge: Edge },
    /// A profile switch got pressed.
    Profile(u8),
    Suspend,
    Resume,
}

#[derive(Debug)]
pub struct SharedState {
    /// FIFO event queue, oldest events get dropped when the main loop falls behind.
    events: CircularBuffer<{ Self::EVENT_QUEUE_SIZE }, Event>,
    /// Pointer motion and buttons not reported yet.
    pending: PendingReport,
    /// Report taken out of [`SharedState::pending`] that the host did not accept yet.
    unsent: Option<ReportData>,
    /// Configuration request waiting to be serviced by the main loop.
    request: Option<[u8; REPORT_LEN]>,
    /// Configuration response waiting to be picked up by the host.
    response: Option<ConfigResponse>,
}

impl SharedState {
    /// Each [`Event`] is two bytes, so this is a small dent in the 2560 bytes of RAM.
    const EVENT_QUEUE_SIZE: usize = 32;

    const fn new() -> Self {
        Self {
            events: CircularBuffer::new(),
            pending: PendingReport::new(),
            unsent: None,
            request: None,
            response: None,
        }
    }

    #[inline]
    pub fn push_event(&mut self, event: Event) {
        self.events.push_front(event);
    }

    #[inline]
    pub fn pop_event(&mut self) -> Option<Event> {
        self.events.pop_back()
    }

    #[inline]
    pub fn set_buttons(&mut self, buttons: MouseButtons) {
        self.pending.set_buttons(buttons);
    }

    #[inline]
    pub fn add_motion(&mut self, motion: Motion) {
        self.pending.add(motion);
    }

    /// Executes the closure with the next pointer report, if there is one, and only considers it
    /// sent if the closure returns `true`.
    #[inline]
    pub fn if_report<F>(&mut self, f: F)
    where
        F: FnOnce(&ReportData) -> bool,
    {
        if self.unsent.is_none() {
            self.unsent = self.pending.take();
        }

        if self.unsent.as_ref().is_some_and(f) {
            self.unsent = None;
        }
    }

    /// Stores a configuration request. The host waits for every response before sending the next
    /// request, so one arriving while another is still in flight gets dropped.
    #[inline]
    pub fn push_request(&mut self, request: [u8; REPORT_LEN]) {
        if self.request.is_none() && self.response.is_none() {
            self.request = Some(request);
        }
    }

    #[inline]
    pub fn take_request(&mut self) -> Option<[u8; REPORT_LEN]> {
        self.request.take()
    }

    #[inline]
    pub fn set_response(&mut self, response: ConfigResponse) {
        self.response = Some(response);
    }

    /// Executes the closure with the pending configuration response, if there is one, and drops
    /// it if the closure returns `true`.
    #[inline]
    pub fn if_response<F>(&mut self, f: F)
    where
        F: FnOnce(&ConfigResponse) -> bool,
    {
        if self.response.as_ref().is_some_and(f) {
            self.response = None;
        }
    }
}
