/// Level change reported by a [`Debouncer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Shift register debouncer.
///
/// Meant to be sampled at a fixed rate (once per millisecond on the device). An input is only
/// considered pressed or released after [`Debouncer::STABLE_SAMPLES`] consecutive identical
/// samples.
#[derive(Clone, Copy, Debug, Default)]
pub struct Debouncer {
    history: u8,
    pressed: bool,
}

impl Debouncer {
    pub const STABLE_SAMPLES: u32 = u8::BITS;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            history: 0,
            pressed: false,
        }
    }

    /// Feeds a raw sample and returns the edge, if one just got confirmed.
    pub fn update(&mut self, active: bool) -> Option<Edge> {
        self.history = (self.history << 1) | u8::from(active);

        match (self.pressed, self.history) {
            (false, u8::MAX) => {
                self.pressed = true;
                Some(Edge::Pressed)
            }
            (true, 0) => {
                self.pressed = false;
                Some(Edge::Released)
            }
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}
