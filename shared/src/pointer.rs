use crate::{
    button::{ButtonAction, MouseButtons},
    debounce::Edge,
    setting::{Setting, Settings},
};

/// Which resolution pair should be applied to the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpiTarget {
    Default,
    HighRes,
    Scroll,
}

impl CpiTarget {
    #[must_use]
    pub fn cpi(self, settings: &Settings) -> (u16, u16) {
        match self {
            CpiTarget::Default => settings.cpi(),
            CpiTarget::HighRes => settings.high_res_cpi(),
            CpiTarget::Scroll => settings.scroll_cpi(),
        }
    }
}

/// Button driven state of the pointer.
///
/// Resolution changes are only recorded here. Writing them to the sensor takes hundreds of
/// microseconds, so the main loop picks them up through [`Controls::take_cpi_change`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Controls {
    buttons: MouseButtons,
    scroll_active: bool,
    pending_cpi: Option<CpiTarget>,
}

impl Controls {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buttons: MouseButtons::empty(),
            scroll_active: false,
            pending_cpi: None,
        }
    }

    pub fn apply(&mut self, action: ButtonAction, edge: Edge) {
        if let Some(button) = action.mouse_button() {
            match edge {
                Edge::Pressed => self.buttons.press(button),
                Edge::Released => self.buttons.release(button),
            }
            return;
        }

        let target = match (action, edge) {
            (ButtonAction::Scroll, Edge::Pressed) => {
                self.scroll_active = true;
                CpiTarget::Scroll
            }
            (ButtonAction::Scroll, Edge::Released) => {
                self.scroll_active = false;
                CpiTarget::Default
            }
            (ButtonAction::HighRes, Edge::Pressed) => CpiTarget::HighRes,
            _ => CpiTarget::Default,
        };

        self.pending_cpi = Some(target);
    }

    /// Requests the default resolution to be reapplied, e.g. after a profile switch.
    #[inline]
    pub fn request_default_cpi(&mut self) {
        self.pending_cpi = Some(CpiTarget::Default);
    }

    #[inline]
    #[must_use]
    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    #[inline]
    #[must_use]
    pub fn scroll_active(&self) -> bool {
        self.scroll_active
    }

    #[inline]
    pub fn take_cpi_change(&mut self) -> Option<CpiTarget> {
        self.pending_cpi.take()
    }
}

/// Shaped motion, ready to be reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    Move { x: i16, y: i16 },
    Scroll { wheel: i16, pan: i16 },
}

/// Turns raw sensor deltas into pointer motion according to the settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct MotionShaper {
    scroll_counter: u16,
}

impl MotionShaper {
    #[must_use]
    pub const fn new() -> Self {
        Self { scroll_counter: 0 }
    }

    /// Shapes a raw delta.
    ///
    /// While scrolling only every `SCROLL_SKIP`-th delta is turned into a scroll, everything in
    /// between is dropped and `None` is returned.
    pub fn shape(&mut self, dx: i16, dy: i16, scroll: bool, settings: &Settings) -> Option<Motion> {
        if scroll {
            let fire = self.scroll_counter >= settings.get(Setting::ScrollSkip);
            if fire {
                self.scroll_counter = 0;
            }
            self.scroll_counter = self.scroll_counter.saturating_add(1);

            return fire.then_some(Motion::Scroll { wheel: dy, pan: dx });
        }

        let (dx, dy) = Self::accelerate(dx, dy, settings);
        let (dx, dy) = Self::skew(dx, dy, settings);

        Some(Motion::Move {
            x: dx,
            y: dy.saturating_neg(),
        })
    }

    /// Scales each axis by `|d| / multiplier + 1` when both multipliers are set.
    #[allow(clippy::cast_possible_truncation)]
    fn accelerate(dx: i16, dy: i16, settings: &Settings) -> (i16, i16) {
        let mul_x = settings.get(Setting::CpiXMultiplier);
        let mul_y = settings.get(Setting::CpiYMultiplier);

        if mul_x == 0 || mul_y == 0 {
            return (dx, dy);
        }

        let scale = |d: i16, mul: u16| {
            let factor = f32::from(d.unsigned_abs()) / f32::from(mul) + 1.0;
            (factor * f32::from(d)) as i16
        };

        (scale(dx, mul_x), scale(dy, mul_y))
    }

    /// Rotates the axes by the configured skew angles, in degrees.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn skew(dx: i16, dy: i16, settings: &Settings) -> (i16, i16) {
        let skew_x = settings.get(Setting::CoordXSkew) as i16;
        let skew_y = settings.get(Setting::CoordYSkew) as i16;

        if skew_x == 0 && skew_y == 0 {
            return (dx, dy);
        }

        let rad_x = f32::from(skew_x).to_radians();
        let rad_y = f32::from(skew_y).to_radians();
        let (x, y) = (f32::from(dx), f32::from(dy));

        let new_x = x * libm::cosf(rad_x) - y * libm::sinf(rad_x);
        let new_y = y * libm::cosf(rad_y) + x * libm::sinf(rad_y);

        (new_x as i16, new_y as i16)
    }
}

/// A single pointer report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportData {
    pub buttons: u8,
    pub x: i16,
    pub y: i16,
    pub wheel: i8,
    pub pan: i8,
}

/// Motion and button state accumulated between two USB polls.
///
/// Whatever does not fit in one report is carried over to the next.
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingReport {
    buttons: u8,
    x: i32,
    y: i32,
    wheel: i32,
    pan: i32,
    dirty: bool,
}

impl PendingReport {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buttons: 0,
            x: 0,
            y: 0,
            wheel: 0,
            pan: 0,
            dirty: false,
        }
    }

    pub fn set_buttons(&mut self, buttons: MouseButtons) {
        if self.buttons != buttons.bits() {
            self.buttons = buttons.bits();
            self.dirty = true;
        }
    }

    pub fn add(&mut self, motion: Motion) {
        match motion {
            Motion::Move { x, y } => {
                self.x = self.x.saturating_add(x.into());
                self.y = self.y.saturating_add(y.into());
            }
            Motion::Scroll { wheel, pan } => {
                self.wheel = self.wheel.saturating_add(wheel.into());
                self.pan = self.pan.saturating_add(pan.into());
            }
        }
        self.dirty = true;
    }

    /// Takes the next report to send, if there is anything to send.
    #[allow(clippy::cast_possible_truncation)]
    pub fn take(&mut self) -> Option<ReportData> {
        fn split(value: &mut i32, min: i32, max: i32) -> i32 {
            let sent = (*value).clamp(min, max);
            *value -= sent;
            sent
        }

        if !self.dirty {
            return None;
        }

        let x = split(&mut self.x, i16::MIN.into(), i16::MAX.into()) as i16;
        let y = split(&mut self.y, i16::MIN.into(), i16::MAX.into()) as i16;
        let wheel = split(&mut self.wheel, i8::MIN.into(), i8::MAX.into()) as i8;
        let pan = split(&mut self.pan, i8::MIN.into(), i8::MAX.into()) as i8;

        self.dirty = self.x != 0 || self.y != 0 || self.wheel != 0 || self.pan != 0;

        Some(ReportData {
            buttons: self.buttons,
            x,
            y,
            wheel,
            pan,
        })
    }
}
