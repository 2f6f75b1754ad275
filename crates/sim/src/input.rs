//! Per-tick player input.
//!
//! Axes and look angles are stored as the fixed-point integers that go on
//! the wire, so the client and the authority simulate from identical values.
//!
//! Quantization uses Rust's saturating float-to-int casts: values outside
//! the representable range clamp to the nearest bound (axes to ±1, angles to
//! ±3276.7°) and NaN becomes zero. Callers keep angles within that range.

use bitflags::bitflags;

use crate::Tick;

/// Scale applied to movement axes before truncation to `i8`.
pub const AXIS_SCALE: f32 = 127.0;

/// Scale applied to look angles (degrees) before truncation to `i16`.
pub const ANGLE_SCALE: f32 = 10.0;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Buttons: u8 {
        const JUMP = 0x01;
        const FIRE = 0x02;
        const AIM  = 0x04;
        const RUN  = 0x08;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InputState {
    pub tick: Tick,
    horizontal: i8,
    vertical: i8,
    pitch: i16,
    yaw: i16,
    pub buttons: Buttons,
}

fn quantize_axis(value: f32) -> i8 {
    (value * AXIS_SCALE) as i8
}

fn quantize_angle(degrees: f32) -> i16 {
    (degrees * ANGLE_SCALE) as i16
}

impl InputState {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Rebuild from wire values without requantizing.
    pub fn from_raw(tick: Tick, horizontal: i8, vertical: i8, pitch: i16, yaw: i16, buttons: Buttons) -> Self {
        Self {
            tick,
            horizontal,
            vertical,
            pitch,
            yaw,
            buttons,
        }
    }

    /// Movement axes in `[-1, 1]`: `horizontal` strafes right, `vertical`
    /// moves forward.
    pub fn with_axes(mut self, horizontal: f32, vertical: f32) -> Self {
        self.horizontal = quantize_axis(horizontal);
        self.vertical = quantize_axis(vertical);
        self
    }

    /// Four-way digital movement.
    pub fn with_directions(self, left: bool, right: bool, forward: bool, backward: bool) -> Self {
        let axis = |neg: bool, pos: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        self.with_axes(axis(left, right), axis(backward, forward))
    }

    pub fn with_look(mut self, pitch_degrees: f32, yaw_degrees: f32) -> Self {
        self.pitch = quantize_angle(pitch_degrees);
        self.yaw = quantize_angle(yaw_degrees);
        self
    }

    pub fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn horizontal(&self) -> f32 {
        f32::from(self.horizontal) / AXIS_SCALE
    }

    pub fn vertical(&self) -> f32 {
        f32::from(self.vertical) / AXIS_SCALE
    }

    pub fn pitch(&self) -> f32 {
        f32::from(self.pitch) / ANGLE_SCALE
    }

    pub fn yaw(&self) -> f32 {
        f32::from(self.yaw) / ANGLE_SCALE
    }

    pub fn raw_axes(&self) -> (i8, i8) {
        (self.horizontal, self.vertical)
    }

    pub fn raw_look(&self) -> (i16, i16) {
        (self.pitch, self.yaw)
    }

    pub fn jump(&self) -> bool {
        self.buttons.contains(Buttons::JUMP)
    }

    pub fn fire(&self) -> bool {
        self.buttons.contains(Buttons::FIRE)
    }

    pub fn aim(&self) -> bool {
        self.buttons.contains(Buttons::AIM)
    }

    pub fn run(&self) -> bool {
        self.buttons.contains(Buttons::RUN)
    }
}
