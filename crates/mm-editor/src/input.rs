//! Input abstraction layer.
//!
//! Normalizes pointer, wheel, and keyboard events from whatever front end
//! hosts the canvas into a unified `InputEvent` enum. Coordinates are in
//! screen pixels relative to the canvas origin.

/// A normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed.
    PointerDown { x: f32, y: f32 },

    /// Pointer moved.
    PointerMove { x: f32, y: f32 },

    /// Pointer released.
    PointerUp { x: f32, y: f32 },

    /// Pointer left the canvas. Ends any drag.
    PointerLeave,

    /// Double click / double tap.
    DoubleClick { x: f32, y: f32 },

    /// Wheel notch. Negative `delta_y` scrolls up.
    Wheel { x: f32, y: f32, delta_y: f32 },

    /// Key press.
    Key {
        key: String,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
    },
}

impl InputEvent {
    /// A key press without modifiers.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key {
            key: key.into(),
            ctrl: false,
            shift: false,
            alt: false,
            meta: false,
        }
    }
}

