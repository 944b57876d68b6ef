//! Per-client pan/zoom transform.
//!
//! Screen-space position is `world × zoom + pan`. The viewport is view
//! state only: it is never persisted and never broadcast.

use crate::model::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zoom bounds and the per-notch wheel step.
///
/// Deserializing validates the bounds, so limits read from a config file
/// always satisfy `0 < min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawZoomLimits")]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
    pub wheel_step: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid zoom limits: min {min}, max {max}, wheel step {wheel_step}")]
pub struct InvalidZoomLimits {
    pub min: f32,
    pub max: f32,
    pub wheel_step: f32,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawZoomLimits {
    min: f32,
    max: f32,
    wheel_step: f32,
}

impl Default for RawZoomLimits {
    fn default() -> Self {
        let ZoomLimits {
            min,
            max,
            wheel_step,
        } = ZoomLimits::default();
        Self {
            min,
            max,
            wheel_step,
        }
    }
}

impl TryFrom<RawZoomLimits> for ZoomLimits {
    type Error = InvalidZoomLimits;

    fn try_from(raw: RawZoomLimits) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max, raw.wheel_step)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 2.0,
            wheel_step: 0.1,
        }
    }
}

impl ZoomLimits {
    pub fn new(min: f32, max: f32, wheel_step: f32) -> Result<Self, InvalidZoomLimits> {
        let valid = min.is_finite()
            && max.is_finite()
            && wheel_step.is_finite()
            && min > 0.0
            && min <= max
            && wheel_step >= 0.0;
        if valid {
            Ok(Self {
                min,
                max,
                wheel_step,
            })
        } else {
            Err(InvalidZoomLimits {
                min,
                max,
                wheel_step,
            })
        }
    }

    /// Clamp into `[min, max]`. Never panics, even for limits built by hand
    /// with `min > max`; `max` wins then.
    pub fn clamp(&self, zoom: f32) -> f32 {
        zoom.max(self.min).min(self.max)
    }
}

/// Current zoom factor and pan offset (screen pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    limits: ZoomLimits,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}

impl ViewportState {
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            zoom: limits.clamp(1.0),
            pan_x: 0.0,
            pan_y: 0.0,
            limits,
        }
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    /// World → screen.
    pub fn to_screen(&self, p: Position) -> (f32, f32) {
        (p.x * self.zoom + self.pan_x, p.y * self.zoom + self.pan_y)
    }

    /// Screen → world.
    pub fn to_world(&self, sx: f32, sy: f32) -> Position {
        Position::new((sx - self.pan_x) / self.zoom, (sy - self.pan_y) / self.zoom)
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Set the zoom (clamped), keeping the world point under screen
    /// position `(sx, sy)` fixed on screen. Returns whether zoom changed.
    pub fn zoom_at(&mut self, zoom: f32, sx: f32, sy: f32) -> bool {
        let zoom = self.limits.clamp(zoom);
        if zoom == self.zoom {
            return false;
        }
        let anchor = self.to_world(sx, sy);
        self.zoom = zoom;
        self.pan_x = sx - anchor.x * zoom;
        self.pan_y = sy - anchor.y * zoom;
        true
    }

    /// One wheel notch at `(sx, sy)`: scrolling up (negative `delta_y`)
    /// zooms in by one step, scrolling down zooms out.
    pub fn wheel(&mut self, delta_y: f32, sx: f32, sy: f32) -> bool {
        if delta_y == 0.0 {
            return false;
        }
        let step = if delta_y < 0.0 {
            self.limits.wheel_step
        } else {
            -self.limits.wheel_step
        };
        self.zoom_at(self.zoom + step, sx, sy)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.limits);
    }
}
