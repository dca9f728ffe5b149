//! Camera frames and wand-tip points.
//!
//! Capture and image processing are collaborators behind [`Camera`] and
//! [`Optics`]; this module wraps them with the tolerance rules the session
//! loop relies on.

pub mod finder;
#[cfg(feature = "camera")]
pub mod opencv;
pub mod scene;
pub mod tracker;

#[cfg(test)]
pub(crate) mod fake;

use serde::{Deserialize, Serialize};

use crate::error::VisionError;

pub use finder::PointFinder;
pub use scene::{Scene, TrackedPoint};
pub use tracker::PointTracker;

/// Frame position in pixels. Cartesian: `y` grows upward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An open camera. Dropping it releases the device.
pub trait FrameSource: Send {
    type Frame: Send;

    /// Next frame; may block for up to one frame period.
    fn read(&mut self) -> Result<Self::Frame, VisionError>;
}

pub trait Camera: Send + Sync {
    type Source: FrameSource;

    fn open(&self) -> Result<Self::Source, VisionError>;
}

/// One point drawn on a debug frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub slot: usize,
    pub at: Point,
    /// Previous position, drawn as a trail
    pub from: Option<Point>,
}

/// Image-processing primitives. Implementations are stateless between calls
/// apart from cached kernels.
pub trait Optics<F>: Send {
    /// Filter chain applied to every raw frame before detection or tracking.
    fn prepare(&mut self, raw: &F) -> Result<F, VisionError>;

    /// Circular bright candidates, best first. Empty when nothing is visible.
    fn find_circles(&mut self, prepared: &F) -> Result<Vec<Point>, VisionError>;

    /// Optical flow from `prev` to `curr`: one position and one status per input point.
    fn track_points(
        &mut self,
        prev: &F,
        curr: &F,
        points: &[Point],
    ) -> Result<(Vec<Point>, Vec<bool>), VisionError>;

    /// Encoded debug image of `raw` with markers, if supported.
    fn annotate(&mut self, _raw: &F, _markers: &[Marker]) -> Result<Option<Vec<u8>>, VisionError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        assert_eq!(Point::new(0.0, 0.0).distance(Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_point_finite() {
        assert!(Point::new(1.0, 2.0).is_finite());
        assert!(!Point::new(f32::NAN, 2.0).is_finite());
    }
}
