use super::{Optics, Point};
use crate::error::VisionError;

/// Seeds a scene from circle detections.
#[derive(Debug, Clone, Copy)]
pub struct PointFinder {
    max_points: usize,
}

impl PointFinder {
    pub fn new(max_points: usize) -> Self {
        Self { max_points }
    }

    /// At most `max_points` candidates, in detection order. Zero detections is
    /// an empty list, not an error.
    pub fn find<F, O: Optics<F>>(&self, optics: &mut O, prepared: &F) -> Result<Vec<Point>, VisionError> {
        let mut points = optics.find_circles(prepared)?;
        points.retain(|p| p.is_finite());
        points.truncate(self.max_points);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::fake::FakeOptics;

    #[test]
    fn test_caps_candidates() {
        let mut optics = FakeOptics::seeded((0..30).map(|i| Point::new(i as f32, 0.0)).collect());
        let points = PointFinder::new(20).find(&mut optics, &0u64).unwrap();
        assert_eq!(points.len(), 20);
        assert_eq!(points[0], Point::new(0.0, 0.0));
    }

    #[test]
    fn test_no_detections_is_empty() {
        let mut optics = FakeOptics::seeded(Vec::new());
        assert!(PointFinder::new(20).find(&mut optics, &0u64).unwrap().is_empty());
    }

    #[test]
    fn test_drops_non_finite() {
        let mut optics = FakeOptics::seeded(vec![Point::new(f32::NAN, 1.0), Point::new(1.0, 1.0)]);
        let points = PointFinder::new(20).find(&mut optics, &0u64).unwrap();
        assert_eq!(points, vec![Point::new(1.0, 1.0)]);
    }
}
