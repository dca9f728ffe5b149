use super::{Optics, Point};
use crate::error::VisionError;

/// Advances live scene slots with optical flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointTracker;

impl PointTracker {
    pub fn new() -> Self {
        Self
    }

    /// New position per slot; `None` for slots already dropped or lost this frame.
    ///
    /// A result whose length does not match the input is a tracking error for
    /// the whole frame.
    pub fn advance<F, O: Optics<F>>(
        &self,
        optics: &mut O,
        prev: &F,
        curr: &F,
        slots: &[Option<Point>],
    ) -> Result<Vec<Option<Point>>, VisionError> {
        let live: Vec<(usize, Point)> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i, p)))
            .collect();
        let mut advanced = vec![None; slots.len()];
        if live.is_empty() {
            return Ok(advanced);
        }

        let inputs: Vec<Point> = live.iter().map(|&(_, p)| p).collect();
        let (points, status) = optics.track_points(prev, curr, &inputs)?;
        if points.len() != inputs.len() || status.len() != inputs.len() {
            return Err(VisionError::Tracking(format!(
                "tracked {} points with {} statuses for {} inputs",
                points.len(),
                status.len(),
                inputs.len()
            )));
        }

        for ((&(slot, _), point), ok) in live.iter().zip(points).zip(status) {
            if ok && point.is_finite() {
                advanced[slot] = Some(point);
            }
        }
        Ok(advanced)
    }
}
