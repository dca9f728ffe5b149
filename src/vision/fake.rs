//! Scripted camera and optics for exercising the session loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Camera, FrameSource, Optics, Point};
use crate::error::VisionError;

/// Frames are just their sequence number.
pub(crate) type FakeFrame = u64;

#[derive(Default)]
pub(crate) struct FakeCamera {
    pub unavailable: bool,
    /// Reads at or after this frame number fail
    pub fail_from: Option<u64>,
    /// Reads of these frame numbers fail once each
    pub fail_at: Vec<u64>,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) struct FakeSource {
    next: u64,
    fail_from: Option<u64>,
    fail_at: Vec<u64>,
    released: Arc<AtomicUsize>,
}

impl Camera for FakeCamera {
    type Source = FakeSource;

    fn open(&self) -> Result<FakeSource, VisionError> {
        if self.unavailable {
            return Err(VisionError::CameraUnavailable("no such device".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSource {
            next: 0,
            fail_from: self.fail_from,
            fail_at: self.fail_at.clone(),
            released: Arc::clone(&self.released),
        })
    }
}

impl FrameSource for FakeSource {
    type Frame = FakeFrame;

    fn read(&mut self) -> Result<FakeFrame, VisionError> {
        if self.fail_from.is_some_and(|n| self.next >= n) {
            return Err(VisionError::Capture("empty frame".to_string()));
        }
        if self.fail_at.contains(&self.next) {
            self.next += 1;
            return Err(VisionError::Capture("corrupt frame".to_string()));
        }
        let frame = self.next;
        self.next += 1;
        Ok(frame)
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

type FindFn = Box<dyn FnMut(FakeFrame) -> Vec<Point> + Send>;
type TrackFn = Box<dyn FnMut(FakeFrame, &[Point]) -> Vec<Point> + Send>;

pub(crate) struct FakeOptics {
    find: FindFn,
    track: TrackFn,
    lost: Vec<usize>,
    truncate: bool,
}

impl FakeOptics {
    pub fn scripted(find: FindFn, track: TrackFn) -> Self {
        Self {
            find,
            track,
            lost: Vec::new(),
            truncate: false,
        }
    }

    /// Always detects `seeds`; tracking leaves points where they are.
    pub fn seeded(seeds: Vec<Point>) -> Self {
        Self::scripted(
            Box::new(move |_| seeds.clone()),
            Box::new(|_, points: &[Point]| points.to_vec()),
        )
    }

    /// Never detects anything; tracking shifts every point by `(dx, dy)`.
    pub fn shifting(dx: f32, dy: f32) -> Self {
        Self::scripted(
            Box::new(|_| Vec::new()),
            Box::new(move |_, points: &[Point]| points.iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect()),
        )
    }

    /// Report a failed status for these input indices.
    pub fn losing(mut self, lost: Vec<usize>) -> Self {
        self.lost = lost;
        self
    }

    /// Return one point fewer than asked for.
    pub fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }
}

impl Optics<FakeFrame> for FakeOptics {
    fn prepare(&mut self, raw: &FakeFrame) -> Result<FakeFrame, VisionError> {
        Ok(*raw)
    }

    fn find_circles(&mut self, prepared: &FakeFrame) -> Result<Vec<Point>, VisionError> {
        Ok((self.find)(*prepared))
    }

    fn track_points(
        &mut self,
        _prev: &FakeFrame,
        curr: &FakeFrame,
        points: &[Point],
    ) -> Result<(Vec<Point>, Vec<bool>), VisionError> {
        let mut tracked = (self.track)(*curr, points);
        let mut status: Vec<bool> = (0..tracked.len()).map(|i| !self.lost.contains(&i)).collect();
        if self.truncate {
            tracked.pop();
            status.pop();
        }
        Ok((tracked, status))
    }
}
