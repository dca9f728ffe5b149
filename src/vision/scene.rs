use std::time::{Duration, Instant};

use super::{Marker, Point};
use crate::gesture::History;

/// One wand-tip candidate followed within a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPoint {
    pub position: Point,
    pub history: History,
}

impl TrackedPoint {
    pub fn new(position: Point) -> Self {
        Self {
            position,
            history: History::new(),
        }
    }
}

/// A slot that moved this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub slot: usize,
    pub from: Point,
    pub to: Point,
}

/// Tracking window with its own freshly detected slots.
///
/// Slots are allocated once per reseed and never carried into the next scene.
#[derive(Debug)]
pub struct Scene<F> {
    reference: F,
    slots: Vec<Option<TrackedPoint>>,
    started: Instant,
}

impl<F> Scene<F> {
    pub fn new(reference: F, points: Vec<Point>) -> Self {
        Self {
            reference,
            slots: points.into_iter().map(|p| Some(TrackedPoint::new(p))).collect(),
            started: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn reference(&self) -> &F {
        &self.reference
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots still being tracked.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn positions(&self) -> Vec<Option<Point>> {
        self.slots.iter().map(|s| s.as_ref().map(|t| t.position)).collect()
    }

    pub fn slot(&self, slot: usize) -> Option<&TrackedPoint> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut TrackedPoint> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Move slots to their advanced positions and make `curr` the new reference.
    ///
    /// Slots without a new position are dropped for the rest of the scene.
    pub fn step(&mut self, curr: F, advanced: Vec<Option<Point>>) -> Vec<Move> {
        let mut moves = Vec::new();
        for (slot, (entry, next)) in self.slots.iter_mut().zip(advanced).enumerate() {
            match (entry.as_mut(), next) {
                (Some(tracked), Some(to)) => {
                    moves.push(Move {
                        slot,
                        from: tracked.position,
                        to,
                    });
                    tracked.position = to;
                }
                (Some(_), None) => *entry = None,
                (None, _) => {}
            }
        }
        self.reference = curr;
        moves
    }

    pub fn markers(&self, moves: &[Move]) -> Vec<Marker> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| {
                s.as_ref().map(|t| Marker {
                    slot,
                    at: t.position,
                    from: moves.iter().find(|m| m.slot == slot).map(|m| m.from),
                })
            })
            .collect()
    }
}
