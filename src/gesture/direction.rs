use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic direction of one frame's motion.
///
/// Vertical names follow the Cartesian convention of [`crate::vision::Point`]:
/// a positive `dy` is `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Left,
    Up,
    Down,
    UpRight,
    UpLeft,
    DownRight,
    DownLeft,
}

impl Direction {
    pub fn token(self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::Left => "left",
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::UpRight => "upright",
            Direction::UpLeft => "upleft",
            Direction::DownRight => "downright",
            Direction::DownLeft => "downleft",
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::UpRight | Direction::UpLeft | Direction::DownRight | Direction::DownLeft
        )
    }

    fn horizontal(dx: f32) -> Self {
        if dx > 0.0 { Direction::Right } else { Direction::Left }
    }

    fn vertical(dy: f32) -> Self {
        if dy > 0.0 { Direction::Up } else { Direction::Down }
    }

    /// Classify a displacement.
    ///
    /// A cardinal direction needs the dominant axis above `threshold` and the
    /// other axis below `dominant / ratio`. Diagonals are only produced when
    /// `diagonal_band` is set, both axes clear the threshold, and the larger
    /// axis is at most `diagonal_band` times the smaller one.
    pub fn from_displacement(
        dx: f32,
        dy: f32,
        threshold: f32,
        ratio: f32,
        diagonal_band: Option<f32>,
    ) -> Option<Self> {
        let (ax, ay) = (dx.abs(), dy.abs());
        let ratio = ratio.max(1.0);

        if ax > threshold && ay < ax / ratio {
            return Some(Self::horizontal(dx));
        }
        if ay > threshold && ax < ay / ratio {
            return Some(Self::vertical(dy));
        }

        let band = diagonal_band?;
        if ax > threshold && ay > threshold && ax.max(ay) <= band * ax.min(ay) {
            let d = match (dx > 0.0, dy > 0.0) {
                (true, true) => Direction::UpRight,
                (false, true) => Direction::UpLeft,
                (true, false) => Direction::DownRight,
                (false, false) => Direction::DownLeft,
            };
            return Some(d);
        }
        None
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f32 = 5.0;
    const R: f32 = 2.0;

    fn classify(dx: f32, dy: f32) -> Option<Direction> {
        Direction::from_displacement(dx, dy, T, R, None)
    }

    #[test]
    fn test_horizontal_dominant() {
        for &(dx, dy) in &[(6.0, 0.0), (30.0, 14.9), (30.0, -14.9), (100.0, 3.0)] {
            assert_eq!(classify(dx, dy), Some(Direction::Right), "dx={dx} dy={dy}");
            assert_eq!(classify(-dx, dy), Some(Direction::Left), "dx={} dy={dy}", -dx);
        }
    }

    #[test]
    fn test_vertical_dominant() {
        for &(dx, dy) in &[(0.0, 6.0), (14.9, 30.0), (-14.9, 30.0)] {
            assert_eq!(classify(dx, dy), Some(Direction::Up), "dx={dx} dy={dy}");
            assert_eq!(classify(dx, -dy), Some(Direction::Down), "dx={dx} dy={}", -dy);
        }
    }

    #[test]
    fn test_below_threshold_is_no_motion() {
        assert_eq!(classify(5.0, 0.0), None);
        assert_eq!(classify(0.0, -4.0), None);
        assert_eq!(classify(0.0, 0.0), None);
    }

    #[test]
    fn test_ambiguous_without_diagonals() {
        assert_eq!(classify(30.0, 20.0), None);
        assert_eq!(classify(-20.0, -20.0), None);
    }

    #[test]
    fn test_diagonals_when_enabled() {
        let band = Some(1.5);
        assert_eq!(Direction::from_displacement(20.0, 20.0, T, R, band), Some(Direction::UpRight));
        assert_eq!(Direction::from_displacement(-20.0, 25.0, T, R, band), Some(Direction::UpLeft));
        assert_eq!(Direction::from_displacement(20.0, -18.0, T, R, band), Some(Direction::DownRight));
        assert_eq!(Direction::from_displacement(-20.0, -20.0, T, R, band), Some(Direction::DownLeft));
        // 1.75:1 is outside the band but not dominant enough to be cardinal
        assert_eq!(Direction::from_displacement(35.0, 20.0, T, R, band), None);
        // cardinal still wins when clearly dominant
        assert_eq!(Direction::from_displacement(30.0, 0.0, T, R, band), Some(Direction::Right));
    }

    #[test]
    fn test_tokens_deserialize_lowercase() {
        let d: Direction = serde_json::from_str("\"downleft\"").unwrap();
        assert_eq!(d, Direction::DownLeft);
        assert_eq!(Direction::UpRight.to_string(), "upright");
        assert!(Direction::UpRight.is_diagonal());
        assert!(!Direction::Up.is_diagonal());
    }
}
