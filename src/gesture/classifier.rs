use serde::{Deserialize, Serialize};

use super::direction::Direction;
use super::history::History;
use crate::config::GestureConfig;
use crate::vision::Point;

/// Two-stroke gesture mapped to a spell name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GesturePattern {
    pub first: Direction,
    pub second: Direction,
    pub spell: String,
}

impl GesturePattern {
    pub fn new(first: Direction, second: Direction, spell: &str) -> Self {
        Self {
            first,
            second,
            spell: spell.to_string(),
        }
    }
}

/// Turns per-frame point motion into spell names.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    movement_threshold: f32,
    dominance_ratio: f32,
    diagonal_band: Option<f32>,
    patterns: Vec<GesturePattern>,
}

impl GestureClassifier {
    pub fn new(
        movement_threshold: f32,
        dominance_ratio: f32,
        diagonal_band: Option<f32>,
        patterns: Vec<GesturePattern>,
    ) -> Self {
        Self {
            movement_threshold,
            dominance_ratio,
            diagonal_band,
            patterns,
        }
    }

    pub fn from_config(config: &GestureConfig) -> Self {
        Self::new(
            config.movement_threshold,
            config.dominance_ratio,
            config.diagonals.then_some(config.diagonal_band),
            config.patterns.clone(),
        )
    }

    pub fn direction(&self, new: Point, old: Point) -> Option<Direction> {
        let dx = new.x - old.x;
        let dy = new.y - old.y;
        Direction::from_displacement(
            dx,
            dy,
            self.movement_threshold,
            self.dominance_ratio,
            self.diagonal_band,
        )
    }

    /// First configured pattern present in `history`.
    pub fn match_pattern(&self, history: &History) -> Option<&GesturePattern> {
        self.patterns
            .iter()
            .find(|p| history.contains_pair(p.first, p.second))
    }

    /// Fold one frame of motion into `history` and report at most one spell.
    ///
    /// A matched history is cleared, so a gesture held across frames casts once.
    pub fn classify(&self, new: Point, old: Point, history: &mut History) -> Option<&str> {
        if let Some(d) = self.direction(new, old) {
            history.push(d);
        }
        let pattern = self.match_pattern(history)?;
        tracing::debug!(history = %history, spell = %pattern.spell, "gesture matched");
        history.clear();
        Some(pattern.spell.as_str())
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::from_config(&GestureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_right_then_up_casts_lumos() {
        let c = GestureClassifier::default();
        let mut h = History::new();
        assert_eq!(c.classify(p(130.0, 100.0), p(100.0, 100.0), &mut h), None);
        assert_eq!(h.tokens(), &[Right]);
        assert_eq!(c.classify(p(130.0, 130.0), p(130.0, 100.0), &mut h), Some("lumos"));
        assert!(h.is_empty(), "matched history should be cleared");
    }

    #[test]
    fn test_held_motion_does_not_repeat() {
        let c = GestureClassifier::default();
        let mut h = History::new();
        let mut x = 0.0;
        for _ in 0..5 {
            assert_eq!(c.classify(p(x + 10.0, 0.0), p(x, 0.0), &mut h), None);
            x += 10.0;
        }
        assert_eq!(h.tokens(), &[Right]);
    }

    #[test]
    fn test_first_match_wins() {
        let c = GestureClassifier::default();
        let h = History::from_tokens([Right, Up, Down]);
        let matched = c.match_pattern(&h).unwrap();
        assert_eq!(matched.spell, "lumos");
    }

    #[test]
    fn test_pattern_order_decides() {
        let c = GestureClassifier::new(
            5.0,
            2.0,
            None,
            vec![
                GesturePattern::new(Up, Down, "nox"),
                GesturePattern::new(Right, Up, "lumos"),
            ],
        );
        let h = History::from_tokens([Right, Up, Down]);
        assert_eq!(c.match_pattern(&h).unwrap().spell, "nox");
    }

    #[test]
    fn test_no_motion_keeps_history() {
        let c = GestureClassifier::default();
        let mut h = History::from_tokens([Left]);
        assert_eq!(c.classify(p(1.0, 1.0), p(0.0, 0.0), &mut h), None);
        assert_eq!(h.tokens(), &[Left]);
    }

    #[test]
    fn test_default_patterns() {
        let c = GestureClassifier::default();
        let cases = [
            ([Right, Down], "nox"),
            ([Left, Down], "colovaria"),
            ([Left, Up], "incendio"),
        ];
        for (tokens, spell) in cases {
            let h = History::from_tokens(tokens);
            assert_eq!(c.match_pattern(&h).unwrap().spell, spell);
        }
    }

    #[test]
    fn test_diagonal_pattern() {
        let c = GestureClassifier::new(
            5.0,
            2.0,
            Some(1.5),
            vec![GesturePattern::new(UpRight, DownRight, "colovaria")],
        );
        let mut h = History::new();
        assert_eq!(c.classify(p(20.0, 20.0), p(0.0, 0.0), &mut h), None);
        assert_eq!(c.classify(p(40.0, 0.0), p(20.0, 20.0), &mut h), Some("colovaria"));
    }
}
