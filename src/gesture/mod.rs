//! Motion history and spell-gesture matching for tracked wand points.

pub mod classifier;
pub mod direction;
pub mod history;

pub use classifier::{GestureClassifier, GesturePattern};
pub use direction::Direction;
pub use history::History;
