//! Named light actions and the engine that runs them.

pub mod animation;
pub mod color;
pub mod dispatcher;

use std::fmt;
use std::str::FromStr;

pub use animation::{Animator, CastOptions, Outcome};
pub use color::Rgb;
pub use dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spell {
    /// Fade in and hold
    Lumos,
    /// Fade out; every natural finish ends here
    Nox,
    /// Fire flicker
    Incendio,
    /// Color cycle
    Colovaria,
}

impl Spell {
    pub const ALL: [Spell; 4] = [Spell::Lumos, Spell::Nox, Spell::Incendio, Spell::Colovaria];

    /// Value written to the action token.
    pub fn name(self) -> &'static str {
        match self {
            Spell::Lumos => "lumos",
            Spell::Nox => "nox",
            Spell::Incendio => "incendio",
            Spell::Colovaria => "colovaria",
        }
    }
}

impl fmt::Display for Spell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown spell: {0}")]
pub struct UnknownSpell(pub String);

impl FromStr for Spell {
    type Err = UnknownSpell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Spell::ALL
            .into_iter()
            .find(|spell| spell.name() == name)
            .ok_or_else(|| UnknownSpell(s.to_string()))
    }
}
