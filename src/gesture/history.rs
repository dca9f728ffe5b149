use super::direction::Direction;

/// Ordered motion history of one tracked point.
///
/// Kept canonical: no two adjacent entries are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    tokens: Vec<Direction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a canonical history from raw tokens.
    pub fn from_tokens<I: IntoIterator<Item = Direction>>(tokens: I) -> Self {
        let raw: Vec<Direction> = tokens.into_iter().collect();
        Self {
            tokens: canonicalize(&raw),
        }
    }

    /// Append a token, collapsing it into a run of the same direction.
    pub fn push(&mut self, direction: Direction) {
        if self.tokens.last() != Some(&direction) {
            self.tokens.push(direction);
        }
    }

    pub fn tokens(&self) -> &[Direction] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// True if `first` is immediately followed by `second` anywhere.
    pub fn contains_pair(&self, first: Direction, second: Direction) -> bool {
        self.tokens.windows(2).any(|w| w[0] == first && w[1] == second)
    }
}

/// Collapse every run of identical adjacent tokens to one occurrence.
pub fn canonicalize(tokens: &[Direction]) -> Vec<Direction> {
    let mut out: Vec<Direction> = Vec::with_capacity(tokens.len());
    for &d in tokens {
        if out.last() != Some(&d) {
            out.push(d);
        }
    }
    out
}

impl std::fmt::Display for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for d in &self.tokens {
            f.write_str(d.token())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    #[test]
    fn test_canonicalize_collapses_runs() {
        let raw = [Right, Right, Right, Up];
        assert_eq!(canonicalize(&raw), vec![Right, Up]);
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let samples: [&[Direction]; 4] = [
            &[Right, Right, Right, Up],
            &[Right, Up],
            &[Left, Left, Down, Down, Left, Up, Up],
            &[],
        ];
        for raw in samples {
            let once = canonicalize(raw);
            let twice = canonicalize(&once);
            assert_eq!(once, twice, "raw={raw:?}");
        }
    }

    #[test]
    fn test_push_keeps_history_canonical() {
        let mut h = History::new();
        for d in [Right, Right, Right, Up, Up] {
            h.push(d);
        }
        assert_eq!(h.tokens(), &[Right, Up]);
        assert_eq!(h.to_string(), "rightup");
    }

    #[test]
    fn test_non_adjacent_repeats_are_kept() {
        let h = History::from_tokens([Right, Up, Right]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_contains_pair_is_ordered() {
        let h = History::from_tokens([Left, Right, Up]);
        assert!(h.contains_pair(Right, Up));
        assert!(!h.contains_pair(Up, Right));
        assert!(!h.contains_pair(Left, Up));
    }

    #[test]
    fn test_history_rebuild_is_idempotent() {
        let raw = [Left, Left, Down, Down, Left, Up, Up];
        let mut pushed = History::new();
        for d in raw {
            pushed.push(d);
        }
        let built = History::from_tokens(raw);
        assert_eq!(pushed, built);

        let rebuilt = History::from_tokens(built.tokens().iter().copied());
        assert_eq!(rebuilt, built);
        assert_eq!(rebuilt.tokens(), canonicalize(&raw).as_slice());
    }
}
