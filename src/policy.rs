//! Pluggable decision strategies for battle requests.
//!
//! A room session computes the legal [`Choice`]s for a request and asks a
//! [`DecisionPolicy`] to pick one. The shipped [`RandomPolicy`] picks
//! uniformly at random; smarter strategies implement the same trait.

use std::fmt;

use rand::seq::IndexedRandom;

use crate::error::{Result, ShowdownError};

/// One legal decision in a battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Choice {
    /// Use the move in 1-based `slot` of the active Pokémon.
    Move { slot: usize, id: String },
    /// Switch to the party member in 1-based `slot`.
    Switch { slot: usize, ident: String },
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { slot, .. } => write!(f, "move {slot}"),
            Self::Switch { slot, .. } => write!(f, "switch {slot}"),
        }
    }
}

/// Strategy that picks one decision out of the legal set.
///
/// Implementations are shared by every room session, so they must be
/// `Send + Sync`.
pub trait DecisionPolicy: Send + Sync + 'static {
    /// Pick exactly one member of `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ShowdownError::InvalidChoice`] when `options` is empty.
    fn choose(&self, options: &[Choice]) -> Result<Choice>;
}

/// Picks uniformly at random among the legal options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPolicy;

impl DecisionPolicy for RandomPolicy {
    fn choose(&self, options: &[Choice]) -> Result<Choice> {
        let mut rng = rand::rng();
        options
            .choose(&mut rng)
            .cloned()
            .ok_or(ShowdownError::InvalidChoice)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn moves(n: usize) -> Vec<Choice> {
        (1..=n)
            .map(|slot| Choice::Move {
                slot,
                id: format!("move{slot}"),
            })
            .collect()
    }

    #[test]
    fn random_policy_rejects_empty_set() {
        let err = RandomPolicy.choose(&[]).unwrap_err();
        assert!(matches!(err, ShowdownError::InvalidChoice));
    }

    #[test]
    fn random_policy_returns_a_member() {
        let options = moves(4);
        for _ in 0..200 {
            let picked = RandomPolicy.choose(&options).unwrap();
            assert!(options.contains(&picked));
        }
    }

    #[test]
    fn random_policy_single_option_is_deterministic() {
        let options = moves(1);
        assert_eq!(RandomPolicy.choose(&options).unwrap(), options[0]);
    }

    #[test]
    fn random_policy_is_roughly_uniform() {
        const TRIALS: usize = 12_000;
        let options = moves(4);
        let mut counts = [0usize; 4];
        for _ in 0..TRIALS {
            match RandomPolicy.choose(&options).unwrap() {
                Choice::Move { slot, .. } => counts[slot - 1] += 1,
                other => panic!("unexpected choice {other:?}"),
            }
        }
        // Expected 3000 each; a 20% band is far outside random variation.
        for count in counts {
            assert!((2400..=3600).contains(&count), "skewed counts: {counts:?}");
        }
    }

    #[test]
    fn choice_renders_command_argument() {
        let mv = Choice::Move {
            slot: 3,
            id: "surf".into(),
        };
        let sw = Choice::Switch {
            slot: 5,
            ident: "p1: Blissey".into(),
        };
        assert_eq!(mv.to_string(), "move 3");
        assert_eq!(sw.to_string(), "switch 5");
    }

    #[test]
    fn policy_is_object_safe() {
        let policy: Box<dyn DecisionPolicy> = Box::new(RandomPolicy);
        assert!(policy.choose(&moves(2)).is_ok());
    }
}
