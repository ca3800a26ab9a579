//! Corruption strategies for Nix package recipes.
//!
//! Each strategy takes a working recipe and produces a deliberately broken
//! variant. The strategies operate on superficial textual structure only:
//! there is no Nix parser here, and the output is not guaranteed to be
//! syntactically valid, only to be a recorded corruption attempt.
//!
//! All randomness flows through an injected [`rand::Rng`] so callers can
//! force deterministic behavior in tests.

mod argument_deletion;
mod line_deletion;

pub use argument_deletion::PROTECTED_NAMES;
pub use line_deletion::PROTECTED_MARKERS;

use rand::Rng;
use thiserror::Error;

/// The corruption strategy applied to a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Delete one uniformly random, non-protected line.
    LineDeletion,
    /// Delete one declared function argument and its uses.
    ArgumentDeletion,
}

impl Strategy {
    /// Stable numeric id recorded with every sample.
    pub fn id(self) -> u8 {
        match self {
            Strategy::LineDeletion => 1,
            Strategy::ArgumentDeletion => 2,
        }
    }

    /// Inverse of [`Strategy::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Strategy::LineDeletion),
            2 => Some(Strategy::ArgumentDeletion),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::LineDeletion => write!(f, "line-deletion"),
            Strategy::ArgumentDeletion => write!(f, "argument-deletion"),
        }
    }
}

/// A completed corruption attempt.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Which strategy produced this mutation.
    pub strategy: Strategy,
    /// The recipe text before corruption.
    pub original: String,
    /// The recipe text after corruption.
    pub mutated: String,
}

/// Errors from the mutation strategies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutateError {
    /// Line deletion exhausted its attempt budget without finding a
    /// deletable line.
    #[error("no deletable line found after {attempts} attempts")]
    NoMutationFound { attempts: usize },

    /// Argument deletion exhausted the declared-argument set without
    /// finding a name that survives the protected filter.
    #[error("no suitable dependency found for deletion")]
    NoSuitableDependency,

    /// The recipe has no `{ ... }` argument block to draw names from.
    #[error("recipe has no argument block between '{{' and '}}'")]
    MissingArgumentBlock,
}

/// Apply `strategy` to `source`, returning the corrupted variant.
///
/// Fails rather than returning unmutated text when no eligible target
/// exists; a successful result from [`Strategy::ArgumentDeletion`] may
/// still be textually unchanged when the chosen name appears nowhere
/// outside the argument block (the attempt itself is the product).
pub fn mutate<R: Rng>(
    strategy: Strategy,
    source: &str,
    rng: &mut R,
) -> Result<Mutation, MutateError> {
    let mutated = match strategy {
        Strategy::LineDeletion => line_deletion::execute(source, rng)?,
        Strategy::ArgumentDeletion => argument_deletion::execute(source, rng)?,
    };
    Ok(Mutation {
        strategy,
        original: source.to_string(),
        mutated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_strategy_id_round_trip() {
        for strategy in [Strategy::LineDeletion, Strategy::ArgumentDeletion] {
            assert_eq!(Strategy::from_id(strategy.id()), Some(strategy));
        }
        assert_eq!(Strategy::from_id(0), None);
        assert_eq!(Strategy::from_id(3), None);
    }

    #[test]
    fn test_mutate_records_original_and_strategy() {
        let source = "first\nsecond\nthird";
        let mut rng = StdRng::seed_from_u64(7);
        let mutation = mutate(Strategy::LineDeletion, source, &mut rng).unwrap();
        assert_eq!(mutation.strategy, Strategy::LineDeletion);
        assert_eq!(mutation.original, source);
        assert_ne!(mutation.mutated, source);
    }
}
