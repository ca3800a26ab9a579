//! The persisted training example.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nixbreak_mutate::Strategy;

use crate::candidates::CandidateUnit;
use crate::revision::Revision;

/// One (working recipe, broken recipe, outcome) record. Created once per
/// processed candidate, append-only thereafter.
#[derive(Debug, Clone)]
pub struct Sample {
    /// The candidate this sample was drawn from.
    pub candidate: CandidateUnit,
    /// Revision every workspace was pinned to.
    pub revision: Revision,
    /// The corruption strategy that was applied.
    pub strategy: Strategy,
    /// Recipe text before corruption.
    pub original: String,
    /// Recipe text after corruption.
    pub mutated: String,
    /// Raw build-tool output (stderr) of the mutated build.
    pub build_output: String,
    /// Extracted error message; `None` when the mutation failed to break
    /// the build (a first-class negative example, not a defect).
    pub error: Option<String>,
    /// Wall-clock duration of the mutated build.
    pub duration: Duration,
    /// When the sample was collected.
    pub created_at: DateTime<Utc>,
}

impl Sample {
    /// Whether the mutation actually broke the build.
    pub fn is_labeled(&self) -> bool {
        self.error.is_some()
    }
}
