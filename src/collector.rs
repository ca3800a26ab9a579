//! The per-task sample collector.
//!
//! One candidate runs through a fixed sequence: reset the workspace,
//! prove the recipe still builds, corrupt it, build again, and package
//! the result as a [`Sample`]. Any failure aborts the task; there are no
//! per-state retries, and a baseline that does not build is abandoned
//! outright rather than recorded with a synthetic error, because a sample
//! must attribute its failure to the injected mutation alone.

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use nixbreak_extract::{extract, DetailLogSource, ExtractError};
use nixbreak_mutate::{mutate, MutateError, Strategy};

use crate::candidates::CandidateUnit;
use crate::driver::{BuildRunner, DriverError};
use crate::revision::Revision;
use crate::sample::Sample;
use crate::workspace::{Workspace, WorkspaceError};

/// Default probability of choosing [`Strategy::ArgumentDeletion`]; the
/// remainder goes to the cheaper line-deletion strategy. The skew keeps
/// throughput high while still sampling argument-aware breakage often
/// enough to diversify error types.
pub const DEFAULT_ARGUMENT_PROBABILITY: f64 = 0.1;

/// Why a task was abandoned. Every variant converts to "skip, continue"
/// at the pool boundary.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The unmodified recipe does not build; the candidate cannot yield a
    /// sample attributable to a mutation.
    #[error("baseline build failed for {attr}")]
    BrokenBaseline { attr: String },

    #[error(transparent)]
    Mutate(#[from] MutateError),

    #[error("build driver: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Runs the reset -> baseline -> mutate -> rebuild sequence for single
/// candidates, generic over the build and detail-log seams.
pub struct SampleCollector<B, D> {
    runner: B,
    detail_logs: D,
    argument_probability: f64,
}

impl<B: BuildRunner, D: DetailLogSource> SampleCollector<B, D> {
    pub fn new(runner: B, detail_logs: D) -> Self {
        SampleCollector {
            runner,
            detail_logs,
            argument_probability: DEFAULT_ARGUMENT_PROBABILITY,
        }
    }

    /// Override the strategy skew (clamped to `[0, 1]` by the config
    /// layer, not here).
    pub fn with_argument_probability(mut self, probability: f64) -> Self {
        self.argument_probability = probability;
        self
    }

    fn choose_strategy<R: Rng>(&self, rng: &mut R) -> Strategy {
        if rng.gen::<f64>() < self.argument_probability {
            Strategy::ArgumentDeletion
        } else {
            Strategy::LineDeletion
        }
    }

    /// Process one candidate inside its bound workspace.
    pub fn collect<R: Rng>(
        &self,
        rng: &mut R,
        workspace: &Workspace,
        candidate: &CandidateUnit,
        revision: Revision,
    ) -> Result<Sample, TaskError> {
        workspace.reset()?;

        debug!(attr = %candidate.attr, "baseline build");
        let baseline = self.runner.build(workspace, candidate)?;
        if !baseline.success() {
            return Err(TaskError::BrokenBaseline {
                attr: candidate.attr.clone(),
            });
        }

        let original = workspace.read_recipe(&candidate.file)?;
        let strategy = self.choose_strategy(rng);
        let mutation = mutate(strategy, &original, rng)?;
        workspace.write_recipe(&candidate.file, &mutation.mutated)?;

        debug!(attr = %candidate.attr, %strategy, "mutated build");
        let outcome = self.runner.build(workspace, candidate)?;

        let error = if outcome.success() {
            info!(attr = %candidate.attr, %strategy, "mutation did not break the build");
            None
        } else {
            Some(extract(&outcome.stderr, &self.detail_logs)?)
        };

        Ok(Sample {
            candidate: candidate.clone(),
            revision,
            strategy,
            original: mutation.original,
            mutated: mutation.mutated,
            build_output: outcome.stderr,
            error,
            duration: outcome.duration,
            created_at: Utc::now(),
        })
    }
}
