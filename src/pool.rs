//! The fixed-size worker pool.
//!
//! Exactly one OS thread per workspace, the slot binding fixed at
//! startup. That static 1:1 mapping is the only thing preventing two
//! tasks from mutating the same checkout, so the pool never grows beyond
//! the workspace count. Candidates flow through a shared channel and are
//! picked up by whichever worker goes idle first; each worker runs one
//! task synchronously to completion, however long the build blocks.
//! There is no cancellation: a stuck build stalls its slot for the rest
//! of the run.
//!
//! Completed samples funnel back to the calling thread, which is the only
//! store writer. Per-task failures are logged and skipped; only a store
//! failure aborts the run.

use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, info_span, warn};

use nixbreak_extract::DetailLogSource;

use crate::candidates::CandidateUnit;
use crate::collector::SampleCollector;
use crate::driver::BuildRunner;
use crate::revision::Revision;
use crate::sample::Sample;
use crate::store::{SqliteStore, StoreError};
use crate::workspace::Workspace;

/// Counts for one completed collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    /// Candidates handed to the pool.
    pub total: usize,
    /// Samples appended to the store (including negative examples).
    pub stored: usize,
    /// Tasks abandoned by a per-task failure.
    pub abandoned: usize,
}

/// Run every candidate through the pool and append the resulting samples.
///
/// With `seed` set, worker `n` draws from a stream derived from
/// `seed + n`, making a single-worker run fully reproducible.
pub fn run<B, D>(
    collector: &SampleCollector<B, D>,
    workspaces: &[Workspace],
    revision: Revision,
    candidates: Vec<CandidateUnit>,
    store: &mut SqliteStore,
    seed: Option<u64>,
) -> Result<PoolReport, StoreError>
where
    B: BuildRunner + Sync,
    D: DetailLogSource + Sync,
{
    let total = candidates.len();
    let (task_tx, task_rx) = crossbeam_channel::unbounded::<CandidateUnit>();
    for candidate in candidates {
        if task_tx.send(candidate).is_err() {
            break;
        }
    }
    drop(task_tx);

    let (sample_tx, sample_rx) = crossbeam_channel::unbounded::<Sample>();
    let mut stored = 0usize;
    let mut append_error: Option<StoreError> = None;

    thread::scope(|scope| {
        for workspace in workspaces {
            let task_rx = task_rx.clone();
            let sample_tx = sample_tx.clone();
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(workspace.slot() as u64)),
                None => StdRng::from_entropy(),
            };
            scope.spawn(move || {
                for candidate in task_rx.iter() {
                    let span =
                        info_span!("task", slot = workspace.slot(), attr = %candidate.attr);
                    let _guard = span.enter();
                    match collector.collect(&mut rng, workspace, &candidate, revision) {
                        Ok(sample) => {
                            if sample_tx.send(sample).is_err() {
                                // Writer gone; nothing left to do.
                                return;
                            }
                        }
                        Err(err) => warn!(error = %err, "task abandoned"),
                    }
                }
            });
        }
        drop(sample_tx);
        drop(task_rx);

        for sample in sample_rx.iter() {
            match store.append(&sample) {
                Ok(id) => {
                    stored += 1;
                    info!(
                        id,
                        attr = %sample.candidate.attr,
                        labeled = sample.is_labeled(),
                        "sample stored"
                    );
                }
                Err(err) => {
                    append_error = Some(err);
                    break;
                }
            }
        }
    });

    if let Some(err) = append_error {
        return Err(err);
    }
    Ok(PoolReport {
        total,
        stored,
        abandoned: total - stored,
    })
}
