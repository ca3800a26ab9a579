//! nixbreak builds a labeled corpus of (broken recipe, build error)
//! pairs by deliberately corrupting working Nix packages.
//!
//! A run pins a set of exclusive nixpkgs checkouts to one revision,
//! enumerates the package universe (cached per revision), then drives a
//! worker pool: each worker resets its checkout, proves the candidate
//! still builds, applies one corruption strategy from
//! [`nixbreak_mutate`], rebuilds, and extracts the single error message
//! with [`nixbreak_extract`]. Every outcome, including a mutation that
//! failed to break anything, lands as one immutable sample in the
//! SQLite store.

pub mod candidates;
pub mod collector;
pub mod config;
pub mod driver;
pub mod pool;
pub mod revision;
pub mod sample;
pub mod store;
pub mod workspace;

pub use candidates::CandidateUnit;
pub use collector::{SampleCollector, TaskError};
pub use config::Config;
pub use driver::{BuildOutcome, BuildRunner, NixBuildRunner};
pub use pool::PoolReport;
pub use revision::Revision;
pub use sample::Sample;
pub use store::SqliteStore;
pub use workspace::Workspace;
