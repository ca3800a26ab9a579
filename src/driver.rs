//! The build driver.
//!
//! One candidate, one workspace, one authoritative `nix-build` run. The
//! environment is cleared down to the inherited executable search path so
//! user configuration cannot leak into the build; unfree licensing is
//! allowed explicitly so policy never masks buildability. Transient
//! failures are ordinary failures; no retry lives at this layer, and no
//! timeout, since a build may legitimately run for hours.

use std::env;
use std::io;
use std::process::Command;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::candidates::CandidateUnit;
use crate::workspace::Workspace;

/// The external build executable.
pub const NIX_BUILD: &str = "nix-build";

/// Errors starting the build tool. A build that runs and fails is not an
/// error here; it is a [`BuildOutcome`] with a non-zero exit.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to run nix-build: {0}")]
    Spawn(#[source] io::Error),
}

/// Captured result of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Exit code; `None` when the process died to a signal.
    pub exit: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.exit == Some(0)
    }
}

/// The seam between the collector and the external build tool.
pub trait BuildRunner {
    fn build(
        &self,
        workspace: &Workspace,
        candidate: &CandidateUnit,
    ) -> Result<BuildOutcome, DriverError>;
}

/// Builds the candidate attribute with `nix-build` inside the workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixBuildRunner;

impl BuildRunner for NixBuildRunner {
    fn build(
        &self,
        workspace: &Workspace,
        candidate: &CandidateUnit,
    ) -> Result<BuildOutcome, DriverError> {
        let mut command = Command::new(NIX_BUILD);
        command
            .args([
                "--no-out-link",
                "--log-format",
                "internal-json",
                "-A",
                &candidate.attr,
            ])
            .current_dir(workspace.root())
            .env_clear();
        if let Some(path) = env::var_os("PATH") {
            command.env("PATH", path);
        }
        command.env("NO_COLOR", "1");
        command.env("NIXPKGS_ALLOW_UNFREE", "1");

        let started = Instant::now();
        let output = command.output().map_err(DriverError::Spawn)?;
        let duration = started.elapsed();

        Ok(BuildOutcome {
            exit: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}
