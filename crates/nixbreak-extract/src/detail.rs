//! Detail-log retrieval.
//!
//! When a top-level error message only points at a derivation log, the
//! extractor swaps the pointer for the full log text. Retrieval goes
//! through a trait so tests never have to shell out.

use std::io;
use std::process::Command;

/// Maps a derivation-log location to its full text.
pub trait DetailLogSource {
    fn fetch(&self, location: &str) -> io::Result<String>;
}

/// Fetches detail logs by running `nix log <location>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixLogCli;

impl DetailLogSource for NixLogCli {
    fn fetch(&self, location: &str) -> io::Result<String> {
        let output = Command::new("nix").args(["log", location]).output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "nix log exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
