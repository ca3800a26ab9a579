//! The fixed-width source-tree revision identifier.
//!
//! A 40-hex-character commit id encoded big-endian into 20 bytes. This is
//! the universal key: the enumeration cache and every persisted sample are
//! tied to the revision the workspaces were pinned to.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Byte width of a commit id.
pub const REVISION_LEN: usize = 20;

/// A source-tree commit identifier in binary form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Revision([u8; REVISION_LEN]);

/// Errors parsing a revision string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RevisionError {
    #[error("revision must be {expected} hex characters, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("revision is not valid hex: {0}")]
    BadHex(String),
}

impl Revision {
    /// Wrap raw bytes, e.g. read back from the record store.
    pub fn from_bytes(bytes: [u8; REVISION_LEN]) -> Self {
        Revision(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; REVISION_LEN] {
        &self.0
    }

    /// Lowercase 40-character hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Revision {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != REVISION_LEN * 2 {
            return Err(RevisionError::BadLength {
                expected: REVISION_LEN * 2,
                got: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| RevisionError::BadHex(e.to_string()))?;
        let mut fixed = [0u8; REVISION_LEN];
        fixed.copy_from_slice(&bytes);
        Ok(Revision(fixed))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.to_hex())
    }
}
