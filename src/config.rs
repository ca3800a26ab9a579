//! Run configuration.
//!
//! Loaded from a TOML file (`nixbreak.toml` by default). Workspace roots
//! are the scaling knob: the worker pool is sized to exactly their count.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::collector::DEFAULT_ARGUMENT_PROBABILITY;

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "nixbreak.toml";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no workspace roots configured")]
    NoWorkspaces,

    #[error("workspace root listed twice: {0:?}")]
    DuplicateWorkspace(PathBuf),

    #[error("argument_probability must be within [0, 1], got {0}")]
    BadProbability(f64),

    #[error("max_samples must be positive")]
    NoSamples,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub collection: CollectionSection,
    #[serde(default)]
    pub workspaces: WorkspacesSection,
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// SQLite database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// `[collection]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSection {
    /// How many candidates to draw per run.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Probability of the argument-deletion strategy per task.
    #[serde(default = "default_argument_probability")]
    pub argument_probability: f64,
    /// Optional deterministic seed for worker random streams.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `[workspaces]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WorkspacesSection {
    /// One exclusive checkout per worker slot.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("corpus.db")
}

fn default_max_samples() -> usize {
    3000
}

fn default_argument_probability() -> f64 {
    DEFAULT_ARGUMENT_PROBABILITY
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            path: default_store_path(),
        }
    }
}

impl Default for CollectionSection {
    fn default() -> Self {
        CollectionSection {
            max_samples: default_max_samples(),
            argument_probability: default_argument_probability(),
            seed: None,
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not touch the filesystem; path-level
    /// duplicate detection happens again at workspace open time against
    /// canonicalized roots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspaces.roots.is_empty() {
            return Err(ConfigError::NoWorkspaces);
        }
        for (index, root) in self.workspaces.roots.iter().enumerate() {
            if self.workspaces.roots[..index].contains(root) {
                return Err(ConfigError::DuplicateWorkspace(root.clone()));
            }
        }
        let probability = self.collection.argument_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::BadProbability(probability));
        }
        if self.collection.max_samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        Ok(())
    }
}
