//! Candidate enumeration over the package universe.
//!
//! The bulk `nix-env` query is expensive (minutes, gigabytes of RAM), so
//! its raw JSON output is cached in the record store keyed by the pinned
//! revision. Parsing filters the listing down to packages carrying
//! everything a sample needs: name, platform, and a source position.

use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::revision::Revision;
use crate::store::{SqliteStore, StoreError};
use crate::workspace::Workspace;

/// The external enumeration executable.
pub const NIX_ENV: &str = "nix-env";

/// One recipe selected for mutation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUnit {
    /// Attribute path selecting the package, e.g. `python3Packages.requests`.
    pub attr: String,
    /// Package name.
    pub pname: String,
    /// Target platform, e.g. `x86_64-linux`.
    pub system: String,
    /// Recipe file, relative to the workspace root.
    pub file: PathBuf,
    /// Line within the recipe file.
    pub line: u32,
}

/// Errors from enumeration and candidate resolution.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("failed to run nix-env: {0}")]
    Spawn(#[source] io::Error),

    #[error("nix-env exited with {code:?}: {stderr}")]
    QueryFailed { code: Option<i32>, stderr: String },

    #[error("unparseable package listing: {0}")]
    BadListing(#[from] serde_json::Error),

    #[error("package {attr} has an unparseable position: {position}")]
    BadPosition { attr: String, position: String },

    #[error("package {attr} points outside the workspace: {file:?}")]
    OutsideWorkspace { attr: String, file: PathBuf },

    #[error("package {attr} points at a missing file: {file:?}")]
    MissingFile { attr: String, file: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
struct ListedPackage {
    #[serde(default)]
    pname: Option<String>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    meta: Option<ListedMeta>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListedMeta {
    #[serde(default)]
    position: Option<String>,
}

/// One usable entry from the listing.
#[derive(Debug, Clone)]
pub struct ListedCandidate {
    pub attr: String,
    pub pname: String,
    pub system: String,
    /// Raw `file:line` position string.
    pub position: String,
}

/// The filtered package listing.
#[derive(Debug, Clone)]
pub struct PackageListing {
    entries: Vec<ListedCandidate>,
}

impl PackageListing {
    /// Parse the raw `nix-env` JSON and keep only entries with complete
    /// metadata.
    pub fn parse(raw: &str) -> Result<Self, CandidateError> {
        let listed: std::collections::BTreeMap<String, ListedPackage> =
            serde_json::from_str(raw)?;
        let total = listed.len();

        let mut entries = Vec::new();
        for (attr, package) in listed {
            let (Some(pname), Some(system)) = (package.pname, package.system) else {
                continue;
            };
            let Some(position) = package.meta.and_then(|meta| meta.position) else {
                continue;
            };
            entries.push(ListedCandidate {
                attr,
                pname,
                system,
                position,
            });
        }

        info!(
            total,
            usable = entries.len(),
            "parsed package listing"
        );
        Ok(PackageListing { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw one entry uniformly at random (with replacement across calls).
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<&ListedCandidate> {
        if self.entries.is_empty() {
            return None;
        }
        Some(&self.entries[rng.gen_range(0..self.entries.len())])
    }
}

/// Resolve a listed entry into a [`CandidateUnit`] against a workspace.
///
/// The position must parse as `file:line`, the file must sit inside the
/// workspace, and it must exist on disk.
pub fn resolve(
    workspace: &Workspace,
    listed: &ListedCandidate,
) -> Result<CandidateUnit, CandidateError> {
    let bad_position = || CandidateError::BadPosition {
        attr: listed.attr.clone(),
        position: listed.position.clone(),
    };
    let (file, line) = listed.position.rsplit_once(':').ok_or_else(bad_position)?;
    let line: u32 = line.parse().map_err(|_| bad_position())?;

    let absolute = Path::new(file);
    let relative = absolute
        .strip_prefix(workspace.root())
        .map_err(|_| CandidateError::OutsideWorkspace {
            attr: listed.attr.clone(),
            file: absolute.to_path_buf(),
        })?
        .to_path_buf();
    if !workspace.root().join(&relative).is_file() {
        return Err(CandidateError::MissingFile {
            attr: listed.attr.clone(),
            file: relative,
        });
    }

    Ok(CandidateUnit {
        attr: listed.attr.clone(),
        pname: listed.pname.clone(),
        system: listed.system.clone(),
        file: relative,
        line,
    })
}

/// Run the bulk enumeration query against a workspace.
///
/// The nixpkgs config override pins alias/overlay discovery so the
/// listing depends on the checkout alone.
pub fn query_listing(workspace: &Workspace) -> Result<String, CandidateError> {
    let output = std::process::Command::new(NIX_ENV)
        .args([
            "--query",
            "--available",
            "--attr-path",
            "--out-path",
            "--meta",
            "--json",
            "--arg",
            "config",
            "{ allowAliases = false; }",
            "--arg",
            "overlays",
            "[ ]",
            "--file",
        ])
        .arg(workspace.root())
        .output()
        .map_err(CandidateError::Spawn)?;
    if !output.status.success() {
        return Err(CandidateError::QueryFailed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fetch the raw listing for `revision`, serving from the cache when warm
/// and populating it on a miss.
///
/// Redundant population by concurrent callers just inserts an equivalent
/// row; reads take the first.
pub fn cached_listing(
    store: &mut SqliteStore,
    revision: Revision,
    workspace: &Workspace,
) -> Result<String, CandidateError> {
    if let Some(listing) = store.read_cache(revision)? {
        info!(%revision, "package listing served from cache");
        return Ok(listing);
    }
    info!(%revision, "enumerating all packages, this takes a while and a lot of RAM");
    let listing = query_listing(workspace)?;
    store.write_cache(revision, &listing)?;
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    fn listing_json(position: &str) -> String {
        format!(
            r#"{{
                "complete": {{
                    "pname": "demo",
                    "system": "x86_64-linux",
                    "meta": {{ "position": {} }}
                }},
                "no-position": {{
                    "pname": "bare",
                    "system": "x86_64-linux",
                    "meta": {{ }}
                }},
                "no-meta": {{ "pname": "bare2", "system": "x86_64-linux" }},
                "no-system": {{ "pname": "odd", "meta": {{ "position": "x:1" }} }}
            }}"#,
            serde_json::to_string(position).unwrap()
        )
    }

    #[test]
    fn test_parse_filters_incomplete_entries() {
        let listing = PackageListing::parse(&listing_json("/src/pkg.nix:12")).unwrap();
        assert_eq!(listing.len(), 1);
        let entry = listing.pick(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(entry.attr, "complete");
        assert_eq!(entry.pname, "demo");
        assert_eq!(entry.position, "/src/pkg.nix:12");
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            PackageListing::parse("not json"),
            Err(CandidateError::BadListing(_))
        ));
    }

    #[test]
    fn test_pick_on_empty_listing() {
        let listing = PackageListing::parse("{}").unwrap();
        assert!(listing.pick(&mut StdRng::seed_from_u64(0)).is_none());
    }

    fn workspace_with_recipe() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("pkgs")).unwrap();
        fs::write(dir.path().join("pkgs/demo.nix"), "{ }: null\n").unwrap();
        let workspace = Workspace::open(dir.path(), 0).unwrap();
        (dir, workspace)
    }

    fn listed(position: String) -> ListedCandidate {
        ListedCandidate {
            attr: "demo".to_string(),
            pname: "demo".to_string(),
            system: "x86_64-linux".to_string(),
            position,
        }
    }

    #[test]
    fn test_resolve_complete_candidate() {
        let (_dir, workspace) = workspace_with_recipe();
        let position = format!("{}/pkgs/demo.nix:7", workspace.root().display());
        let candidate = resolve(&workspace, &listed(position)).unwrap();
        assert_eq!(candidate.file, PathBuf::from("pkgs/demo.nix"));
        assert_eq!(candidate.line, 7);
    }

    #[test]
    fn test_resolve_rejects_position_without_line() {
        let (_dir, workspace) = workspace_with_recipe();
        let position = format!("{}/pkgs/demo.nix", workspace.root().display());
        assert!(matches!(
            resolve(&workspace, &listed(position)),
            Err(CandidateError::BadPosition { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_file_outside_workspace() {
        let (_dir, workspace) = workspace_with_recipe();
        assert!(matches!(
            resolve(&workspace, &listed("/elsewhere/pkg.nix:3".to_string())),
            Err(CandidateError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_missing_file() {
        let (_dir, workspace) = workspace_with_recipe();
        let position = format!("{}/pkgs/gone.nix:3", workspace.root().display());
        assert!(matches!(
            resolve(&workspace, &listed(position)),
            Err(CandidateError::MissingFile { .. })
        ));
    }
}
