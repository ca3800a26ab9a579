//! Exclusive workspace handles.
//!
//! A workspace is one git checkout of the package tree, owned by exactly
//! one worker slot for the lifetime of a run. All mutation happens inside
//! a workspace, so the handle carries the reset and revision primitives
//! and the recipe read/write paths; nothing else in the crate touches the
//! checkout directly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::revision::{Revision, RevisionError};

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace root is not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("duplicate workspace root: {0:?}")]
    Duplicate(PathBuf),

    #[error("no workspaces configured")]
    Empty,

    #[error("failed to run git {args:?} in {root:?}: {source}")]
    GitSpawn {
        args: Vec<String>,
        root: PathBuf,
        source: io::Error,
    },

    #[error("git {args:?} in {root:?} failed: {stderr}")]
    GitFailed {
        args: Vec<String>,
        root: PathBuf,
        stderr: String,
    },

    #[error("unparseable revision in {root:?}: {source}")]
    BadRevision {
        root: PathBuf,
        source: RevisionError,
    },

    #[error("workspaces are not pinned to one revision: {first_root:?} is on {first}, {other_root:?} is on {other}")]
    RevisionMismatch {
        first_root: PathBuf,
        first: Revision,
        other_root: PathBuf,
        other: Revision,
    },

    #[error("recipe path {path:?} in {root:?}: {source}")]
    Recipe {
        root: PathBuf,
        path: PathBuf,
        source: io::Error,
    },
}

/// An exclusive checkout bound to one worker slot.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    slot: usize,
}

impl Workspace {
    /// Open a single workspace rooted at `root` for worker `slot`.
    pub fn open(root: impl Into<PathBuf>, slot: usize) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let root = root
            .canonicalize()
            .map_err(|_| WorkspaceError::NotADirectory(root.clone()))?;
        if !root.is_dir() {
            return Err(WorkspaceError::NotADirectory(root));
        }
        Ok(Workspace { root, slot })
    }

    /// Open one workspace per configured root, slots assigned in order.
    ///
    /// Two roots resolving to the same directory would hand one checkout
    /// to two workers, so duplicates are rejected here.
    pub fn open_all(
        roots: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        let mut workspaces: Vec<Workspace> = Vec::new();
        for (slot, root) in roots.into_iter().enumerate() {
            let workspace = Workspace::open(root, slot)?;
            if workspaces.iter().any(|w| w.root == workspace.root) {
                return Err(WorkspaceError::Duplicate(workspace.root));
            }
            workspaces.push(workspace);
        }
        if workspaces.is_empty() {
            return Err(WorkspaceError::Empty);
        }
        Ok(workspaces)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Force the checkout back to a clean state: stage everything, then
    /// hard-reset tracked content. Must precede every task.
    pub fn reset(&self) -> Result<(), WorkspaceError> {
        self.git(&["add", "--all"])?;
        self.git(&["reset", "--hard"])?;
        Ok(())
    }

    /// Read the commit the checkout is pinned to.
    pub fn revision(&self) -> Result<Revision, WorkspaceError> {
        let stdout = self.git(&["rev-parse", "--verify", "HEAD^{commit}"])?;
        stdout
            .trim()
            .parse()
            .map_err(|source| WorkspaceError::BadRevision {
                root: self.root.clone(),
                source,
            })
    }

    /// Read a recipe file at a workspace-relative path.
    pub fn read_recipe(&self, path: &Path) -> Result<String, WorkspaceError> {
        fs::read_to_string(self.root.join(path)).map_err(|source| WorkspaceError::Recipe {
            root: self.root.clone(),
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overwrite a recipe file at a workspace-relative path.
    pub fn write_recipe(&self, path: &Path, text: &str) -> Result<(), WorkspaceError> {
        fs::write(self.root.join(path), text).map_err(|source| WorkspaceError::Recipe {
            root: self.root.clone(),
            path: path.to_path_buf(),
            source,
        })
    }

    fn git(&self, args: &[&str]) -> Result<String, WorkspaceError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| WorkspaceError::GitSpawn {
                args: args.iter().map(|s| s.to_string()).collect(),
                root: self.root.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(WorkspaceError::GitFailed {
                args: args.iter().map(|s| s.to_string()).collect(),
                root: self.root.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Startup check: every workspace must be pinned to the identical
/// revision. Returns that revision, or the first mismatch as a hard
/// error; a run spanning two revisions would mislabel every sample.
pub fn ensure_synchronized(workspaces: &[Workspace]) -> Result<Revision, WorkspaceError> {
    let first = workspaces.first().ok_or(WorkspaceError::Empty)?;
    let pinned = first.revision()?;
    for other in &workspaces[1..] {
        let revision = other.revision()?;
        if revision != pinned {
            return Err(WorkspaceError::RevisionMismatch {
                first_root: first.root.clone(),
                first: pinned,
                other_root: other.root.clone(),
                other: revision,
            });
        }
    }
    Ok(pinned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_in(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git_in(dir, &["init", "--quiet"]);
        fs::write(dir.join("default.nix"), "{ }: null\n").unwrap();
        git_in(dir, &["add", "--all"]);
        git_in(
            dir,
            &[
                "-c",
                "user.name=test",
                "-c",
                "user.email=test@example.invalid",
                "commit",
                "--quiet",
                "-m",
                "seed",
            ],
        );
    }

    #[test]
    fn test_reset_discards_stray_edits() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let workspace = Workspace::open(dir.path(), 0).unwrap();

        let recipe = Path::new("default.nix");
        workspace.write_recipe(recipe, "{ }: broken\n").unwrap();
        fs::write(dir.path().join("untracked.nix"), "stray").unwrap();

        workspace.reset().unwrap();
        assert_eq!(workspace.read_recipe(recipe).unwrap(), "{ }: null\n");
        assert!(!dir.path().join("untracked.nix").exists());
    }

    #[test]
    fn test_revision_is_forty_hex() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let workspace = Workspace::open(dir.path(), 0).unwrap();
        let revision = workspace.revision().unwrap();
        assert_eq!(revision.to_hex().len(), 40);
    }

    #[test]
    fn test_open_all_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let roots = vec![dir.path().to_path_buf(), dir.path().to_path_buf()];
        assert!(matches!(
            Workspace::open_all(roots),
            Err(WorkspaceError::Duplicate(_))
        ));
    }

    #[test]
    fn test_open_all_rejects_empty() {
        assert!(matches!(
            Workspace::open_all(Vec::new()),
            Err(WorkspaceError::Empty)
        ));
    }

    #[test]
    fn test_ensure_synchronized_accepts_matching_checkouts() {
        let a = TempDir::new().unwrap();
        init_repo(a.path());
        let workspaces = vec![Workspace::open(a.path(), 0).unwrap()];
        let pinned = ensure_synchronized(&workspaces).unwrap();
        assert_eq!(pinned, workspaces[0].revision().unwrap());
    }

    #[test]
    fn test_ensure_synchronized_rejects_mismatch() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        init_repo(a.path());
        init_repo(b.path());
        // Advance b by one commit so the two checkouts cannot agree.
        fs::write(b.path().join("default.nix"), "{ }: true\n").unwrap();
        git_in(b.path(), &["add", "--all"]);
        git_in(
            b.path(),
            &[
                "-c",
                "user.name=test",
                "-c",
                "user.email=test@example.invalid",
                "commit",
                "--quiet",
                "-m",
                "advance",
            ],
        );
        let workspaces = vec![
            Workspace::open(a.path(), 0).unwrap(),
            Workspace::open(b.path(), 1).unwrap(),
        ];
        assert!(matches!(
            ensure_synchronized(&workspaces),
            Err(WorkspaceError::RevisionMismatch { .. })
        ));
    }
}
