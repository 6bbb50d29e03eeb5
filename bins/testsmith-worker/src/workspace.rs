/// Workspace Manager - Repository Materialization
///
/// **Core Responsibility:**
/// Turn a repository reference (clone URL or existing local path) into a
/// usable local directory, and own the cleanup policy for directories it
/// created.
///
/// **Rules:**
/// - An existing absolute path is used in place: no copy, never removed.
/// - Anything else is treated as a clone URL and cloned into a uniquely
///   named subdirectory of the scratch root.
/// - The scratch root is created once at construction, never inferred from
///   the environment at call time.
/// - A clone failure is the one error the pipeline maps to `failed_clone`.
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create scratch root {path}: {source}")]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("clone of '{reference}' failed: {source}")]
    CloneFailed {
        reference: String,
        source: git2::Error,
    },
}

/// A materialized repository.
#[derive(Debug)]
pub struct Workspace {
    pub path: PathBuf,
    /// HEAD commit id, when the directory is a git repository.
    pub commit: Option<String>,
    /// True when the manager cloned this directory and may remove it.
    pub ephemeral: bool,
}

pub struct WorkspaceManager {
    scratch_root: PathBuf,
}

impl WorkspaceManager {
    /// Create the manager and its scratch root.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let scratch_root = scratch_root.into();
        fs::create_dir_all(&scratch_root).map_err(|source| WorkspaceError::Scratch {
            path: scratch_root.clone(),
            source,
        })?;
        Ok(Self { scratch_root })
    }

    /// Materialize `reference` and return the workspace.
    pub fn acquire(&self, reference: &str) -> Result<Workspace, WorkspaceError> {
        let as_path = Path::new(reference);
        if as_path.is_absolute() && as_path.exists() {
            debug!(path = %as_path.display(), "using local path as workspace");
            return Ok(Workspace {
                path: as_path.to_path_buf(),
                commit: resolve_head(as_path),
                ephemeral: false,
            });
        }

        let dir = self
            .scratch_root
            .join(format!("repo-{}", Uuid::new_v4().simple()));
        debug!(reference, dir = %dir.display(), "cloning into scratch");

        match git2::Repository::clone(reference, &dir) {
            Ok(repo) => {
                let commit = repo
                    .head()
                    .ok()
                    .and_then(|head| head.peel_to_commit().ok())
                    .map(|c| c.id().to_string());
                Ok(Workspace {
                    path: dir,
                    commit,
                    ephemeral: true,
                })
            }
            Err(source) => {
                // A failed clone can leave a partial directory behind.
                if dir.exists() {
                    if let Err(e) = fs::remove_dir_all(&dir) {
                        warn!(dir = %dir.display(), error = %e, "could not remove partial clone");
                    }
                }
                Err(WorkspaceError::CloneFailed {
                    reference: reference.to_string(),
                    source,
                })
            }
        }
    }

    /// Remove an ephemeral workspace; local-path workspaces are left alone.
    pub fn cleanup(&self, workspace: &Workspace) {
        if !workspace.ephemeral {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&workspace.path) {
            warn!(
                path = %workspace.path.display(),
                error = %e,
                "failed to remove workspace"
            );
        }
    }
}

fn resolve_head(path: &Path) -> Option<String> {
    let repo = git2::Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    head.peel_to_commit().ok().map(|c| c.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (WorkspaceManager, TempDir) {
        let scratch = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();
        (manager, scratch)
    }

    /// Build a local git repository with one commit, usable as a file://
    /// clone source without touching the network.
    fn git_fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("module_math.py"), "def add(a, b):\n    return a + b\n")
            .unwrap();

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        dir
    }

    #[test]
    fn test_local_path_used_in_place() {
        let (manager, _scratch) = manager();
        let local = TempDir::new().unwrap();

        let ws = manager
            .acquire(local.path().to_str().unwrap())
            .unwrap();

        assert_eq!(ws.path, local.path());
        assert!(!ws.ephemeral);
        assert!(ws.commit.is_none());
    }

    #[test]
    fn test_clone_from_local_url() {
        let (manager, scratch) = manager();
        let source = git_fixture();
        let url = format!("file://{}", source.path().display());

        let ws = manager.acquire(&url).unwrap();

        assert!(ws.ephemeral);
        assert!(ws.path.starts_with(scratch.path()));
        assert!(ws.path.join("module_math.py").exists());
        assert!(ws.commit.is_some());
    }

    #[test]
    fn test_unique_workspace_per_acquire() {
        let (manager, _scratch) = manager();
        let source = git_fixture();
        let url = format!("file://{}", source.path().display());

        let first = manager.acquire(&url).unwrap();
        let second = manager.acquire(&url).unwrap();
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn test_bad_reference_is_clone_failure() {
        let (manager, _scratch) = manager();

        let err = manager.acquire("file:///definitely/not/a/repo").unwrap_err();
        assert!(matches!(err, WorkspaceError::CloneFailed { .. }));
    }

    #[test]
    fn test_missing_absolute_path_is_clone_failure() {
        let (manager, _scratch) = manager();

        // An absolute path that does not exist is not usable in place, so it
        // goes down the clone path and fails there.
        let err = manager.acquire("/no/such/checkout/anywhere").unwrap_err();
        assert!(matches!(err, WorkspaceError::CloneFailed { .. }));
    }

    #[test]
    fn test_cleanup_removes_only_ephemeral() {
        let (manager, _scratch) = manager();
        let source = git_fixture();
        let url = format!("file://{}", source.path().display());

        let cloned = manager.acquire(&url).unwrap();
        let cloned_path = cloned.path.clone();
        manager.cleanup(&cloned);
        assert!(!cloned_path.exists());

        let local = TempDir::new().unwrap();
        let in_place = manager.acquire(local.path().to_str().unwrap()).unwrap();
        manager.cleanup(&in_place);
        assert!(local.path().exists());
    }
}
