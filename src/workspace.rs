//! Per-job scratch directories.
//!
//! Every job gets its own freshly created directory under the scratch root.
//! [`Workspace::release`] consumes the handle, so a workspace is removed at
//! most once; a handle dropped without being released (early return, panic)
//! still removes its directory on drop.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::ResourceError;

/// Hands out workspaces under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty, uniquely named directory for `job_id`.
    pub async fn acquire(&self, job_id: &str) -> Result<Workspace, ResourceError> {
        let root = self.root.clone();
        let prefix = format!("overlay-{job_id}-");

        let created = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(|e| ResourceError::Create {
            root: self.root.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;

        let dir = created.map_err(|source| ResourceError::Create {
            root: self.root.clone(),
            source,
        })?;

        debug!(path = %dir.path().display(), "Workspace created");
        Ok(Workspace {
            path: dir.path().to_path_buf(),
            dir,
        })
    }
}

/// An exclusively owned scratch directory.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the directory.
    ///
    /// The error is for logging only; it must never replace a job's outcome.
    pub async fn release(self) -> Result<(), ResourceError> {
        let Workspace { path, dir } = self;

        let removed = tokio::task::spawn_blocking(move || dir.close()).await;
        match removed {
            Ok(Ok(())) => {
                debug!(path = %path.display(), "Workspace removed");
                Ok(())
            }
            Ok(Err(source)) => Err(ResourceError::Remove { path, source }),
            Err(e) => Err(ResourceError::CleanupTask {
                path,
                message: e.to_string(),
            }),
        }
    }
}
