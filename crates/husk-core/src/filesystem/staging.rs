//! Scoped staging directory that becomes the child's root filesystem.
//!
//! A [`StagingRoot`] is created empty at the start of a launch and
//! released when it goes out of scope, on success and on every error path.
//! With [`CleanupPolicy::Keep`] the directory is left behind instead and its
//! path is logged.

use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use husk_common::constants::STAGING_PREFIX;
use husk_common::error::{HuskError, Result};
use husk_common::types::CleanupPolicy;
use tempfile::TempDir;

/// Exclusively owned root directory for one launch.
#[derive(Debug)]
pub struct StagingRoot {
    dir: Option<TempDir>,
    path: PathBuf,
    policy: CleanupPolicy,
}

impl StagingRoot {
    /// Creates a fresh, empty staging root.
    ///
    /// The directory is created under `parent`, or the system temp
    /// directory when `parent` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(parent: Option<&Path>, policy: CleanupPolicy) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        let _ = builder.prefix(STAGING_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| HuskError::io(parent, e))?;
                builder.tempdir_in(parent).map_err(|e| HuskError::io(parent, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| HuskError::io(std::env::temp_dir(), e))?,
        };
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), %policy, "staging root created");
        Ok(Self {
            dir: Some(dir),
            path,
            policy,
        })
    }

    /// Host path of the staging root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maps a path as seen inside the root onto the host.
    ///
    /// Root and `.` components are dropped and `..` never climbs above the
    /// staging root, mirroring how the kernel resolves `..` at `/`.
    #[must_use]
    pub fn host_path(&self, in_root: impl AsRef<Path>) -> PathBuf {
        let mut host = self.path.clone();
        let mut depth = 0usize;
        for component in in_root.as_ref().components() {
            match component {
                Component::Normal(part) => {
                    host.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    let _ = host.pop();
                    depth -= 1;
                }
                Component::ParentDir
                | Component::RootDir
                | Component::CurDir
                | Component::Prefix(_) => {}
            }
        }
        host
    }

    /// Releases the staging root according to its policy.
    ///
    /// Returns the retained path under [`CleanupPolicy::Keep`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be removed.
    pub fn release(mut self) -> Result<Option<PathBuf>> {
        self.finish()
    }

    /// Applies the policy once; later calls are no-ops.
    fn finish(&mut self) -> Result<Option<PathBuf>> {
        let Some(dir) = self.dir.take() else {
            return Ok(None);
        };
        let path = dir.keep();
        match self.policy {
            CleanupPolicy::Keep => {
                tracing::info!(path = %path.display(), "staging root kept");
                Ok(Some(path))
            }
            CleanupPolicy::Remove => {
                remove_tree(&path)?;
                tracing::debug!(path = %path.display(), "staging root removed");
                Ok(None)
            }
        }
    }
}

impl Drop for StagingRoot {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove staging root"
            );
        }
    }
}

/// Removes a directory tree, restoring owner write permission on
/// directories that image layers shipped read-only.
fn remove_tree(path: &Path) -> Result<()> {
    if std::fs::remove_dir_all(path).is_ok() || !path.exists() {
        return Ok(());
    }
    make_dirs_writable(path)?;
    std::fs::remove_dir_all(path).map_err(|e| HuskError::io(path, e))
}

fn make_dirs_writable(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| HuskError::io(path, e))?;
    if !meta.is_dir() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o700);
    std::fs::set_permissions(path, perms).map_err(|e| HuskError::io(path, e))?;
    for entry in std::fs::read_dir(path).map_err(|e| HuskError::io(path, e))? {
        let entry = entry.map_err(|e| HuskError::io(path, e))?;
        make_dirs_writable(&entry.path())?;
    }
    Ok(())
}
