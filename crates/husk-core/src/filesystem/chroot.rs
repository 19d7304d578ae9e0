//! Paths as the re-rooted child sees them.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf};

use husk_common::error::{HuskError, Result};

use super::staging::StagingRoot;

/// In-root path under which a local binary is staged: `/` + its base name.
///
/// # Errors
///
/// Returns an error if the path has no file name component.
pub fn entrypoint_for(binary: &Path) -> Result<String> {
    let name = binary
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HuskError::Config {
            message: format!("binary path has no usable file name: {}", binary.display()),
        })?;
    Ok(format!("/{name}"))
}

/// Symlink hops allowed while resolving one in-root path, as in Linux.
const MAX_SYMLINK_HOPS: usize = 40;

/// Checks that `command` can be found inside the staging root.
///
/// Commands containing a `/` must exist at that in-root path. Intermediate
/// symlinks are followed the way the kernel would after re-rooting, with
/// absolute targets anchored at the staging root. The last component is
/// only checked with `symlink_metadata`, so a dangling symlink counts as
/// present. Bare names are left to the `PATH` lookup that happens inside
/// the root.
///
/// # Errors
///
/// Returns [`HuskError::SetupNotFound`] if the command is missing.
pub fn ensure_command_in_root(root: &StagingRoot, command: &str) -> Result<()> {
    if command.is_empty() {
        return Err(HuskError::Config {
            message: "command is empty".into(),
        });
    }
    if !command.contains('/') {
        return Ok(());
    }
    match locate_in_root(root.path(), Path::new(command)) {
        Some(host) => {
            tracing::debug!(command, host = %host.display(), "command found in staging root");
            Ok(())
        }
        None => {
            tracing::debug!(command, "command missing from staging root");
            Err(HuskError::SetupNotFound {
                program: command.to_string(),
            })
        }
    }
}

/// Resolves `path` inside `root` without ever leaving it.
///
/// Returns the host path of the final component, or `None` if any part of
/// the path is missing, a non-directory is traversed, or symlinks loop.
fn locate_in_root(root: &Path, path: &Path) -> Option<PathBuf> {
    let parent_dir = OsStr::new("..");
    let mut pending: Vec<OsString> = Vec::new();
    push_components(&mut pending, path);
    let mut resolved: Vec<OsString> = Vec::new();
    let mut hops = 0;

    while let Some(part) = pending.pop() {
        if part == parent_dir {
            let _ = resolved.pop();
            continue;
        }
        let host: PathBuf = std::iter::once(root.as_os_str())
            .chain(resolved.iter().map(OsString::as_os_str))
            .chain(std::iter::once(part.as_os_str()))
            .collect();
        let meta = fs::symlink_metadata(&host).ok()?;
        if pending.is_empty() {
            return Some(host);
        }
        if meta.file_type().is_symlink() {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return None;
            }
            let target = fs::read_link(&host).ok()?;
            if target.is_absolute() {
                resolved.clear();
            }
            push_components(&mut pending, &target);
        } else if meta.is_dir() {
            resolved.push(part);
        } else {
            return None;
        }
    }

    Some(
        std::iter::once(root.as_os_str())
            .chain(resolved.iter().map(OsString::as_os_str))
            .collect(),
    )
}

/// Pushes the components of `path` so that the first one is popped first.
fn push_components(stack: &mut Vec<OsString>, path: &Path) {
    let parts: Vec<OsString> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect();
    stack.extend(parts.into_iter().rev());
}
