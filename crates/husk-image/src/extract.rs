//! Filesystem layer extraction.
//!
//! Layers are tar streams, optionally gzip-compressed, applied on top of
//! each other in order. Every entry name is confined to the destination
//! before anything is written: an entry that would land outside it aborts
//! the whole extraction with [`HuskError::PathTraversal`].

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use husk_common::error::{HuskError, Result};

/// Marker prefix of a file deleted by an upper layer.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker that hides every lower-layer entry of its directory.
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Summary of one extracted layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Entries written to disk.
    pub entries: u64,
    /// Whiteout markers applied.
    pub whiteouts: u64,
    /// Bytes of regular-file content written.
    pub bytes: u64,
}

/// Extracts a tar stream into `dest`.
///
/// Gzip compression is detected from the stream's magic bytes. Existing
/// files are overwritten, so applying layers in order yields the stacked
/// filesystem.
///
/// # Errors
///
/// Returns [`HuskError::PathTraversal`] if any entry escapes `dest`,
/// [`HuskError::CorruptArchive`] if the stream is malformed, and
/// [`HuskError::Io`] if writing fails.
pub fn extract_layer<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats> {
    tracing::debug!(target_dir = %dest.display(), "extracting layer");

    fs::create_dir_all(dest).map_err(|e| HuskError::io(dest, e))?;
    let root = dest.canonicalize().map_err(|e| HuskError::io(dest, e))?;

    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered
        .fill_buf()
        .map_err(corrupt)?
        .starts_with(&GZIP_MAGIC);

    let stats = if is_gzip {
        unpack_entries(&mut tar::Archive::new(flate2::read::GzDecoder::new(buffered)), &root)?
    } else {
        unpack_entries(&mut tar::Archive::new(buffered), &root)?
    };

    tracing::info!(
        target_dir = %dest.display(),
        gzip = is_gzip,
        entries = stats.entries,
        whiteouts = stats.whiteouts,
        bytes = stats.bytes,
        "layer extracted"
    );
    Ok(stats)
}

fn unpack_entries<R: Read>(archive: &mut tar::Archive<R>, root: &Path) -> Result<ExtractStats> {
    archive.set_overwrite(true);
    let mut stats = ExtractStats::default();

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let raw = entry.path().map_err(corrupt)?.into_owned();
        let relative = confine(&raw)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        if apply_whiteout(root, &relative)? {
            stats.whiteouts += 1;
            continue;
        }

        let target = root.join(&relative);
        ensure_parent_inside(root, &target)?;

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            let mode = entry.header().mode().map_err(corrupt)?;
            create_directory(&target, mode)?;
        } else if kind.is_hard_link() {
            let link = entry
                .link_name()
                .map_err(corrupt)?
                .ok_or_else(|| HuskError::CorruptArchive {
                    message: format!("hard link without target: {}", raw.display()),
                })?
                .into_owned();
            let source = link_source_inside(root, &link)?;
            replace_with_hard_link(&source, &target)?;
        } else {
            let size = entry.size();
            let _ = entry.unpack(&target).map_err(|e| HuskError::io(&target, e))?;
            if kind.is_file() {
                stats.bytes += size;
            }
        }
        stats.entries += 1;
    }
    Ok(stats)
}

/// Normalises an entry name lexically into a path relative to the root.
///
/// Absolute names and `..` segments that climb above the root are rejected.
fn confine(name: &Path) -> Result<PathBuf> {
    let traversal = || HuskError::PathTraversal {
        path: name.display().to_string(),
    };
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }
    Ok(relative)
}

/// Creates the parent of `target` and checks it does not resolve outside
/// the root through a symlink left by an earlier entry.
fn ensure_parent_inside(root: &Path, target: &Path) -> Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|e| HuskError::io(parent, e))?;
    let resolved = parent.canonicalize().map_err(|e| HuskError::io(parent, e))?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(HuskError::PathTraversal {
            path: target.display().to_string(),
        })
    }
}

/// Applies `.wh.` markers. Returns `true` if `relative` was a marker.
///
/// The marker's directory is resolved on disk first, so a symlink planted by
/// an earlier entry cannot point the removal at a host directory.
fn apply_whiteout(root: &Path, relative: &Path) -> Result<bool> {
    let Some(file_name) = relative.file_name().and_then(|n| n.to_str()) else {
        return Ok(false);
    };
    let hidden = if file_name == OPAQUE_WHITEOUT {
        None
    } else if let Some(hidden) = file_name.strip_prefix(WHITEOUT_PREFIX) {
        if matches!(hidden, "" | "." | "..") {
            return Err(HuskError::PathTraversal {
                path: relative.display().to_string(),
            });
        }
        Some(hidden)
    } else {
        return Ok(false);
    };

    let lexical_parent = root.join(relative.parent().unwrap_or_else(|| Path::new("")));
    let Some(parent) = existing_dir_inside(root, &lexical_parent)? else {
        // Nothing below to hide.
        return Ok(true);
    };

    match hidden {
        None => {
            for child in fs::read_dir(&parent).map_err(|e| HuskError::io(&parent, e))? {
                let child = child.map_err(|e| HuskError::io(&parent, e))?;
                remove_path(&child.path())?;
            }
            tracing::debug!(dir = %parent.display(), "opaque whiteout applied");
        }
        Some(hidden) => {
            let path = parent.join(hidden);
            remove_path(&path)?;
            tracing::debug!(path = %path.display(), "whiteout applied");
        }
    }
    Ok(true)
}

/// Resolves `dir` through any symlinks and checks it stays under `root`.
///
/// Returns `None` if `dir` does not exist or is not a directory.
fn existing_dir_inside(root: &Path, dir: &Path) -> Result<Option<PathBuf>> {
    let resolved = match dir.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            return Ok(None);
        }
        Err(e) => return Err(HuskError::io(dir, e)),
    };
    if !resolved.starts_with(root) {
        return Err(HuskError::PathTraversal {
            path: dir.display().to_string(),
        });
    }
    Ok(resolved.is_dir().then_some(resolved))
}

/// Resolves a hard-link source to a path whose directory lies under `root`.
///
/// The final component is kept as is: `link(2)` does not follow it.
fn link_source_inside(root: &Path, link: &Path) -> Result<PathBuf> {
    let relative = confine(link)?;
    let traversal = || HuskError::PathTraversal {
        path: link.display().to_string(),
    };
    let name = relative.file_name().ok_or_else(traversal)?;
    let lexical_parent = root.join(relative.parent().unwrap_or_else(|| Path::new("")));
    let parent =
        existing_dir_inside(root, &lexical_parent)?.ok_or_else(|| HuskError::CorruptArchive {
            message: format!("hard link target does not exist: {}", link.display()),
        })?;
    Ok(parent.join(name))
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(HuskError::io(path, e)),
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| HuskError::io(path, e))
}

/// Creates a directory entry, keeping it writable by the owner so later
/// entries can still be placed inside it.
fn create_directory(target: &Path, mode: u32) -> Result<()> {
    if fs::symlink_metadata(target).is_ok_and(|m| !m.is_dir()) {
        remove_path(target)?;
    }
    fs::create_dir_all(target).map_err(|e| HuskError::io(target, e))?;
    fs::set_permissions(target, fs::Permissions::from_mode((mode & 0o7777) | 0o700))
        .map_err(|e| HuskError::io(target, e))
}

fn replace_with_hard_link(source: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        remove_path(target)?;
    }
    fs::hard_link(source, target).map_err(|e| HuskError::io(target, e))
}

#[allow(clippy::needless_pass_by_value)]
fn corrupt(e: std::io::Error) -> HuskError {
    HuskError::CorruptArchive {
        message: e.to_string(),
    }
}
