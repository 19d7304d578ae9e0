//! Shared-library closure of a host binary.
//!
//! The closure is the set of host files a dynamically linked binary needs
//! at load time. It is computed once by asking the platform's `ldd`, which
//! already expands transitive dependencies, and then copied into a staging
//! root under the same absolute paths.

pub mod ldd;

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use husk_common::constants::DEFAULT_LDD_PROGRAM;
use husk_common::error::{HuskError, Result};

use self::ldd::{LddEntry, parse_line};

/// Raw output of one dependency listing.
#[derive(Debug, Clone, Default)]
pub struct ListerOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the lister exited successfully.
    pub success: bool,
}

/// Capability to list a binary's load-time dependencies.
pub trait DependencyLister {
    /// Lists the dependencies of `binary`.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::ResolutionFailed`] if the lister cannot be run.
    fn list(&self, binary: &Path) -> Result<ListerOutput>;
}

/// Lister backed by the platform's `ldd`.
#[derive(Debug, Clone)]
pub struct Ldd {
    program: String,
}

impl Ldd {
    /// Uses the given `ldd` name or path.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Ldd {
    fn default() -> Self {
        Self::new(DEFAULT_LDD_PROGRAM)
    }
}

impl DependencyLister for Ldd {
    fn list(&self, binary: &Path) -> Result<ListerOutput> {
        let failed = |message: String| HuskError::ResolutionFailed {
            binary: binary.to_path_buf(),
            message,
        };

        let program = which::which(&self.program)
            .map_err(|e| failed(format!("{} is not available: {e}", self.program)))?;

        let output = Command::new(&program)
            .arg(binary)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| failed(format!("failed to run {}: {e}", program.display())))?;

        Ok(ListerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

/// Absolute host paths of every file a binary needs at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    paths: BTreeSet<PathBuf>,
}

impl DependencyClosure {
    /// Iterates the paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Number of files in the closure.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` for statically linked binaries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `path` is part of the closure.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }
}

/// Computes the closure of `binary`.
///
/// # Errors
///
/// Returns [`HuskError::NotFound`] if `binary` does not exist and
/// [`HuskError::ResolutionFailed`] if the lister fails for any reason other
/// than the binary being statically linked.
pub fn resolve(lister: &dyn DependencyLister, binary: &Path) -> Result<DependencyClosure> {
    match fs::metadata(binary) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(HuskError::NotFound {
                kind: "binary",
                id: binary.display().to_string(),
            });
        }
        Err(e) => return Err(HuskError::io(binary, e)),
    }

    let output = lister.list(binary)?;

    if !output.success {
        if is_static_report(&output) {
            tracing::debug!(binary = %binary.display(), "binary is not dynamically linked");
            return Ok(DependencyClosure::default());
        }
        return Err(HuskError::ResolutionFailed {
            binary: binary.to_path_buf(),
            message: output.stderr.trim().to_string(),
        });
    }

    let mut paths = BTreeSet::new();
    for line in non_blank_lines(&output.stdout) {
        let entry = match parse_line(line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(binary = %binary.display(), error = %e, "skipping ldd line");
                continue;
            }
        };
        match entry {
            LddEntry::Missing { ref name } => {
                tracing::warn!(
                    binary = %binary.display(),
                    library = %name,
                    "library not found on host"
                );
            }
            _ => {
                if let Some(path) = entry.host_path().filter(|p| p.exists()) {
                    let _ = paths.insert(path.to_path_buf());
                }
            }
        }
    }

    tracing::info!(
        binary = %binary.display(),
        libraries = paths.len(),
        "dependency closure resolved"
    );
    Ok(DependencyClosure { paths })
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|l| !l.trim().is_empty())
}

/// Whether a failed listing only reports a non-dynamic binary.
///
/// glibc prints the marker on stderr and exits 1; other `ldd`s use stdout.
fn is_static_report(output: &ListerOutput) -> bool {
    let mut lines = non_blank_lines(&output.stdout)
        .chain(non_blank_lines(&output.stderr))
        .peekable();
    lines.peek().is_some() && lines.all(|l| matches!(parse_line(l), Ok(LddEntry::Static)))
}

/// Copies every closure member into `root` at the same absolute path.
///
/// Returns the number of files copied.
///
/// # Errors
///
/// Returns [`HuskError::Io`] if a directory cannot be created or a file
/// cannot be copied.
pub fn stage(closure: &DependencyClosure, root: &Path) -> Result<usize> {
    for source in closure.iter() {
        let relative = source.strip_prefix("/").unwrap_or(source);
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| HuskError::io(parent, e))?;
        }
        let _ = fs::copy(source, &target).map_err(|e| HuskError::io(&target, e))?;
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "staged library"
        );
    }
    Ok(closure.len())
}
