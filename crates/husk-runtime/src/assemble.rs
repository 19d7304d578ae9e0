//! Root filesystem assembly.
//!
//! Populates a fresh [`StagingRoot`] either from a host binary plus its
//! shared-library closure, or from the layers of a registry image.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use husk_common::error::{HuskError, Result};
use husk_common::types::CleanupPolicy;
use husk_core::filesystem::chroot::entrypoint_for;
use husk_core::filesystem::staging::StagingRoot;
use husk_image::closure::{self, DependencyLister};
use husk_image::reference::ImageReference;
use husk_image::registry::{RegistryApi, pull_layers};

/// Where the root's contents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// A host binary and the libraries it loads.
    Local {
        /// Host path of the binary.
        binary: PathBuf,
    },
    /// A registry image.
    Remote {
        /// Image to pull.
        image: ImageReference,
    },
}

/// A populated staging root, ready to launch in.
#[derive(Debug)]
pub struct AssembledRoot {
    /// The root directory guard.
    pub staging: StagingRoot,
    /// In-root path of the staged binary in local mode.
    pub entrypoint: Option<String>,
}

/// Builds staging roots.
pub struct Assembler {
    registry: Box<dyn RegistryApi>,
    lister: Box<dyn DependencyLister>,
    staging_dir: Option<PathBuf>,
    cleanup: CleanupPolicy,
}

impl Assembler {
    /// Creates an assembler using the given registry and dependency lister.
    #[must_use]
    pub fn new(registry: Box<dyn RegistryApi>, lister: Box<dyn DependencyLister>) -> Self {
        Self {
            registry,
            lister,
            staging_dir: None,
            cleanup: CleanupPolicy::default(),
        }
    }

    /// Creates staging roots under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Sets what happens to staging roots once released.
    #[must_use]
    pub const fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Builds a root for `source`.
    ///
    /// On failure the partially populated root is released according to
    /// the cleanup policy.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::NotFound`] for a missing local binary, and
    /// propagates closure, registry, and extraction errors.
    pub fn assemble(&self, source: &SourceMode) -> Result<AssembledRoot> {
        match source {
            SourceMode::Local { binary } => self.assemble_local(binary),
            SourceMode::Remote { image } => self.assemble_remote(image),
        }
    }

    fn assemble_local(&self, binary: &Path) -> Result<AssembledRoot> {
        let meta = fs::metadata(binary).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                HuskError::NotFound {
                    kind: "binary",
                    id: binary.display().to_string(),
                }
            } else {
                HuskError::io(binary, e)
            }
        })?;
        if !meta.is_file() {
            return Err(HuskError::Config {
                message: format!("not a regular file: {}", binary.display()),
            });
        }

        let entrypoint = entrypoint_for(binary)?;
        let staging = StagingRoot::create(self.staging_dir.as_deref(), self.cleanup)?;

        let target = staging.host_path(&entrypoint);
        let _ = fs::copy(binary, &target).map_err(|e| HuskError::io(&target, e))?;
        let mut perms = fs::metadata(&target)
            .map_err(|e| HuskError::io(&target, e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(&target, perms).map_err(|e| HuskError::io(&target, e))?;

        let libraries = closure::resolve(self.lister.as_ref(), binary)?;
        let staged = closure::stage(&libraries, staging.path())?;

        tracing::info!(
            binary = %binary.display(),
            root = %staging.path().display(),
            entrypoint = %entrypoint,
            libraries = staged,
            "local root assembled"
        );
        Ok(AssembledRoot {
            staging,
            entrypoint: Some(entrypoint),
        })
    }

    fn assemble_remote(&self, image: &ImageReference) -> Result<AssembledRoot> {
        let staging = StagingRoot::create(self.staging_dir.as_deref(), self.cleanup)?;
        let summary = pull_layers(self.registry.as_ref(), image, staging.path())?;

        tracing::info!(
            image = %image,
            root = %staging.path().display(),
            layers = summary.layers,
            "image root assembled"
        );
        Ok(AssembledRoot {
            staging,
            entrypoint: None,
        })
    }
}
