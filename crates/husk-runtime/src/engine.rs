//! Run orchestration: assemble, launch, release.

use std::path::PathBuf;

use husk_common::config::HuskConfig;
use husk_common::error::Result;
use husk_common::types::LaunchResult;
use husk_core::isolation::UnshareChroot;
use husk_core::namespace::NamespaceConfig;
use husk_image::closure::Ldd;
use husk_image::reference::ImageReference;
use husk_image::registry::HttpRegistry;

use crate::assemble::{Assembler, SourceMode};
use crate::launch::Launcher;

/// One invocation of a command in an isolated root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// What populates the root.
    pub source: SourceMode,
    /// Command to run, as seen inside the root.
    pub command: String,
    /// Arguments passed to the command verbatim.
    pub args: Vec<String>,
}

impl RunRequest {
    /// Runs a host binary inside a root holding only it and its libraries.
    #[must_use]
    pub fn local(binary: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let binary = binary.into();
        Self {
            command: binary.display().to_string(),
            source: SourceMode::Local { binary },
            args,
        }
    }

    /// Runs `command` inside the filesystem of a registry image.
    #[must_use]
    pub fn remote(image: ImageReference, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            source: SourceMode::Remote { image },
            command: command.into(),
            args,
        }
    }

    /// Namespaces the launch creates.
    ///
    /// Local runs get a private `/proc`; image runs get their own hostname.
    /// Both gain a user namespace when the caller is not root.
    #[must_use]
    pub fn namespaces(&self) -> NamespaceConfig {
        let base = match self.source {
            SourceMode::Local { .. } => NamespaceConfig::local(),
            SourceMode::Remote { .. } => NamespaceConfig::remote(),
        };
        base.rootless_if_needed()
    }
}

/// Coordinates the assembler and launcher for a single run.
pub struct Engine {
    assembler: Assembler,
    launcher: Launcher,
}

impl Engine {
    /// Creates an engine from its parts.
    #[must_use]
    pub const fn new(assembler: Assembler, launcher: Launcher) -> Self {
        Self { assembler, launcher }
    }

    /// Creates an engine backed by the real registry, `ldd`, and
    /// `unshare` + `chroot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &HuskConfig) -> Result<Self> {
        let registry = HttpRegistry::new(config.registry.clone())?;
        let assembler = Assembler::new(Box::new(registry), Box::new(Ldd::new(&config.ldd_program)))
            .with_staging_dir(config.staging_dir.clone())
            .with_cleanup(config.cleanup);
        let launcher = Launcher::new(Box::new(UnshareChroot::new(
            &config.unshare_program,
            &config.chroot_program,
        )));
        Ok(Self::new(assembler, launcher))
    }

    /// Runs `request` to completion.
    ///
    /// The staging root is released before returning, whether the launch
    /// succeeded or not. A child's non-zero exit is a successful run whose
    /// result carries that code.
    ///
    /// # Errors
    ///
    /// Propagates assembly and launch errors.
    pub fn run(&self, request: &RunRequest) -> Result<LaunchResult> {
        let namespaces = request.namespaces();
        tracing::info!(command = %request.command, args = ?request.args, "run requested");

        let root = self.assembler.assemble(&request.source)?;
        let outcome = self.launcher.launch(&root, &request.command, &request.args, &namespaces);

        match root.staging.release() {
            Ok(Some(kept)) => tracing::info!(path = %kept.display(), "root filesystem retained"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to release root filesystem"),
        }

        let result = outcome?;
        tracing::info!(exit_code = result.exit_code, "run finished");
        Ok(result)
    }
}
