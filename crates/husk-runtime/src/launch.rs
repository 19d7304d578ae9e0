//! Launching a command inside an assembled root.

use husk_common::error::Result;
use husk_common::types::LaunchResult;
use husk_core::filesystem::chroot::ensure_command_in_root;
use husk_core::isolation::{IsolatedCommand, IsolationProvider};
use husk_core::namespace::NamespaceConfig;

use crate::assemble::AssembledRoot;

/// Runs commands in assembled roots through an [`IsolationProvider`].
pub struct Launcher {
    provider: Box<dyn IsolationProvider>,
}

impl Launcher {
    /// Creates a launcher backed by `provider`.
    #[must_use]
    pub fn new(provider: Box<dyn IsolationProvider>) -> Self {
        Self { provider }
    }

    /// Runs a command in `root` and waits for it to exit.
    ///
    /// A root with an entrypoint always runs the entrypoint; `command` is
    /// then only used for logging. Otherwise `command` is resolved inside
    /// the root.
    ///
    /// # Errors
    ///
    /// Returns [`husk_common::error::HuskError::SetupNotFound`] if the
    /// command or a host isolation tool is missing, and
    /// [`husk_common::error::HuskError::Launch`] if the child cannot be
    /// spawned or waited on.
    pub fn launch(
        &self,
        root: &AssembledRoot,
        command: &str,
        args: &[String],
        namespaces: &NamespaceConfig,
    ) -> Result<LaunchResult> {
        let program = match &root.entrypoint {
            Some(entrypoint) => entrypoint.clone(),
            None => {
                ensure_command_in_root(&root.staging, command)?;
                command.to_string()
            }
        };

        let request = IsolatedCommand {
            root: root.staging.path().to_path_buf(),
            program,
            args: args.to_vec(),
            namespaces: namespaces.clone(),
        };
        let child = self.provider.spawn_isolated(&request)?;
        tracing::debug!(
            provider = self.provider.name(),
            pid = ?child.id(),
            requested = command,
            program = %request.program,
            "isolated child started"
        );
        child.wait_with_output()
    }
}
