//! Spawning a command inside fresh namespaces and a re-rooted view.
//!
//! [`IsolationProvider`] is the only seam through which husk touches the
//! host's isolation facilities. [`UnshareChroot`] drives `unshare(1)` and
//! `chroot(1)`; tests substitute their own provider.

use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use husk_common::constants::{DEFAULT_CHROOT_PROGRAM, DEFAULT_UNSHARE_PROGRAM};
use husk_common::error::{HuskError, Result};
use husk_common::types::LaunchResult;

use crate::namespace::NamespaceConfig;

/// A command to run inside an isolated root.
#[derive(Debug, Clone)]
pub struct IsolatedCommand {
    /// Host path of the directory that becomes `/`.
    pub root: PathBuf,
    /// Program path as seen inside the root.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Namespaces to create.
    pub namespaces: NamespaceConfig,
}

/// A spawned isolated child.
pub trait ProcessHandle {
    /// Host PID of the spawned process, when there is one.
    fn id(&self) -> Option<u32>;

    /// Blocks until the child exits, returning its full captured output.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Launch`] if waiting or collecting output fails.
    fn wait_with_output(self: Box<Self>) -> Result<LaunchResult>;
}

/// Capability to spawn a command under namespace isolation.
pub trait IsolationProvider {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Spawns `command` with stdout and stderr captured.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::SetupNotFound`] if a host isolation tool is
    /// missing and [`HuskError::Launch`] for any other spawn failure.
    fn spawn_isolated(&self, command: &IsolatedCommand) -> Result<Box<dyn ProcessHandle>>;
}

/// Provider running `unshare <flags> -- chroot <root> <program> <args>`.
#[derive(Debug, Clone)]
pub struct UnshareChroot {
    unshare: String,
    chroot: String,
}

impl UnshareChroot {
    /// Creates a provider using the given host tool names or paths.
    #[must_use]
    pub fn new(unshare: impl Into<String>, chroot: impl Into<String>) -> Self {
        Self {
            unshare: unshare.into(),
            chroot: chroot.into(),
        }
    }

    /// Builds the host command line without spawning it.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::SetupNotFound`] if either host tool cannot be
    /// located.
    pub fn command_for(&self, command: &IsolatedCommand) -> Result<Command> {
        let unshare = locate(&self.unshare)?;
        let chroot = locate(&self.chroot)?;

        let mut cmd = Command::new(unshare);
        let _ = cmd
            .args(command.namespaces.unshare_args())
            .arg("--")
            .arg(chroot)
            .arg(&command.root)
            .arg(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(cmd)
    }
}

impl Default for UnshareChroot {
    fn default() -> Self {
        Self::new(DEFAULT_UNSHARE_PROGRAM, DEFAULT_CHROOT_PROGRAM)
    }
}

impl IsolationProvider for UnshareChroot {
    fn name(&self) -> &'static str {
        "unshare+chroot"
    }

    fn spawn_isolated(&self, command: &IsolatedCommand) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = self.command_for(command)?;
        tracing::info!(
            root = %command.root.display(),
            program = %command.program,
            args = ?command.args,
            namespaces = ?command.namespaces.unshare_args(),
            "spawning isolated process"
        );

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                HuskError::SetupNotFound {
                    program: self.unshare.clone(),
                }
            } else {
                HuskError::Launch {
                    message: format!("failed to spawn {}: {e}", self.unshare),
                }
            }
        })?;
        Ok(Box::new(ChildHandle {
            child,
            program: command.program.clone(),
        }))
    }
}

/// Resolves a host tool through `PATH`, or checks an explicit path.
fn locate(program: &str) -> Result<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(HuskError::SetupNotFound {
                program: program.to_string(),
            })
        };
    }
    which::which(program).map_err(|_| HuskError::SetupNotFound {
        program: program.to_string(),
    })
}

struct ChildHandle {
    child: Child,
    program: String,
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn wait_with_output(self: Box<Self>) -> Result<LaunchResult> {
        let program = self.program;
        let output = self.child.wait_with_output().map_err(|e| HuskError::Launch {
            message: format!("failed to wait for {program}: {e}"),
        })?;

        let exit_code = match (output.status.code(), output.status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => {
                let name = nix::sys::signal::Signal::try_from(signal)
                    .map_or_else(|_| signal.to_string(), |s| s.as_str().to_string());
                tracing::warn!(
                    program = %program,
                    signal = %name,
                    "isolated process killed by signal"
                );
                LaunchResult::signal_exit_code(signal)
            }
            (None, None) => {
                return Err(HuskError::Launch {
                    message: format!("{program} exited without a status"),
                });
            }
        };

        tracing::info!(
            program = %program,
            exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "isolated process exited"
        );
        Ok(LaunchResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}
