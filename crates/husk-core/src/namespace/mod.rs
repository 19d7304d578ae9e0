//! Linux namespace selection for an isolated launch.
//!
//! The namespaces themselves are created by `unshare(1)`; this module
//! decides which ones a launch gets and renders them as its flags.

pub mod user;

/// Configuration for which namespaces to create around the child.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the PID namespace.
    pub pid: bool,
    /// Fork before exec so the child becomes PID 1 of the new namespace.
    pub fork: bool,
    /// Mount a fresh `/proc` matching the new PID namespace (implies a
    /// private mount namespace).
    pub mount_proc: bool,
    /// Isolate the UTS (hostname) namespace.
    pub uts: bool,
    /// Create a user namespace mapping the caller to root, for
    /// unprivileged launches.
    pub user: bool,
}

impl NamespaceConfig {
    /// Namespaces for launching a staged local binary.
    #[must_use]
    pub const fn local() -> Self {
        Self {
            pid: true,
            fork: true,
            mount_proc: true,
            uts: false,
            user: false,
        }
    }

    /// Namespaces for launching a command from a pulled image.
    #[must_use]
    pub const fn remote() -> Self {
        Self {
            pid: true,
            fork: true,
            mount_proc: false,
            uts: true,
            user: false,
        }
    }

    /// Adds a root-mapped user namespace when the caller is unprivileged.
    #[must_use]
    pub fn rootless_if_needed(self) -> Self {
        let user = user::needs_user_namespace();
        if user {
            tracing::debug!("caller is not root, adding a user namespace");
        }
        self.with_user(user)
    }

    /// Sets whether a root-mapped user namespace is created.
    #[must_use]
    pub const fn with_user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Renders the configuration as `unshare(1)` flags.
    #[must_use]
    pub fn unshare_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.user {
            args.extend(["--user", "--map-root-user"]);
        }
        if self.pid {
            args.push("--pid");
        }
        if self.uts {
            args.push("--uts");
        }
        if self.fork {
            args.push("--fork");
        }
        if self.mount_proc {
            args.push("--mount-proc");
        }
        args
    }
}
