//! User namespace support.
//!
//! Creating PID/UTS/mount namespaces and calling `chroot(2)` need
//! `CAP_SYS_ADMIN`/`CAP_SYS_CHROOT`. An unprivileged caller gets them
//! inside a user namespace that maps its UID to root.

/// Returns `true` when the effective UID is root.
#[must_use]
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Returns `true` when the launch must add a root-mapped user namespace.
#[must_use]
pub fn needs_user_namespace() -> bool {
    !is_privileged()
}
