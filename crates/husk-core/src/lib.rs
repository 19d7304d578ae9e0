//! # husk-core
//!
//! Low-level Linux isolation plumbing for husk.
//!
//! This crate provides:
//! - **Namespaces**: which namespaces a launch creates, rendered as
//!   `unshare(1)` flags, plus rootless detection.
//! - **Filesystem**: the staging root guard and in-root path handling.
//! - **Isolation**: the [`isolation::IsolationProvider`] capability that
//!   spawns a command inside namespaces and a re-rooted view, with the
//!   `unshare` + `chroot` implementation used in production.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod isolation;
pub mod namespace;
