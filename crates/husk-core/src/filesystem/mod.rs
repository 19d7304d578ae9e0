//! Filesystem management for the isolated root.
//!
//! Provides the scoped staging directory that becomes the child's `/`,
//! and helpers mapping in-root paths onto it.

pub mod chroot;
pub mod staging;
