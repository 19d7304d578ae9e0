//! # husk-image
//!
//! Everything that puts files into a staging root.
//!
//! Handles:
//! - **Extraction**: tar (optionally gzip) layers unpacked with path
//!   confinement and whiteout handling.
//! - **References**: `name[:tag][@digest]` parsing.
//! - **Manifests**: the layer list of a registry image.
//! - **Digests**: SHA-256 verification of streamed blobs.
//! - **Registry**: token, manifest, and blob requests against a v2 registry.
//! - **Closure**: a binary's shared-library set, as reported by `ldd`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod closure;
pub mod digest;
pub mod extract;
pub mod manifest;
pub mod reference;
pub mod registry;
