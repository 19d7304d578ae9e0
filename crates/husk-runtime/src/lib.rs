//! # husk-runtime
//!
//! Ties the image and isolation crates together for a single run: build a
//! staging root, launch the command inside it, release the root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod assemble;
pub mod engine;
pub mod launch;

#[cfg(test)]
mod testing;
