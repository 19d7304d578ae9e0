//! Domain primitive types used across the husk workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{SHA256_HEX_LENGTH, SIGNAL_EXIT_BASE};
use crate::error::HuskError;

/// Content-addressed identifier of a blob, e.g. `sha256:9f86d0...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Builds a SHA-256 digest from a hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a 64-character hex string.
    pub fn sha256(hex: impl Into<String>) -> crate::error::Result<Self> {
        let hex = hex.into();
        if hex.len() != SHA256_HEX_LENGTH || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HuskError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self {
            algorithm: "sha256".into(),
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Algorithm component (`sha256`, `sha512`, ...).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Hex-encoded hash value.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether husk can verify content against this digest.
    #[must_use]
    pub fn is_sha256(&self) -> bool {
        self.algorithm == "sha256"
    }
}

impl FromStr for Digest {
    type Err = HuskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, hex)) = s.split_once(':') else {
            return Err(HuskError::Config {
                message: format!("digest must be algorithm:hex, got {s}"),
            });
        };
        if algorithm == "sha256" {
            return Self::sha256(hex);
        }
        let valid = !algorithm.is_empty()
            && !hex.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
            && hex.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(HuskError::Config {
                message: format!("invalid digest: {s}"),
            });
        }
        Ok(Self {
            algorithm: algorithm.into(),
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = HuskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Outcome of one isolated launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    /// Everything the child wrote to standard output.
    pub stdout: Vec<u8>,
    /// Everything the child wrote to standard error.
    pub stderr: Vec<u8>,
    /// Exit code of the child, `128 + n` when killed by signal `n`.
    pub exit_code: i32,
}

impl LaunchResult {
    /// Builds the exit code reported for a child terminated by a signal.
    #[must_use]
    pub const fn signal_exit_code(signal: i32) -> i32 {
        SIGNAL_EXIT_BASE + signal
    }
}

/// What happens to a staging root once the launch is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Delete the staging root synchronously.
    #[default]
    Remove,
    /// Leave the staging root on disk for inspection.
    Keep,
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => write!(f, "remove"),
            Self::Keep => write!(f, "keep"),
        }
    }
}
