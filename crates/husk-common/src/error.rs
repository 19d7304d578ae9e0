//! Unified error type for the husk workspace.
//!
//! Every component surfaces one of these variants without attempting
//! recovery. Only the CLI inspects the category, to pick an exit code.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::constants::{EXIT_FAILURE, EXIT_SETUP_NOT_FOUND};

/// Registry protocol step that was running when a transport error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryStep {
    /// Requesting a bearer token.
    Authenticate,
    /// Requesting the image manifest.
    FetchManifest,
    /// Requesting a layer blob.
    FetchLayer,
}

impl fmt::Display for RegistryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate => write!(f, "authenticate"),
            Self::FetchManifest => write!(f, "fetch manifest"),
            Self::FetchLayer => write!(f, "fetch layer"),
        }
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HuskError {
    /// An archive entry would land outside the extraction root.
    #[error("archive entry escapes destination: {path}")]
    PathTraversal {
        /// Entry name as stored in the archive.
        path: String,
    },

    /// The archive stream is malformed.
    #[error("corrupt archive: {message}")]
    CorruptArchive {
        /// Description of the malformation.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The shared-library dependency query failed.
    #[error("dependency resolution failed for {binary}: {message}")]
    ResolutionFailed {
        /// Binary whose dependencies were queried.
        binary: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The registry refused to issue a token, or issued an unusable one.
    #[error("registry authentication failed for {repository}: {message}")]
    Auth {
        /// Repository the token was requested for.
        repository: String,
        /// Description of the failure.
        message: String,
    },

    /// The image manifest could not be fetched or understood.
    #[error("manifest error for {reference}: {message}")]
    Manifest {
        /// Image reference whose manifest failed.
        reference: String,
        /// Description of the failure.
        message: String,
    },

    /// A registry request failed at the transport level.
    #[error("network error during {step}: {source}")]
    Network {
        /// Protocol step that failed.
        step: RegistryStep,
        /// Underlying transport error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Downloaded content does not match its advertised digest.
    #[error("digest mismatch for {resource}: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected digest.
        expected: String,
        /// Digest actually computed.
        actual: String,
    },

    /// The command to run or a host isolation tool is missing.
    #[error("executable not found: {program}")]
    SetupNotFound {
        /// Program that could not be located.
        program: String,
    },

    /// Spawning or waiting on the isolated child failed.
    #[error("launch failed: {message}")]
    Launch {
        /// Description of the failure.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HuskError {
    /// Builds an [`HuskError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`HuskError::Network`] for the given step.
    pub fn network(
        step: RegistryStep,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            step,
            source: Box::new(source),
        }
    }

    /// Whether this error means a required executable is missing on the host.
    pub const fn is_missing_executable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::SetupNotFound { .. })
    }

    /// Process exit code the CLI reports for this error.
    pub const fn exit_code(&self) -> u8 {
        if self.is_missing_executable() {
            EXIT_SETUP_NOT_FOUND
        } else {
            EXIT_FAILURE
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HuskError>;
