//! Configuration model for husk.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `HUSK_*` environment variables. CLI flags are applied last by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HuskError, Result};
use crate::types::CleanupPolicy;

/// Endpoints used to pull remote images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry v2 API.
    pub registry_url: String,
    /// Token issuing endpoint.
    pub auth_url: String,
    /// `service` parameter for the token request.
    pub auth_service: String,
    /// Per-request timeout; `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_url: constants::DEFAULT_REGISTRY_URL.into(),
            auth_url: constants::DEFAULT_AUTH_URL.into(),
            auth_service: constants::DEFAULT_AUTH_SERVICE.into(),
            request_timeout_secs: None,
        }
    }
}

/// Root configuration for husk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuskConfig {
    /// Registry endpoints.
    pub registry: RegistryConfig,
    /// Parent directory for staging roots; system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
    /// What to do with the staging root after the launch.
    pub cleanup: CleanupPolicy,
    /// Dependency listing tool.
    pub ldd_program: String,
    /// Namespace creation tool.
    pub unshare_program: String,
    /// Re-rooting tool.
    pub chroot_program: String,
}

impl Default for HuskConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            staging_dir: None,
            cleanup: CleanupPolicy::default(),
            ldd_program: constants::DEFAULT_LDD_PROGRAM.into(),
            unshare_program: constants::DEFAULT_UNSHARE_PROGRAM.into(),
            chroot_program: constants::DEFAULT_CHROOT_PROGRAM.into(),
        }
    }
}

impl HuskConfig {
    /// Loads configuration from an optional JSON file, then applies the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment override is malformed.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration file");
        let content = std::fs::read_to_string(path).map_err(|e| HuskError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Applies `HUSK_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `HUSK_KEEP_ROOT` is not a recognised boolean.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("HUSK_REGISTRY_URL") {
            self.registry.registry_url = url;
        }
        if let Some(url) = lookup("HUSK_AUTH_URL") {
            self.registry.auth_url = url;
        }
        if let Some(service) = lookup("HUSK_AUTH_SERVICE") {
            self.registry.auth_service = service;
        }
        if let Some(dir) = lookup("HUSK_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        if let Some(keep) = lookup("HUSK_KEEP_ROOT") {
            self.cleanup = if parse_bool("HUSK_KEEP_ROOT", &keep)? {
                CleanupPolicy::Keep
            } else {
                CleanupPolicy::Remove
            };
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(HuskError::Config {
            message: format!("{key} must be a boolean, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn default_config_points_at_docker_hub() {
        let config = HuskConfig::default();
        assert_eq!(config.registry.registry_url, "https://registry-1.docker.io");
        assert_eq!(config.registry.auth_url, "https://auth.docker.io/token");
        assert_eq!(config.cleanup, CleanupPolicy::Remove);
        assert_eq!(config.ldd_program, "ldd");
    }

    #[test]
    fn from_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("husk.json");
        std::fs::write(
            &path,
            r#"{"registry": {"registry_url": "http://127.0.0.1:5000"}, "cleanup": "keep"}"#,
        )
        .expect("write");

        let config = HuskConfig::from_file(&path).expect("load");
        assert_eq!(config.registry.registry_url, "http://127.0.0.1:5000");
        assert_eq!(config.registry.auth_service, "registry.docker.io");
        assert_eq!(config.cleanup, CleanupPolicy::Keep);
        assert_eq!(config.chroot_program, "chroot");
    }

    #[test]
    fn from_file_missing_returns_io_error() {
        let err = HuskConfig::from_file(Path::new("/nonexistent/husk.json")).unwrap_err();
        assert!(matches!(err, HuskError::Io { .. }));
    }

    #[test]
    fn from_file_invalid_json_returns_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("husk.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = HuskConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, HuskError::Serialization { .. }));
    }

    #[test]
    fn apply_env_overrides_registry_and_cleanup() {
        let vars = env(&[
            ("HUSK_REGISTRY_URL", "http://localhost:5000"),
            ("HUSK_AUTH_URL", "http://localhost:5001/token"),
            ("HUSK_KEEP_ROOT", "yes"),
            ("HUSK_STAGING_DIR", "/var/tmp"),
        ]);
        let mut config = HuskConfig::default();
        config
            .apply_env(|k| vars.get(k).cloned())
            .expect("apply env");

        assert_eq!(config.registry.registry_url, "http://localhost:5000");
        assert_eq!(config.registry.auth_url, "http://localhost:5001/token");
        assert_eq!(config.cleanup, CleanupPolicy::Keep);
        assert_eq!(config.staging_dir, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn apply_env_rejects_bad_boolean() {
        let vars = env(&[("HUSK_KEEP_ROOT", "maybe")]);
        let mut config = HuskConfig::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }
}
