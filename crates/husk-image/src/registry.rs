//! Registry v2 client.
//!
//! A pull is three kinds of request: an anonymous pull token, the image
//! manifest, then one blob per layer. [`pull_layers`] drives that sequence
//! through the [`RegistryApi`] seam and streams each blob straight into the
//! extractor; nothing is cached or retried.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use husk_common::config::RegistryConfig;
use husk_common::constants::{APP_NAME, MANIFEST_MEDIA_TYPES};
use husk_common::error::{HuskError, RegistryStep, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;

use crate::digest::{VerifyingReader, sha256_digest};
use crate::extract::extract_layer;
use crate::manifest::{LayerDescriptor, Manifest};
use crate::reference::ImageReference;

/// Bearer token scoped to pulling one repository.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// The registry operations a pull needs.
pub trait RegistryApi {
    /// Obtains a pull token for the reference's repository.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Auth`] if no token is issued.
    fn authenticate(&self, reference: &ImageReference) -> Result<AuthToken>;

    /// Fetches and parses the image manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Manifest`] if the manifest is missing or invalid.
    fn fetch_manifest(&self, reference: &ImageReference, token: &AuthToken) -> Result<Manifest>;

    /// Opens a streaming reader over one layer blob.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Network`] if the blob cannot be fetched.
    fn fetch_blob<'a>(
        &'a self,
        reference: &ImageReference,
        token: &AuthToken,
        layer: &LayerDescriptor,
    ) -> Result<Box<dyn Read + 'a>>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// [`RegistryApi`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    config: RegistryConfig,
}

impl HttpRegistry {
    /// Builds a client for the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Config`] if the HTTP client cannot be built.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| HuskError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn registry_url(&self, reference: &ImageReference, kind: &str, id: &str) -> String {
        format!(
            "{}/v2/{}/{kind}/{id}",
            self.config.registry_url.trim_end_matches('/'),
            reference.repository()
        )
    }
}

impl RegistryApi for HttpRegistry {
    fn authenticate(&self, reference: &ImageReference) -> Result<AuthToken> {
        let repository = reference.repository();
        let auth_failed = |message: String| HuskError::Auth {
            repository: repository.clone(),
            message,
        };

        let scope = format!("repository:{repository}:pull");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            [("service", self.config.auth_service.as_str()), ("scope", scope.as_str())],
        )
        .map_err(|e| HuskError::Config {
            message: format!("invalid auth URL {:?}: {e}", self.config.auth_url),
        })?;

        tracing::debug!(url = %url, "requesting pull token");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| HuskError::network(RegistryStep::Authenticate, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(auth_failed(format!("token endpoint returned {status}")));
        }
        let body = response
            .bytes()
            .map_err(|e| HuskError::network(RegistryStep::Authenticate, e))?;
        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| auth_failed(format!("invalid token response: {e}")))?;

        parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .map(AuthToken::new)
            .ok_or_else(|| auth_failed("token response carried no token".into()))
    }

    fn fetch_manifest(&self, reference: &ImageReference, token: &AuthToken) -> Result<Manifest> {
        let manifest_ref = reference.manifest_reference();
        let url = self.registry_url(reference, "manifests", &manifest_ref);
        tracing::debug!(url = %url, "fetching manifest");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, MANIFEST_MEDIA_TYPES.join(", "))
            .bearer_auth(token.as_str())
            .send()
            .map_err(|e| HuskError::network(RegistryStep::FetchManifest, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HuskError::Manifest {
                reference: reference.to_string(),
                message: format!("registry returned {status}"),
            });
        }
        let body = response
            .bytes()
            .map_err(|e| HuskError::network(RegistryStep::FetchManifest, e))?;

        if let Some(pinned) = reference.digest().filter(|d| d.is_sha256()) {
            let actual = sha256_digest(&body);
            if actual != pinned.to_string() {
                return Err(HuskError::DigestMismatch {
                    resource: format!("manifest {reference}"),
                    expected: pinned.hex().to_string(),
                    actual: actual.trim_start_matches("sha256:").to_string(),
                });
            }
        }

        Manifest::from_json(&body, &reference.to_string())
    }

    fn fetch_blob<'a>(
        &'a self,
        reference: &ImageReference,
        token: &AuthToken,
        layer: &LayerDescriptor,
    ) -> Result<Box<dyn Read + 'a>> {
        let url = self.registry_url(reference, "blobs", &layer.digest.to_string());
        tracing::debug!(url = %url, size = ?layer.size, "fetching layer");

        let response: Response = self
            .client
            .get(&url)
            .bearer_auth(token.as_str())
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| HuskError::network(RegistryStep::FetchLayer, e))?;
        Ok(Box::new(response))
    }
}

/// Outcome of a completed pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Layers applied.
    pub layers: usize,
    /// Filesystem entries written across all layers.
    pub entries: u64,
    /// Compressed bytes downloaded.
    pub bytes: u64,
}

/// Pulls `reference` and applies its layers, in order, onto `dest`.
///
/// Each blob is verified against its digest as it streams through the
/// extractor.
///
/// # Errors
///
/// Propagates authentication, manifest, network, digest, and extraction
/// errors. A failure part-way leaves earlier layers applied in `dest`.
pub fn pull_layers(
    api: &dyn RegistryApi,
    reference: &ImageReference,
    dest: &Path,
) -> Result<PullSummary> {
    tracing::info!(image = %reference, "pulling image");

    let token = api.authenticate(reference)?;
    let manifest = api.fetch_manifest(reference, &token)?;
    tracing::info!(
        image = %reference,
        layers = manifest.layers.len(),
        advertised_bytes = manifest.total_layer_size(),
        "manifest fetched"
    );

    let mut summary = PullSummary::default();
    for (index, layer) in manifest.layers.iter().enumerate() {
        let blob = api.fetch_blob(reference, &token, layer)?;
        let mut verifying = VerifyingReader::new(blob, &layer.digest);
        let stats = extract_layer(&mut verifying, dest)?;
        summary.bytes += verifying.finish()?;
        summary.entries += stats.entries;
        summary.layers += 1;
        tracing::debug!(
            layer = index,
            digest = %layer.digest,
            entries = stats.entries,
            "layer applied"
        );
    }

    tracing::info!(
        image = %reference,
        layers = summary.layers,
        entries = summary.entries,
        bytes = summary.bytes,
        "image pulled"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use husk_common::types::Digest;

    use super::*;

    /// In-memory registry serving pre-built layer tarballs.
    #[derive(Default)]
    struct FakeRegistry {
        layers: Vec<(Digest, Vec<u8>)>,
        tampered: HashMap<String, Vec<u8>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeRegistry {
        fn with_layer(mut self, files: &[(&str, &[u8])]) -> Self {
            let mut builder = tar::Builder::new(Vec::new());
            for (name, data) in files {
                let mut header = tar::Header::new_gnu();
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, name, *data).expect("append");
            }
            let bytes = builder.into_inner().expect("tar");
            let digest: Digest = sha256_digest(&bytes).parse().expect("digest");
            self.layers.push((digest, bytes));
            self
        }
    }

    impl RegistryApi for FakeRegistry {
        fn authenticate(&self, reference: &ImageReference) -> Result<AuthToken> {
            self.calls.borrow_mut().push(format!("auth {}", reference.repository()));
            Ok(AuthToken::new("fake-token"))
        }

        fn fetch_manifest(
            &self,
            _reference: &ImageReference,
            token: &AuthToken,
        ) -> Result<Manifest> {
            assert_eq!(token.as_str(), "fake-token");
            self.calls.borrow_mut().push("manifest".into());
            Ok(Manifest {
                schema_version: Some(2),
                media_type: None,
                layers: self
                    .layers
                    .iter()
                    .map(|(digest, bytes)| LayerDescriptor {
                        digest: digest.clone(),
                        media_type: String::new(),
                        size: Some(bytes.len() as u64),
                    })
                    .collect(),
            })
        }

        fn fetch_blob<'a>(
            &'a self,
            _reference: &ImageReference,
            _token: &AuthToken,
            layer: &LayerDescriptor,
        ) -> Result<Box<dyn Read + 'a>> {
            self.calls.borrow_mut().push(format!("blob {}", layer.digest));
            if let Some(bytes) = self.tampered.get(&layer.digest.to_string()) {
                return Ok(Box::new(&bytes[..]));
            }
            let (_, bytes) = self
                .layers
                .iter()
                .find(|(d, _)| d == &layer.digest)
                .expect("known layer");
            Ok(Box::new(&bytes[..]))
        }
    }

    #[test]
    fn pull_layers_applies_layers_in_manifest_order() {
        let registry = FakeRegistry::default()
            .with_layer(&[("etc/motd", &b"a"[..]), ("bin/tool", &b"v1"[..])])
            .with_layer(&[("etc/motd", &b"b"[..])]);
        let dest = tempfile::tempdir().expect("tempdir");
        let reference = ImageReference::parse("alpine").expect("reference");

        let summary = pull_layers(&registry, &reference, dest.path()).expect("pull");
        assert_eq!(summary.layers, 2);
        assert_eq!(summary.entries, 3);
        assert_eq!(std::fs::read(dest.path().join("etc/motd")).expect("motd"), b"b");
        assert_eq!(std::fs::read(dest.path().join("bin/tool")).expect("tool"), b"v1");

        let calls = registry.calls.borrow();
        assert_eq!(calls[0], "auth library/alpine");
        assert_eq!(calls[1], "manifest");
        assert_eq!(calls.len(), 4);
    }

    #[test]
    fn pull_layers_rejects_tampered_blob() {
        let mut registry = FakeRegistry::default().with_layer(&[("etc/motd", &b"original"[..])]);
        let digest = registry.layers[0].0.to_string();
        let mut evil = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_size(4);
        evil.append_data(&mut header, "etc/motd", &b"evil"[..]).expect("append");
        let _ = registry.tampered.insert(digest, evil.into_inner().expect("tar"));

        let dest = tempfile::tempdir().expect("tempdir");
        let reference = ImageReference::parse("alpine").expect("reference");
        let err = pull_layers(&registry, &reference, dest.path()).unwrap_err();
        assert!(matches!(err, HuskError::DigestMismatch { .. }), "{err}");
    }

    #[test]
    fn auth_token_debug_is_redacted() {
        let token = AuthToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }

    #[test]
    fn http_registry_builds_repository_urls() {
        let registry = HttpRegistry::new(RegistryConfig {
            registry_url: "http://registry.test/".into(),
            ..RegistryConfig::default()
        })
        .expect("client");
        let reference = ImageReference::parse("ubuntu:24.04").expect("reference");
        assert_eq!(
            registry.registry_url(&reference, "manifests", &reference.manifest_reference()),
            "http://registry.test/v2/library/ubuntu/manifests/24.04"
        );
    }
}
