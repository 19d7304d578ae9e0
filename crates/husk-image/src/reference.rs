//! Image reference parsing.
//!
//! Parses `name[:tag][@digest]` references such as `alpine`,
//! `ubuntu:24.04` or `myorg/tool@sha256:...`.

use std::fmt;
use std::str::FromStr;

use husk_common::constants::{DEFAULT_TAG, OFFICIAL_IMAGE_NAMESPACE};
use husk_common::error::{HuskError, Result};
use husk_common::types::Digest;

/// A parsed image reference. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    name: String,
    tag: String,
    digest: Option<Digest>,
}

impl ImageReference {
    /// Parses an image reference, defaulting the tag to `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Config`] for empty references, names, or tags,
    /// and for malformed digests.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(invalid(reference, "empty image reference"));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((name_tag, digest)) => (name_tag, Some(digest.parse::<Digest>()?)),
            None => (reference, None),
        };

        // The tag separator is the last ':' after the last '/', so that a
        // `host:port/` prefix is not mistaken for a tag.
        let last_segment = name_tag.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name_tag[last_segment..].rfind(':') {
            Some(colon) => {
                let split = last_segment + colon;
                (&name_tag[..split], Some(&name_tag[split + 1..]))
            }
            None => (name_tag, None),
        };

        if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return Err(invalid(reference, "invalid repository name"));
        }
        if tag.is_some_and(str::is_empty) {
            return Err(invalid(reference, "empty tag"));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
            digest,
        })
    }

    /// Image name as written, e.g. `ubuntu` or `myorg/tool`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag, `latest` when none was given.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Pinned manifest digest, if any.
    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Repository path used on the wire. Single-segment names live in the
    /// `library/` namespace, following Docker Hub convention.
    #[must_use]
    pub fn repository(&self) -> String {
        if self.name.contains('/') {
            self.name.clone()
        } else {
            format!("{OFFICIAL_IMAGE_NAMESPACE}/{}", self.name)
        }
    }

    /// Manifest path component: the digest when pinned, the tag otherwise.
    #[must_use]
    pub fn manifest_reference(&self) -> String {
        self.digest
            .as_ref()
            .map_or_else(|| self.tag.clone(), ToString::to_string)
    }
}

impl FromStr for ImageReference {
    type Err = HuskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn invalid(reference: &str, why: &str) -> HuskError {
    HuskError::Config {
        message: format!("{why}: {reference:?}"),
    }
}
