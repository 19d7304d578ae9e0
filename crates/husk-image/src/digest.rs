//! SHA-256 content verification.
//!
//! Blobs are hashed while they stream through the extractor, so integrity is
//! checked without staging the blob on disk.

use std::io::{self, Read};

use husk_common::error::{HuskError, Result};
use husk_common::types::Digest;
use sha2::{Digest as _, Sha256};

/// Reader that hashes everything read through it.
pub struct VerifyingReader<R> {
    inner: R,
    hasher: Sha256,
    expected: Digest,
    bytes: u64,
}

impl<R: Read> VerifyingReader<R> {
    /// Wraps `inner`, expecting its full content to hash to `expected`.
    pub fn new(inner: R, expected: &Digest) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            expected: expected.clone(),
            bytes: 0,
        }
    }

    /// Drains whatever the consumer left unread and checks the digest.
    ///
    /// Returns the total number of bytes seen. Digests with an algorithm
    /// other than SHA-256 are not verified.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::DigestMismatch`] if the content does not match,
    /// or an I/O error if draining fails.
    pub fn finish(mut self) -> Result<u64> {
        let _ = io::copy(&mut self, &mut io::sink()).map_err(|e| HuskError::Io {
            path: self.expected.to_string().into(),
            source: e,
        })?;

        if !self.expected.is_sha256() {
            tracing::warn!(digest = %self.expected, "cannot verify non-SHA-256 digest");
            return Ok(self.bytes);
        }

        let actual = format!("{:x}", self.hasher.finalize());
        if actual != self.expected.hex() {
            return Err(HuskError::DigestMismatch {
                resource: self.expected.to_string(),
                expected: self.expected.hex().to_string(),
                actual,
            });
        }
        tracing::debug!(digest = %self.expected, bytes = self.bytes, "digest verified");
        Ok(self.bytes)
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Computes the `sha256:` digest of an in-memory buffer.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(data))
}
