//! Image manifest model.
//!
//! Only the parts husk acts on are modelled: the ordered layer list.

use husk_common::constants::MAX_IMAGE_LAYERS;
use husk_common::error::{HuskError, Result};
use husk_common::types::Digest;
use serde::{Deserialize, Serialize};

/// A single content layer of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// Content-addressed identifier of the layer blob.
    pub digest: Digest,
    /// Media type of the blob.
    #[serde(default)]
    pub media_type: String,
    /// Advertised blob size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Image manifest: layers in application order, bottom first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    /// Manifest media type, when the body states it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Layers, applied in order.
    pub layers: Vec<LayerDescriptor>,
}

/// Shape used only to recognise manifest lists, which husk does not resolve.
#[derive(Deserialize)]
struct IndexShape {
    manifests: Option<serde_json::Value>,
}

impl Manifest {
    /// Parses a manifest body fetched for `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Manifest`] if the body is not JSON, is a
    /// multi-platform manifest list, lacks a `layers` field, or lists more
    /// than [`MAX_IMAGE_LAYERS`] layers.
    pub fn from_json(body: &[u8], reference: &str) -> Result<Self> {
        let fail = |message: String| HuskError::Manifest {
            reference: reference.to_string(),
            message,
        };

        let manifest: Self = serde_json::from_slice(body).map_err(|e| {
            let is_index = serde_json::from_slice::<IndexShape>(body)
                .is_ok_and(|index| index.manifests.is_some());
            if is_index {
                fail(
                    "registry returned a manifest list; multi-platform images are not supported"
                        .into(),
                )
            } else {
                fail(format!("invalid manifest: {e}"))
            }
        })?;

        if manifest.layers.len() > MAX_IMAGE_LAYERS {
            return Err(fail(format!(
                "{} layers exceeds the limit of {MAX_IMAGE_LAYERS}",
                manifest.layers.len()
            )));
        }
        Ok(manifest)
    }

    /// Sum of the advertised layer sizes.
    #[must_use]
    pub fn total_layer_size(&self) -> u64 {
        self.layers.iter().filter_map(|l| l.size).sum()
    }
}
