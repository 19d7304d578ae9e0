//! Test doubles for the registry, dependency lister, and isolation seams.

use std::cell::RefCell;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

use husk_common::error::{HuskError, Result};
use husk_common::types::{Digest, LaunchResult};
use husk_core::isolation::{IsolatedCommand, IsolationProvider, ProcessHandle};
use husk_image::closure::{DependencyLister, ListerOutput};
use husk_image::digest::sha256_digest;
use husk_image::manifest::{LayerDescriptor, Manifest};
use husk_image::reference::ImageReference;
use husk_image::registry::{AuthToken, RegistryApi};

/// Registry serving in-memory layers.
#[derive(Default)]
pub struct FakeRegistry {
    layers: Vec<(Digest, Vec<u8>)>,
}

impl FakeRegistry {
    /// Adds a plain tar layer holding `files`.
    pub fn with_layer(self, files: &[(&str, &[u8])]) -> Self {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o755);
            header.set_size(data.len() as u64);
            builder.append_data(&mut header, name, *data).expect("append");
        }
        self.with_raw_layer(builder.into_inner().expect("tar"))
    }

    /// Adds a layer blob verbatim.
    pub fn with_raw_layer(mut self, bytes: Vec<u8>) -> Self {
        let digest = sha256_digest(&bytes).parse().expect("digest");
        self.layers.push((digest, bytes));
        self
    }
}

impl RegistryApi for FakeRegistry {
    fn authenticate(&self, _reference: &ImageReference) -> Result<AuthToken> {
        Ok(AuthToken::new("fake"))
    }

    fn fetch_manifest(&self, reference: &ImageReference, _token: &AuthToken) -> Result<Manifest> {
        if self.layers.is_empty() {
            return Err(HuskError::Manifest {
                reference: reference.to_string(),
                message: "registry returned 404 Not Found".into(),
            });
        }
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
        let (_, bytes) = self
            .layers
            .iter()
            .find(|(d, _)| d == &layer.digest)
            .expect("known layer");
        Ok(Box::new(&bytes[..]))
    }
}

/// Lister returning a fixed output.
#[derive(Default)]
pub struct StaticLister(pub ListerOutput);

impl DependencyLister for StaticLister {
    fn list(&self, _binary: &Path) -> Result<ListerOutput> {
        Ok(self.0.clone())
    }
}

/// What a [`FakeIsolation`] saw when asked to spawn.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub command: IsolatedCommand,
    /// Whether the in-root program existed on disk at spawn time.
    pub program_present: bool,
}

/// Provider that records requests instead of spawning.
pub struct FakeIsolation {
    pub outcome: Box<dyn Fn() -> Result<LaunchResult>>,
    pub spawned: Rc<RefCell<Vec<SpawnRecord>>>,
}

impl FakeIsolation {
    /// A provider whose children exit with the given result.
    pub fn exiting_with(result: LaunchResult) -> Self {
        Self {
            outcome: Box::new(move || Ok(result.clone())),
            spawned: Rc::default(),
        }
    }

    /// A provider whose spawn fails with the error built by `err`.
    pub fn failing_with(err: impl Fn() -> HuskError + 'static) -> Self {
        Self {
            outcome: Box::new(move || Err(err())),
            spawned: Rc::default(),
        }
    }
}

impl IsolationProvider for FakeIsolation {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn spawn_isolated(&self, command: &IsolatedCommand) -> Result<Box<dyn ProcessHandle>> {
        let in_root = command.root.join(command.program.trim_start_matches('/'));
        self.spawned.borrow_mut().push(SpawnRecord {
            command: command.clone(),
            program_present: std::fs::symlink_metadata(in_root).is_ok(),
        });
        let result = (self.outcome)()?;
        Ok(Box::new(FinishedChild(result)))
    }
}

struct FinishedChild(LaunchResult);

impl ProcessHandle for FinishedChild {
    fn id(&self) -> Option<u32> {
        None
    }

    fn wait_with_output(self: Box<Self>) -> Result<LaunchResult> {
        Ok(self.0)
    }
}
