//! The opaque blob service graph artifacts are fetched from and pushed to.

use crate::error::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// One named byte blob within a model bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A content store holding compiled-graph bundles keyed by model id and
/// revision.
///
/// The store is treated as an opaque key-value blob service; retry policy
/// and transport live behind this seam. `put` takes the complete bundle in
/// one call, so readers never observe a partially written bundle.
pub trait ArtifactStore: Send + Sync {
    /// Fetches the bundle for `model_id` at `revision`, or `None` when the
    /// store holds nothing under that key.
    fn get(&self, model_id: &str, revision: &str) -> Result<Option<Vec<Blob>>>;

    /// Publishes a complete bundle for `model_id` under the default
    /// revision, replacing any previous bundle.
    fn put(&self, model_id: &str, blobs: Vec<Blob>) -> Result<()>;
}

/// An in-memory [`ArtifactStore`] for tests, demos, and scratch work.
#[derive(Default)]
pub struct MemoryStore {
    bundles: RwLock<HashMap<String, Vec<Blob>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(model_id: &str, revision: &str) -> String {
        format!("{model_id}@{revision}")
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, model_id: &str, revision: &str) -> Result<Option<Vec<Blob>>> {
        let bundles = self.bundles.read().expect("memory store poisoned");
        Ok(bundles.get(&Self::key(model_id, revision)).cloned())
    }

    fn put(&self, model_id: &str, blobs: Vec<Blob>) -> Result<()> {
        let mut bundles = self.bundles.write().expect("memory store poisoned");
        bundles.insert(Self::key(model_id, super::DEFAULT_REVISION), blobs);
        Ok(())
    }
}
