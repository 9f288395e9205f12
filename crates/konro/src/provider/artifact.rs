//! Loading pre-existing graph artifacts from a content store.

use super::{ArtifactStore, Blob, CONFIG_BLOB, GraphHandle, GraphProvider};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// A [`GraphProvider`] that resolves bundles previously published to an
/// [`ArtifactStore`].
pub struct ArtifactProvider {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactProvider {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

impl GraphProvider for ArtifactProvider {
    fn load(&self, model_id: &str, revision: &str) -> Result<(ModelConfig, Vec<GraphHandle>)> {
        let not_found = || Error::ArtifactNotFound {
            model_id: model_id.into(),
            revision: revision.into(),
        };

        let blobs = self.store.get(model_id, revision)?.ok_or_else(not_found)?;
        debug!(model_id, revision, blobs = blobs.len(), "fetched artifact bundle");

        let config_blob = blobs
            .iter()
            .find(|b| b.name == CONFIG_BLOB)
            .ok_or_else(not_found)?;
        let config = ModelConfig::from_json(&config_blob.bytes)?;
        config.validate()?;

        let mut handles = Vec::new();
        for &role in config.architecture.expected_roles() {
            let blob = blobs
                .iter()
                .find(|b| b.name == role.artifact_name())
                .ok_or_else(not_found)?;
            handles.push(GraphHandle {
                role,
                bytes: blob.bytes.clone(),
            });
        }

        info!(
            model_id,
            revision,
            graphs = handles.len(),
            architecture = ?config.architecture,
            "resolved graph bundle"
        );
        Ok((config, handles))
    }
}

/// Serializes a config plus its graph artifacts into a bundle and publishes
/// it through the store in a single call.
pub fn save_bundle(
    store: &dyn ArtifactStore,
    model_id: &str,
    config: &ModelConfig,
    handles: &[GraphHandle],
) -> Result<()> {
    let mut blobs = Vec::with_capacity(handles.len() + 1);
    blobs.push(Blob::new(CONFIG_BLOB, config.to_json()?));
    for handle in handles {
        blobs.push(Blob::new(handle.role.artifact_name(), handle.bytes.clone()));
    }
    store.put(model_id, blobs)?;
    info!(model_id, graphs = handles.len(), "published graph bundle");
    Ok(())
}
