//! # Graph Providers
//!
//! A graph provider resolves a model identifier into the pieces the rest of
//! the crate works with: one immutable [`ModelConfig`](crate::config::ModelConfig)
//! and an ordered sequence of [`GraphHandle`]s, one per compiled graph the
//! logical model decomposes into.
//!
//! Two implementations share the contract and are chosen by configuration:
//!
//! * [`ArtifactProvider`] loads pre-existing graph artifacts from an
//!   [`ArtifactStore`]; absent bundles fail with `ArtifactNotFound`.
//! * [`ExportingProvider`] drives an external conversion collaborator to
//!   produce graphs from a source-framework checkpoint on the fly; failures
//!   wrap the collaborator's diagnostic in `Conversion`, and a partial
//!   export is never observable downstream.

mod artifact;
mod exporting;
mod store;

pub use artifact::{ArtifactProvider, save_bundle};
pub use exporting::{ExportedModel, ExportingProvider, GraphExporter};
pub use store::{ArtifactStore, Blob, MemoryStore};

use crate::config::{GraphRole, ModelConfig};
use crate::error::Result;

/// Revision resolved when the caller does not name one.
pub const DEFAULT_REVISION: &str = "main";

/// Blob name of the serialized [`ModelConfig`] within a bundle.
pub const CONFIG_BLOB: &str = "config.json";

/// One compiled, loadable computation graph.
///
/// Owned by the provider until handed to a model adapter, which then owns
/// it for its lifetime (the bytes are what persistence re-serializes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphHandle {
    pub role: GraphRole,
    pub bytes: Vec<u8>,
}

/// Resolves a model identifier into config plus graphs.
pub trait GraphProvider: Send + Sync {
    /// Loads `model_id` at `revision`.
    ///
    /// The returned handles are ordered per
    /// [`Architecture::expected_roles`](crate::config::Architecture::expected_roles).
    fn load(&self, model_id: &str, revision: &str) -> Result<(ModelConfig, Vec<GraphHandle>)>;
}
