//! Error types for the orchestration layer.
//!
//! Every failure surfaced by this crate is one of a small closed set of
//! kinds. None of them is retried internally; retry policy belongs to the
//! external collaborators (stores, exporters, engines). Errors produced
//! while composing stages are annotated with the graph role that produced
//! them before they reach the caller.

use crate::config::GraphRole;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading models or running generation.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested graph bundle does not exist at the given revision.
    ///
    /// Surfaced immediately, never retried.
    #[error("no graph artifacts for model '{model_id}' at revision '{revision}'")]
    ArtifactNotFound { model_id: String, revision: String },

    /// Converting a source-framework checkpoint into graph artifacts failed.
    ///
    /// Wraps the conversion collaborator's diagnostic as the cause chain.
    #[error("graph conversion failed for model '{model_id}'")]
    Conversion {
        model_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A tensor was inconsistent with a graph's declared interface.
    ///
    /// This is a programming or usage error and is fatal to the call.
    #[error("shape mismatch for tensor '{name}': expected {expected}, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A caller-supplied parameter was outside its valid domain.
    ///
    /// Fatal to the call; recoverable by the caller adjusting the input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-finite values were produced mid-computation.
    ///
    /// Fatal to the in-progress generation loop. Never clamped and never
    /// auto-retried; the caller decides recovery policy.
    #[error("non-finite values in '{0}'")]
    Numerical(String),

    /// The execution engine failed outside the declared-interface checks.
    #[error("execution failed: {0}")]
    Session(String),

    /// The artifact store collaborator failed.
    #[error("artifact store failure")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An error produced by a named stage of a composed workflow.
    #[error("{role} stage failed")]
    Stage {
        role: GraphRole,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps this error with the stage that produced it.
    ///
    /// Already-annotated errors are returned unchanged so a failure
    /// crossing several composition layers keeps its innermost stage.
    pub fn in_stage(self, role: GraphRole) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                role,
                source: Box::new(other),
            },
        }
    }

    /// The stage annotation, if this error carries one.
    pub fn stage(&self) -> Option<GraphRole> {
        match self {
            Error::Stage { role, .. } => Some(*role),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = Error::InvalidInput("bad".into()).in_stage(GraphRole::Encoder);
        assert_eq!(err.stage(), Some(GraphRole::Encoder));

        // a second annotation keeps the innermost stage
        let err = err.in_stage(GraphRole::Decoder);
        assert_eq!(err.stage(), Some(GraphRole::Encoder));
    }

    #[test]
    fn test_display_carries_context() {
        let err = Error::ArtifactNotFound {
            model_id: "acme/model".into(),
            revision: "main".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("acme/model"));
        assert!(msg.contains("main"));
    }

    #[test]
    fn test_stage_error_exposes_source() {
        let err = Error::Numerical("logits".into()).in_stage(GraphRole::Decoder);
        let source = std::error::Error::source(&err).expect("stage errors carry a source");
        assert!(source.to_string().contains("logits"));
    }
}
