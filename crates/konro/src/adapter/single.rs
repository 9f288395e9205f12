//! The one-session adapter used by encoder-only and classification models
//! and by each diffusion stage.

use crate::backend::{ExecutionEngine, ExecutionSession};
use crate::config::GraphRole;
use crate::error::Result;
use crate::provider::GraphHandle;
use crate::tensor::TensorMap;
use tracing::trace;

/// Wraps exactly one execution session.
///
/// The session is created when the adapter is constructed, destroyed with
/// it, and never shared with another adapter. Errors out of the session
/// come back annotated with this adapter's graph role.
#[derive(Debug)]
pub struct SingleGraphAdapter {
    handle: GraphHandle,
    session: Box<dyn ExecutionSession>,
}

impl SingleGraphAdapter {
    /// Loads the graph into the engine and wraps the resulting session.
    pub fn load(engine: &dyn ExecutionEngine, handle: GraphHandle) -> Result<Self> {
        let session = engine.load(&handle).map_err(|e| e.in_stage(handle.role))?;
        Ok(Self { handle, session })
    }

    /// Wraps an existing session, for callers that construct sessions
    /// directly (e.g. in-process backends).
    pub fn from_session(handle: GraphHandle, session: Box<dyn ExecutionSession>) -> Self {
        Self { handle, session }
    }

    /// Runs the session over named inputs.
    pub fn forward(&self, inputs: &TensorMap) -> Result<TensorMap> {
        trace!(role = %self.handle.role, inputs = inputs.len(), "running session");
        self.session.run(inputs).map_err(|e| e.in_stage(self.handle.role))
    }

    pub fn role(&self) -> GraphRole {
        self.handle.role
    }

    pub fn handle(&self) -> &GraphHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TensorSpec;
    use crate::backend::mock::MockEngine;
    use crate::error::Error;
    use crate::tensor::{DType, Tensor};

    fn engine() -> MockEngine {
        let engine = MockEngine::new();
        engine.register(
            GraphRole::Encoder,
            vec![TensorSpec::new("input_ids", DType::I64, 2)],
            vec![TensorSpec::new("logits", DType::F32, 2)],
            |inputs| {
                let n = inputs["input_ids"].shape()[1];
                let mut out = TensorMap::new();
                out.insert("logits".into(), Tensor::full(vec![1, n], 0.5));
                Ok(out)
            },
        );
        engine
    }

    fn handle() -> GraphHandle {
        GraphHandle {
            role: GraphRole::Encoder,
            bytes: vec![1],
        }
    }

    #[test]
    fn test_forward_runs_session() {
        let engine = engine();
        let adapter = SingleGraphAdapter::load(&engine, handle()).unwrap();

        let mut inputs = TensorMap::new();
        inputs.insert("input_ids".into(), Tensor::from_i64(vec![1, 3], vec![1, 2, 3]).unwrap());
        let outputs = adapter.forward(&inputs).unwrap();
        assert_eq!(outputs["logits"].shape(), &[1, 3]);
    }

    #[test]
    fn test_session_errors_carry_the_stage() {
        let engine = engine();
        let adapter = SingleGraphAdapter::load(&engine, handle()).unwrap();

        // wrong dtype trips the declared-interface check
        let mut inputs = TensorMap::new();
        inputs.insert("input_ids".into(), Tensor::zeros(vec![1, 3], DType::F32));
        let err = adapter.forward(&inputs).unwrap_err();
        assert_eq!(err.stage(), Some(GraphRole::Encoder));
        assert!(matches!(err, Error::Stage { .. }));
    }

    #[test]
    fn test_load_failure_carries_the_stage() {
        let engine = MockEngine::new(); // nothing registered
        let err = SingleGraphAdapter::load(&engine, handle()).unwrap_err();
        assert_eq!(err.stage(), Some(GraphRole::Encoder));
    }
}
