use crate::error::{Error, Result};
use crate::provider::GraphHandle;
use crate::tensor::{DType, TensorMap};

/// The declared interface of one graph input or output.
///
/// Shapes with dynamic dimensions (batch, sequence) are declared by rank
/// only; dtype and rank are checked on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: DType,
    pub rank: usize,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: DType, rank: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            rank,
        }
    }
}

/// One loaded computation graph.
///
/// `run` is a pure function of its inputs: no state carries between calls.
/// A backend may keep internal scratch buffers sized to the largest request
/// seen, but that is an optimization, never an observable dependency.
/// Sessions are never shared across adapters; independent adapters may call
/// their own sessions concurrently.
pub trait ExecutionSession: Send + Sync {
    /// The inputs this graph declares.
    fn input_specs(&self) -> &[TensorSpec];

    /// The outputs this graph declares.
    fn output_specs(&self) -> &[TensorSpec];

    /// Executes the graph over named input tensors.
    ///
    /// Implementations must reject inputs inconsistent with the declared
    /// interface with [`Error::ShapeMismatch`] before executing anything.
    fn run(&self, inputs: &TensorMap) -> Result<TensorMap>;
}

impl std::fmt::Debug for dyn ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("inputs", &self.input_specs())
            .field("outputs", &self.output_specs())
            .finish()
    }
}

/// An opaque graph-execution capability.
///
/// Consumes one compiled-graph byte stream at load time and yields a
/// session that owns whatever backend runtime state the graph needs. The
/// session lives exactly as long as the adapter that loaded it.
pub trait ExecutionEngine: Send + Sync + 'static {
    fn load(&self, graph: &GraphHandle) -> Result<Box<dyn ExecutionSession>>;
}

/// Checks a named tensor map against a declared interface.
///
/// Every declared name must be present with matching dtype and rank, and no
/// undeclared name may appear. Shared by session implementations so the
/// `ShapeMismatch` contract is uniform across backends.
pub fn validate_named_tensors(specs: &[TensorSpec], tensors: &TensorMap) -> Result<()> {
    for spec in specs {
        let tensor = tensors.get(&spec.name).ok_or_else(|| Error::ShapeMismatch {
            name: spec.name.clone(),
            expected: format!("rank-{} {} tensor", spec.rank, spec.dtype),
            actual: "absent".into(),
        })?;
        if tensor.dtype() != spec.dtype || tensor.rank() != spec.rank {
            return Err(Error::ShapeMismatch {
                name: spec.name.clone(),
                expected: format!("rank-{} {}", spec.rank, spec.dtype),
                actual: format!("rank-{} {}", tensor.rank(), tensor.dtype()),
            });
        }
    }
    if let Some(unknown) = tensors.keys().find(|k| !specs.iter().any(|s| &s.name == *k)) {
        return Err(Error::ShapeMismatch {
            name: unknown.clone(),
            expected: "a declared tensor name".into(),
            actual: "undeclared".into(),
        });
    }
    Ok(())
}
