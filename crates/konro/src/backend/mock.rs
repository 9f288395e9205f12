//! A closure-programmable execution engine for tests and demos.
//!
//! Each graph role is registered with its declared interface and a closure
//! computing outputs from inputs. Loading a graph looks its role up in the
//! registry; artifact bytes are accepted but not interpreted, which makes
//! the engine deterministic across save/load round trips as long as the
//! same programs are registered.

use super::{ExecutionEngine, ExecutionSession, TensorSpec, validate_named_tensors};
use crate::config::GraphRole;
use crate::error::{Error, Result};
use crate::provider::GraphHandle;
use crate::tensor::TensorMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The function a mock graph evaluates.
pub type GraphFn = Arc<dyn Fn(&TensorMap) -> Result<TensorMap> + Send + Sync>;

#[derive(Clone)]
struct Program {
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    run: GraphFn,
}

/// An [`ExecutionEngine`] whose graphs are Rust closures.
#[derive(Default)]
pub struct MockEngine {
    programs: Mutex<HashMap<GraphRole, Program>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the program evaluated for every graph loaded with `role`.
    pub fn register<F>(&self, role: GraphRole, inputs: Vec<TensorSpec>, outputs: Vec<TensorSpec>, run: F)
    where
        F: Fn(&TensorMap) -> Result<TensorMap> + Send + Sync + 'static,
    {
        let program = Program {
            inputs,
            outputs,
            run: Arc::new(run),
        };
        self.programs
            .lock()
            .expect("mock engine registry poisoned")
            .insert(role, program);
    }
}

impl ExecutionEngine for MockEngine {
    fn load(&self, graph: &GraphHandle) -> Result<Box<dyn ExecutionSession>> {
        let program = self
            .programs
            .lock()
            .expect("mock engine registry poisoned")
            .get(&graph.role)
            .cloned()
            .ok_or_else(|| Error::Session(format!("no mock program for {} graph", graph.role)))?;
        Ok(Box::new(MockSession { program }))
    }
}

struct MockSession {
    program: Program,
}

impl ExecutionSession for MockSession {
    fn input_specs(&self) -> &[TensorSpec] {
        &self.program.inputs
    }

    fn output_specs(&self) -> &[TensorSpec] {
        &self.program.outputs
    }

    fn run(&self, inputs: &TensorMap) -> Result<TensorMap> {
        validate_named_tensors(&self.program.inputs, inputs)?;
        (self.program.run)(inputs)
    }
}
