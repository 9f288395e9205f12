//! # Model Adapters
//!
//! An adapter wraps the execution session(s) of one decomposed logical
//! model behind the call contract of the equivalent un-accelerated model,
//! so the orchestrators above never see how many graphs sit underneath.
//! Adapters translate logical tensor names to the per-graph names declared
//! in the [`ModelConfig`](crate::config::ModelConfig), and annotate every
//! session failure with the graph role that produced it.
//!
//! Adapters own their sessions and the graph handles they were loaded
//! from; the handles are what persistence re-serializes.

mod single;

#[cfg(feature = "seq2seq")]
mod seq2seq;

pub use single::SingleGraphAdapter;

#[cfg(feature = "seq2seq")]
pub use seq2seq::Seq2SeqAdapter;

use crate::config::GraphRole;
use crate::error::{Error, Result};
use crate::provider::GraphHandle;
use crate::tensor::{Tensor, TensorMap};

/// Removes a declared output from a result map, failing with the producing
/// stage when the engine did not deliver it.
pub(crate) fn take_output(outputs: &mut TensorMap, name: &str, role: GraphRole) -> Result<Tensor> {
    outputs
        .remove(name)
        .ok_or_else(|| Error::Session(format!("missing output tensor '{name}'")).in_stage(role))
}

/// Finds the handle for `role` in a resolved bundle.
pub(crate) fn find_handle(handles: &[GraphHandle], role: GraphRole) -> Result<GraphHandle> {
    handles
        .iter()
        .find(|h| h.role == role)
        .cloned()
        .ok_or_else(|| Error::InvalidInput(format!("graph bundle has no {role} graph")))
}
