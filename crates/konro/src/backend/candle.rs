//! Interop with [candle](https://github.com/huggingface/candle) tensors.
//!
//! An in-process candle model can stand in for a compiled graph: wrap its
//! forward pass in a [`CandleSession`] and hand it to an adapter. Boundary
//! tensors are converted at the session edge, so the orchestration layer
//! stays unaware of the backing tensor type.

use super::{ExecutionSession, TensorSpec, validate_named_tensors};
use crate::error::{Error, Result};
use crate::tensor::{DType, Tensor, TensorMap};
use candle_core::Device;
use std::collections::HashMap;

impl Tensor {
    /// Converts this tensor into a candle tensor on `device`.
    pub fn to_candle(&self, device: &Device) -> Result<candle_core::Tensor> {
        let shape = self.shape().to_vec();
        let tensor = match self.dtype() {
            DType::F32 => candle_core::Tensor::from_vec(self.f32_data()?.to_vec(), shape, device),
            DType::I64 => candle_core::Tensor::from_vec(self.i64_data()?.to_vec(), shape, device),
        };
        tensor.map_err(|e| Error::Session(format!("candle tensor creation failed: {e}")))
    }

    /// Converts a candle tensor into a boundary tensor.
    pub fn from_candle(tensor: &candle_core::Tensor) -> Result<Tensor> {
        let shape = tensor.dims().to_vec();
        let flat = tensor
            .flatten_all()
            .map_err(|e| Error::Session(format!("candle flatten failed: {e}")))?;
        match tensor.dtype() {
            candle_core::DType::F32 => {
                let data = flat
                    .to_vec1::<f32>()
                    .map_err(|e| Error::Session(format!("candle read failed: {e}")))?;
                Tensor::from_f32(shape, data)
            }
            candle_core::DType::I64 => {
                let data = flat
                    .to_vec1::<i64>()
                    .map_err(|e| Error::Session(format!("candle read failed: {e}")))?;
                Tensor::from_i64(shape, data)
            }
            other => Err(Error::Session(format!("unsupported candle dtype {other:?}"))),
        }
    }
}

/// The forward pass a [`CandleSession`] evaluates.
pub type CandleGraphFn = Box<
    dyn Fn(HashMap<String, candle_core::Tensor>) -> candle_core::Result<HashMap<String, candle_core::Tensor>>
        + Send
        + Sync,
>;

/// An [`ExecutionSession`] backed by an in-process candle forward pass.
pub struct CandleSession {
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    device: Device,
    forward: CandleGraphFn,
}

impl CandleSession {
    pub fn new(inputs: Vec<TensorSpec>, outputs: Vec<TensorSpec>, device: Device, forward: CandleGraphFn) -> Self {
        Self {
            inputs,
            outputs,
            device,
            forward,
        }
    }
}

impl ExecutionSession for CandleSession {
    fn input_specs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    fn output_specs(&self) -> &[TensorSpec] {
        &self.outputs
    }

    fn run(&self, inputs: &TensorMap) -> Result<TensorMap> {
        validate_named_tensors(&self.inputs, inputs)?;
        let converted: HashMap<String, candle_core::Tensor> = inputs
            .iter()
            .map(|(name, tensor)| Ok((name.clone(), tensor.to_candle(&self.device)?)))
            .collect::<Result<_>>()?;
        let outputs = (self.forward)(converted)
            .map_err(|e| Error::Session(format!("candle forward failed: {e}")))?;
        outputs
            .into_iter()
            .map(|(name, tensor)| Ok((name, Tensor::from_candle(&tensor)?)))
            .collect()
    }
}
