//! The key/value cache carried across decoding steps.

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::tensor::constant::KV_SEQ_DIM;

/// The cached key and value tensors of one decoder layer.
///
/// Shapes are `(batch, heads, seq, head_dim)`; the sequence dimension is
/// the one that grows.
#[derive(Debug, Clone)]
pub struct LayerKv {
    pub key: Tensor,
    pub value: Tensor,
}

/// Ordered per-layer key/value state for one in-progress generation.
///
/// Owned exclusively by the generation that produced it, grown by append
/// at each decoding step, and discarded when generation completes or is
/// cancelled. Invariant: the sequence-length dimension of every cached
/// tensor equals the number of decoding steps completed so far.
#[derive(Debug, Clone)]
pub struct KvCache {
    layers: Vec<LayerKv>,
    seq_len: usize,
}

fn kv_seq_len(which: &str, tensor: &Tensor) -> Result<usize> {
    if tensor.rank() <= KV_SEQ_DIM {
        return Err(Error::ShapeMismatch {
            name: which.into(),
            expected: format!("rank > {KV_SEQ_DIM}"),
            actual: format!("rank {}", tensor.rank()),
        });
    }
    Ok(tensor.shape()[KV_SEQ_DIM])
}

impl KvCache {
    /// Builds a cache from per-layer tensors, checking that every layer
    /// agrees on the sequence length.
    pub fn new(layers: Vec<LayerKv>) -> Result<Self> {
        let first = layers
            .first()
            .ok_or_else(|| Error::InvalidInput("kv cache needs at least one layer".into()))?;
        let seq_len = kv_seq_len("key", &first.key)?;
        for (index, layer) in layers.iter().enumerate() {
            for (which, tensor) in [("key", &layer.key), ("value", &layer.value)] {
                let len = kv_seq_len(which, tensor)?;
                if len != seq_len {
                    return Err(Error::ShapeMismatch {
                        name: format!("layer {index} {which}"),
                        expected: format!("seq {seq_len}"),
                        actual: format!("seq {len}"),
                    });
                }
            }
        }
        Ok(Self { layers, seq_len })
    }

    /// Sequence length of the cached state, equal to the number of
    /// decoding steps completed so far.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[LayerKv] {
        &self.layers
    }

    /// Replaces this cache with the state returned by a decoding step.
    ///
    /// The cache grows by exactly one position per step; anything else
    /// means the with-past graph returned inconsistent state and the
    /// generation must fail rather than continue from it.
    pub fn advanced(self, layers: Vec<LayerKv>) -> Result<Self> {
        let next = Self::new(layers)?;
        if next.num_layers() != self.num_layers() {
            return Err(Error::ShapeMismatch {
                name: "kv cache".into(),
                expected: format!("{} layers", self.num_layers()),
                actual: format!("{} layers", next.num_layers()),
            });
        }
        if next.seq_len != self.seq_len + 1 {
            return Err(Error::ShapeMismatch {
                name: "kv cache".into(),
                expected: format!("seq {}", self.seq_len + 1),
                actual: format!("seq {}", next.seq_len),
            });
        }
        Ok(next)
    }
}
