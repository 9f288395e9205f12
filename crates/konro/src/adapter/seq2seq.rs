//! The three-session adapter behind the seq2seq generation contract.

use super::single::SingleGraphAdapter;
use super::{find_handle, take_output};
use crate::backend::ExecutionEngine;
use crate::config::{DecoderConfig, GraphRole, ModelConfig};
use crate::error::{Error, Result};
use crate::provider::GraphHandle;
use crate::seq2seq::{KvCache, LayerKv, Seq2SeqModel};
use crate::tensor::ops::token_tensor;
use crate::tensor::{Tensor, TensorMap};
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps the encoder, decoder, and decoder-with-past sessions of one
/// decomposed seq2seq model and exposes them through the
/// [`Seq2SeqModel`] seam.
///
/// All tensor-name translation happens here: the state machine above deals
/// in logical calls, the sessions below in the names their graphs declare.
pub struct Seq2SeqAdapter {
    config: Arc<ModelConfig>,
    encoder: SingleGraphAdapter,
    decoder: SingleGraphAdapter,
    decoder_with_past: SingleGraphAdapter,
}

impl Seq2SeqAdapter {
    /// Loads all three graphs of a resolved bundle into `engine`.
    pub fn load(
        engine: &dyn ExecutionEngine,
        config: Arc<ModelConfig>,
        handles: &[GraphHandle],
    ) -> Result<Self> {
        let encoder = SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::Encoder)?)?;
        let decoder = SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::Decoder)?)?;
        let decoder_with_past =
            SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::DecoderWithPast)?)?;
        Self::from_adapters(config, encoder, decoder, decoder_with_past)
    }

    /// Builds the adapter from already-constructed stage adapters.
    pub fn from_adapters(
        config: Arc<ModelConfig>,
        encoder: SingleGraphAdapter,
        decoder: SingleGraphAdapter,
        decoder_with_past: SingleGraphAdapter,
    ) -> Result<Self> {
        if config.decoder.is_none() {
            return Err(Error::InvalidInput("seq2seq config missing decoder section".into()));
        }
        Ok(Self {
            config,
            encoder,
            decoder,
            decoder_with_past,
        })
    }

    fn decoder_cfg(&self) -> &DecoderConfig {
        self.config.decoder.as_ref().expect("checked at construction")
    }

    /// The graph handles this adapter owns, in bundle order.
    pub fn graph_handles(&self) -> Vec<GraphHandle> {
        vec![
            self.encoder.handle().clone(),
            self.decoder.handle().clone(),
            self.decoder_with_past.handle().clone(),
        ]
    }

    fn collect_present(&self, outputs: &mut TensorMap, role: GraphRole) -> Result<Vec<LayerKv>> {
        let naming = &self.config.naming;
        let mut layers = Vec::with_capacity(self.decoder_cfg().num_layers);
        for layer in 0..self.decoder_cfg().num_layers {
            let key = take_output(outputs, &naming.present_key(layer), role)?;
            let value = take_output(outputs, &naming.present_value(layer), role)?;
            layers.push(LayerKv { key, value });
        }
        Ok(layers)
    }
}

#[async_trait]
impl Seq2SeqModel for Seq2SeqAdapter {
    async fn encode(&self, input_ids: &[i64]) -> Result<Tensor> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), token_tensor(input_ids)?);
        inputs.insert(
            naming.attention_mask.clone(),
            Tensor::from_i64(vec![1, input_ids.len()], vec![1; input_ids.len()])?,
        );
        let mut outputs = self.encoder.forward(&inputs)?;
        take_output(&mut outputs, &naming.encoder_hidden_states, GraphRole::Encoder)
    }

    async fn decode_first(
        &self,
        decoder_input_ids: &[i64],
        encoder_state: &Tensor,
    ) -> Result<(Tensor, KvCache)> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), token_tensor(decoder_input_ids)?);
        inputs.insert(naming.encoder_hidden_states.clone(), encoder_state.clone());

        let mut outputs = self.decoder.forward(&inputs)?;
        let logits = take_output(&mut outputs, &naming.logits, GraphRole::Decoder)?;
        let layers = self.collect_present(&mut outputs, GraphRole::Decoder)?;
        let cache = KvCache::new(layers).map_err(|e| e.in_stage(GraphRole::Decoder))?;

        if cache.seq_len() != decoder_input_ids.len() {
            return Err(Error::ShapeMismatch {
                name: "kv cache".into(),
                expected: format!("seq {}", decoder_input_ids.len()),
                actual: format!("seq {}", cache.seq_len()),
            }
            .in_stage(GraphRole::Decoder));
        }
        Ok((logits, cache))
    }

    async fn decode_step(
        &self,
        token: i64,
        encoder_state: &Tensor,
        cache: KvCache,
    ) -> Result<(Tensor, KvCache)> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), token_tensor(&[token])?);
        inputs.insert(naming.encoder_hidden_states.clone(), encoder_state.clone());
        for (layer, kv) in cache.layers().iter().enumerate() {
            inputs.insert(naming.past_key(layer), kv.key.clone());
            inputs.insert(naming.past_value(layer), kv.value.clone());
        }

        let mut outputs = self.decoder_with_past.forward(&inputs)?;
        let logits = take_output(&mut outputs, &naming.logits, GraphRole::DecoderWithPast)?;
        let layers = self.collect_present(&mut outputs, GraphRole::DecoderWithPast)?;
        let cache = cache
            .advanced(layers)
            .map_err(|e| e.in_stage(GraphRole::DecoderWithPast))?;
        Ok((logits, cache))
    }
}
