//! Model metadata shared by every component of a pipeline.
//!
//! A [`ModelConfig`] is loaded once when a model is resolved and never
//! mutated afterwards. It records which architecture family the model
//! belongs to, how many graphs the logical model decomposes into, and the
//! tensor names each of those graphs expects, so adapters can translate
//! between the orchestrator's logical inputs and the per-graph interfaces.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of architecture families this crate orchestrates.
///
/// The family is resolved once at construction from the model metadata and
/// selects the orchestrator variant; it is never re-dispatched per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Encoder / decoder / decoder-with-past generation models.
    Seq2Seq,
    /// Single-graph feature extractors (e.g. span extraction).
    EncoderOnly,
    /// Single-graph sequence classifiers.
    Classification,
    /// Multi-stage latent diffusion models.
    Diffusion,
}

impl Architecture {
    /// The ordered set of graph roles a decomposed model of this family
    /// consists of. Artifact bundles are resolved in this order.
    pub fn expected_roles(&self) -> &'static [GraphRole] {
        match self {
            Architecture::Seq2Seq => &[
                GraphRole::Encoder,
                GraphRole::Decoder,
                GraphRole::DecoderWithPast,
            ],
            Architecture::EncoderOnly | Architecture::Classification => &[GraphRole::Encoder],
            Architecture::Diffusion => &[
                GraphRole::TextEncoder,
                GraphRole::Denoiser,
                GraphRole::LatentEncoder,
                GraphRole::LatentDecoder,
            ],
        }
    }
}

/// The task a pipeline is built for, used by the facade to pick its call
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Translation,
    QuestionAnswering,
    TextClassification,
    TextToImage,
}

/// Numeric precision the graphs were compiled with. Metadata only; the
/// execution engine owns the actual kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    F32,
    F16,
}

/// Identifies one compiled graph within a decomposed logical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphRole {
    Encoder,
    Decoder,
    DecoderWithPast,
    TextEncoder,
    Denoiser,
    LatentEncoder,
    LatentDecoder,
}

impl GraphRole {
    /// The blob name this graph's artifact is stored under in a bundle.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            GraphRole::Encoder => "encoder.graph",
            GraphRole::Decoder => "decoder.graph",
            GraphRole::DecoderWithPast => "decoder_with_past.graph",
            GraphRole::TextEncoder => "text_encoder.graph",
            GraphRole::Denoiser => "denoiser.graph",
            GraphRole::LatentEncoder => "latent_encoder.graph",
            GraphRole::LatentDecoder => "latent_decoder.graph",
        }
    }
}

impl fmt::Display for GraphRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphRole::Encoder => "encoder",
            GraphRole::Decoder => "decoder",
            GraphRole::DecoderWithPast => "decoder-with-past",
            GraphRole::TextEncoder => "text-encoder",
            GraphRole::Denoiser => "denoiser",
            GraphRole::LatentEncoder => "latent-encoder",
            GraphRole::LatentDecoder => "latent-decoder",
        };
        f.write_str(name)
    }
}

/// Maps the orchestrator's logical tensor names to the names each graph
/// declares. Per-layer key/value names are templates with a `{layer}`
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorNaming {
    pub input_ids: String,
    pub attention_mask: String,
    pub encoder_hidden_states: String,
    pub logits: String,
    pub start_logits: String,
    pub end_logits: String,
    pub past_key: String,
    pub past_value: String,
    pub present_key: String,
    pub present_value: String,
    pub text_embeddings: String,
    pub latent: String,
    pub image: String,
    pub timestep: String,
    pub noise_pred: String,
}

impl Default for TensorNaming {
    fn default() -> Self {
        Self {
            input_ids: "input_ids".into(),
            attention_mask: "attention_mask".into(),
            encoder_hidden_states: "encoder_hidden_states".into(),
            logits: "logits".into(),
            start_logits: "start_logits".into(),
            end_logits: "end_logits".into(),
            past_key: "past_key_values.{layer}.key".into(),
            past_value: "past_key_values.{layer}.value".into(),
            present_key: "present.{layer}.key".into(),
            present_value: "present.{layer}.value".into(),
            text_embeddings: "encoder_hidden_states".into(),
            latent: "latent_sample".into(),
            image: "sample".into(),
            timestep: "timestep".into(),
            noise_pred: "noise_pred".into(),
        }
    }
}

impl TensorNaming {
    pub fn past_key(&self, layer: usize) -> String {
        self.past_key.replace("{layer}", &layer.to_string())
    }

    pub fn past_value(&self, layer: usize) -> String {
        self.past_value.replace("{layer}", &layer.to_string())
    }

    pub fn present_key(&self, layer: usize) -> String {
        self.present_key.replace("{layer}", &layer.to_string())
    }

    pub fn present_value(&self, layer: usize) -> String {
        self.present_value.replace("{layer}", &layer.to_string())
    }
}

/// Decoder geometry and special tokens for generation models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Number of decoder layers, one key/value pair cached per layer.
    pub num_layers: usize,
    pub vocab_size: usize,
    pub eos_token_id: i64,
    pub decoder_start_token_id: i64,
}

/// Latent-space geometry for diffusion models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffusionConfig {
    /// Channel count of the compressed latent representation.
    pub latent_channels: usize,
    /// Image-space pixels per latent-space pixel along each spatial axis.
    pub scale_factor: usize,
}

/// Immutable metadata describing one logical model.
///
/// Loaded at construction from the artifact bundle (or produced by the
/// conversion collaborator) and shared read-only by every adapter and
/// orchestrator built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub architecture: Architecture,
    pub task: Task,
    pub precision: Precision,
    #[serde(default)]
    pub naming: TensorNaming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<DecoderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffusion: Option<DiffusionConfig>,
}

impl ModelConfig {
    /// Checks internal consistency: architecture families must carry the
    /// sections their orchestrators read.
    pub fn validate(&self) -> Result<()> {
        match self.architecture {
            Architecture::Seq2Seq => {
                let decoder = self
                    .decoder
                    .as_ref()
                    .ok_or_else(|| Error::InvalidInput("seq2seq config missing decoder section".into()))?;
                if decoder.num_layers == 0 {
                    return Err(Error::InvalidInput("decoder must have at least one layer".into()));
                }
                if decoder.vocab_size == 0 {
                    return Err(Error::InvalidInput("decoder vocab must be non-empty".into()));
                }
            }
            Architecture::Diffusion => {
                let diffusion = self
                    .diffusion
                    .as_ref()
                    .ok_or_else(|| Error::InvalidInput("diffusion config missing diffusion section".into()))?;
                if diffusion.latent_channels == 0 || diffusion.scale_factor == 0 {
                    return Err(Error::InvalidInput("diffusion geometry must be non-zero".into()));
                }
            }
            Architecture::EncoderOnly | Architecture::Classification => {}
        }
        Ok(())
    }

    /// Serializes this config to the JSON stored in artifact bundles.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::InvalidInput(format!("config serialization failed: {e}")))
    }

    /// Parses a config from the JSON stored in artifact bundles.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidInput(format!("malformed model config: {e}")))
    }
}
