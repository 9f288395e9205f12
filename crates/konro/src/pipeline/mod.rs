//! # Pipeline Facade
//!
//! The externally visible entry point. A [`Pipeline`] is built once from a
//! model identifier — resolving graphs through a provider, wrapping them in
//! adapters, and selecting the orchestrator variant from the resolved
//! architecture — and then exposes task-shaped calls whose signatures match
//! the un-accelerated model interfaces callers already use. The graph
//! decomposition underneath is invisible.
//!
//! ## Lifecycle
//!
//! ```rust,ignore
//! let pipeline = Pipeline::builder(engine)
//!     .store(store)
//!     .tokenizer(tokenizer)
//!     .build("acme/marian-en-fr")?;
//!
//! let out = pipeline.translate("He never went out without a book.").await?;
//! pipeline.save(store.as_ref(), "acme/marian-en-fr-local")?;
//! ```
//!
//! Every collaborator — engine, store, exporter, tokenizer, sampler,
//! scheduler — is an explicit constructor parameter; there is no ambient
//! registry anywhere in the crate.

mod builder;
mod tokenizer;

pub use builder::PipelineBuilder;
pub use tokenizer::Tokenizer;

use crate::adapter::SingleGraphAdapter;
use crate::backend::ExecutionEngine;
use crate::config::{ModelConfig, Task};
use crate::error::{Error, Result};
use crate::provider::{ArtifactStore, GraphHandle, save_bundle};
use crate::tensor::ops::softmax;
use crate::tensor::{Tensor, TensorMap};
use std::sync::Arc;

#[cfg(feature = "seq2seq")]
use crate::seq2seq::{Seq2SeqOrchestrator, TokenStream};

#[cfg(feature = "diffusion")]
use crate::diffusion::{DiffusionOrchestrator, OutputKind, SynthesisParams};

/// A translated piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub translation_text: String,
}

/// An extracted answer span.
///
/// `start` and `end` are inclusive token positions within the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

/// A predicted class with its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label_id: usize,
    pub score: f32,
}

/// Images produced by a synthesis call, `(1, channel, height, width)` each.
#[derive(Debug, Clone)]
pub struct GeneratedImages {
    pub images: Vec<Tensor>,
}

/// Caller-facing parameters of an image synthesis call.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub num_inference_steps: usize,
    pub guidance_scale: f32,
    pub seed: u64,
    pub height: usize,
    pub width: usize,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            num_inference_steps: 50,
            guidance_scale: 7.5,
            seed: 0,
            height: 512,
            width: 512,
        }
    }
}

/// The orchestrator variant selected at construction.
pub(crate) enum PipelineKind {
    #[cfg(feature = "seq2seq")]
    Seq2Seq(Seq2SeqOrchestrator),
    Encoder(SingleGraphAdapter),
    #[cfg(feature = "diffusion")]
    Diffusion(DiffusionOrchestrator),
}

/// A ready-to-call model pipeline.
///
/// Owns the adapters (and through them the execution sessions) plus the
/// shared configuration for one orchestrator instance; dropping the
/// pipeline releases all of it.
pub struct Pipeline {
    config: Arc<ModelConfig>,
    kind: PipelineKind,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    /// Retained copies of the loaded graph artifacts, for persistence.
    artifacts: Vec<GraphHandle>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts building a pipeline on the given execution engine.
    pub fn builder(engine: Arc<dyn ExecutionEngine>) -> PipelineBuilder {
        PipelineBuilder::new(engine)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Persists the model config plus every owned graph artifact through
    /// the store, as one complete bundle.
    ///
    /// A pipeline saved here and rebuilt from the same store (with
    /// `export = false`) reproduces identical outputs on the same engine.
    pub fn save(&self, store: &dyn ArtifactStore, model_id: &str) -> Result<()> {
        save_bundle(store, model_id, &self.config, &self.artifacts)
    }

    fn tokenizer(&self) -> Result<&dyn Tokenizer> {
        self.tokenizer
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("pipeline was built without a tokenizer".into()))
    }

    fn require_task(&self, task: Task) -> Result<()> {
        if self.config.task == task {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "pipeline is built for {:?}, not {task:?}",
                self.config.task
            )))
        }
    }

    /// Translates `text`, decoding until the end token or the length cap.
    #[cfg(feature = "seq2seq")]
    pub async fn translate(&self, text: &str) -> Result<Translation> {
        self.require_task(Task::Translation)?;
        let PipelineKind::Seq2Seq(orchestrator) = &self.kind else {
            return Err(Error::InvalidInput("not a generation pipeline".into()));
        };
        let tokenizer = self.tokenizer()?;
        let input_ids = tokenizer.encode(text)?;
        let tokens = orchestrator.generate(input_ids).await?;
        Ok(Translation {
            translation_text: tokenizer.decode(&tokens)?,
        })
    }

    /// Like [`translate`](Self::translate) but streams tokens as they are
    /// generated instead of waiting for completion.
    #[cfg(feature = "seq2seq")]
    pub async fn translate_stream(&self, text: &str) -> Result<TokenStream> {
        self.require_task(Task::Translation)?;
        let PipelineKind::Seq2Seq(orchestrator) = &self.kind else {
            return Err(Error::InvalidInput("not a generation pipeline".into()));
        };
        let input_ids = self.tokenizer()?.encode(text)?;
        Ok(orchestrator.submit(input_ids).await)
    }

    /// Extracts the answer span for `question` from `context`.
    pub async fn question_answer(&self, question: &str, context: &str) -> Result<Answer> {
        self.require_task(Task::QuestionAnswering)?;
        let PipelineKind::Encoder(adapter) = &self.kind else {
            return Err(Error::InvalidInput("not an extraction pipeline".into()));
        };
        let tokenizer = self.tokenizer()?;
        let question_ids = tokenizer.encode(question)?;
        let context_ids = tokenizer.encode(context)?;
        if question_ids.is_empty() || context_ids.is_empty() {
            return Err(Error::InvalidInput("question and context must be non-empty".into()));
        }
        let context_offset = question_ids.len();
        let ids = [question_ids, context_ids].concat();

        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), Tensor::from_i64(vec![1, ids.len()], ids.clone())?);
        inputs.insert(
            naming.attention_mask.clone(),
            Tensor::from_i64(vec![1, ids.len()], vec![1; ids.len()])?,
        );
        let outputs = adapter.forward(&inputs)?;

        let start_probs = span_probs(&outputs, &naming.start_logits)?;
        let end_probs = span_probs(&outputs, &naming.end_logits)?;

        // best (start, end) span within the context, start <= end
        let mut best = (context_offset, context_offset, f32::NEG_INFINITY);
        for start in context_offset..ids.len() {
            for end in start..ids.len() {
                let score = start_probs[start] * end_probs[end];
                if score > best.2 {
                    best = (start, end, score);
                }
            }
        }
        let (start, end, score) = best;

        Ok(Answer {
            answer: tokenizer.decode(&ids[start..=end])?,
            score,
            start: start - context_offset,
            end: end - context_offset,
        })
    }

    /// Classifies `text`, returning the best label and its probability.
    pub async fn classify(&self, text: &str) -> Result<Classification> {
        self.require_task(Task::TextClassification)?;
        let PipelineKind::Encoder(adapter) = &self.kind else {
            return Err(Error::InvalidInput("not a classification pipeline".into()));
        };
        let ids = self.tokenizer()?.encode(text)?;
        if ids.is_empty() {
            return Err(Error::InvalidInput("input sequence is empty".into()));
        }

        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), Tensor::from_i64(vec![1, ids.len()], ids.clone())?);
        inputs.insert(
            naming.attention_mask.clone(),
            Tensor::from_i64(vec![1, ids.len()], vec![1; ids.len()])?,
        );
        let outputs = adapter.forward(&inputs)?;
        let probs = span_probs(&outputs, &naming.logits)?;

        let (label_id, score) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| Error::InvalidInput("classifier produced no labels".into()))?;
        Ok(Classification { label_id, score })
    }

    /// Synthesizes images from a prompt.
    #[cfg(feature = "diffusion")]
    pub async fn text_to_image(&self, request: &ImageRequest) -> Result<GeneratedImages> {
        let (orchestrator, params) = self.synthesis(request)?;
        let image = orchestrator.text_to_image(&params).await?.into_image()?;
        Ok(GeneratedImages { images: vec![image] })
    }

    /// Reworks an existing image towards a prompt.
    #[cfg(feature = "diffusion")]
    pub async fn image_to_image(
        &self,
        image: &Tensor,
        strength: f32,
        request: &ImageRequest,
    ) -> Result<GeneratedImages> {
        let (orchestrator, params) = self.synthesis(request)?;
        let image = orchestrator.image_to_image(image, strength, &params).await?.into_image()?;
        Ok(GeneratedImages { images: vec![image] })
    }

    /// Repaints the masked region of an image towards a prompt.
    #[cfg(feature = "diffusion")]
    pub async fn inpaint(&self, image: &Tensor, mask: &Tensor, request: &ImageRequest) -> Result<GeneratedImages> {
        let (orchestrator, params) = self.synthesis(request)?;
        let image = orchestrator.inpaint(image, mask, &params).await?.into_image()?;
        Ok(GeneratedImages { images: vec![image] })
    }

    #[cfg(feature = "diffusion")]
    fn synthesis(&self, request: &ImageRequest) -> Result<(&DiffusionOrchestrator, SynthesisParams)> {
        self.require_task(Task::TextToImage)?;
        let PipelineKind::Diffusion(orchestrator) = &self.kind else {
            return Err(Error::InvalidInput("not a synthesis pipeline".into()));
        };
        let tokenizer = self.tokenizer()?;
        let params = SynthesisParams {
            prompt_ids: tokenizer.encode(&request.prompt)?,
            negative_prompt_ids: request
                .negative_prompt
                .as_deref()
                .map(|p| tokenizer.encode(p))
                .transpose()?,
            steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
            height: request.height,
            width: request.width,
            output: OutputKind::Image,
        };
        Ok((orchestrator, params))
    }
}

/// Softmaxed probabilities of a `(1, n)` logits output.
fn span_probs(outputs: &TensorMap, name: &str) -> Result<Vec<f32>> {
    let logits = outputs.get(name).ok_or_else(|| Error::Session(format!("missing output tensor '{name}'")))?;
    Ok(softmax(logits.f32_data()?))
}

#[cfg(test)]
mod test_support {
    use super::Tokenizer;
    use crate::error::{Error, Result};
    use std::collections::HashMap;

    /// A whitespace vocabulary tokenizer: id 0 is the decoder start token,
    /// id 1 the end token, words follow in first-seen order.
    pub(crate) struct WordTokenizer {
        vocab: Vec<String>,
        index: HashMap<String, i64>,
    }

    impl WordTokenizer {
        pub fn new(sentences: &[&str]) -> Self {
            let mut vocab: Vec<String> = vec!["<start>".into(), "<eos>".into()];
            for sentence in sentences {
                for word in sentence.split_whitespace() {
                    if !vocab.iter().any(|w| w == word) {
                        vocab.push(word.into());
                    }
                }
            }
            let index = vocab
                .iter()
                .enumerate()
                .map(|(i, w)| (w.clone(), i as i64))
                .collect();
            Self { vocab, index }
        }

        pub fn vocab_size(&self) -> usize {
            self.vocab.len()
        }

        /// Panicking encode for test setup.
        pub fn ids(&self, text: &str) -> Vec<i64> {
            self.encode(text).unwrap()
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<i64>> {
            text.split_whitespace()
                .map(|word| {
                    self.index
                        .get(word)
                        .copied()
                        .ok_or_else(|| Error::InvalidInput(format!("word '{word}' not in vocabulary")))
                })
                .collect()
        }

        fn decode(&self, ids: &[i64]) -> Result<String> {
            let words: Result<Vec<&str>> = ids
                .iter()
                .map(|&id| {
                    self.vocab
                        .get(id as usize)
                        .map(String::as_str)
                        .ok_or_else(|| Error::InvalidInput(format!("id {id} not in vocabulary")))
                })
                .collect();
            Ok(words?.join(" "))
        }
    }
}
