//! Pipeline construction: resolve, adapt, orchestrate.

use super::tokenizer::Tokenizer;
use super::{Pipeline, PipelineKind};
use crate::adapter::{SingleGraphAdapter, find_handle};
use crate::backend::ExecutionEngine;
use crate::config::{Architecture, GraphRole, ModelConfig};
use crate::error::{Error, Result};
use crate::provider::{
    ArtifactProvider, ArtifactStore, DEFAULT_REVISION, ExportingProvider, GraphExporter, GraphHandle,
    GraphProvider,
};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "seq2seq")]
use crate::seq2seq::{GenerationConfig, Greedy, Sampler, Seq2SeqOrchestrator};

#[cfg(feature = "seq2seq")]
use crate::adapter::Seq2SeqAdapter;

#[cfg(feature = "diffusion")]
use crate::diffusion::{DiffusionOrchestrator, LinearScheduler, Scheduler};

/// Builds a [`Pipeline`] from a model identifier.
///
/// The `export` flag picks between the two graph-provider implementations:
/// `false` resolves pre-built artifacts from the configured store, `true`
/// converts the source checkpoint through the configured exporter. The
/// orchestrator variant is selected once from the resolved config's
/// architecture, never re-dispatched per call.
pub struct PipelineBuilder {
    engine: Arc<dyn ExecutionEngine>,
    store: Option<Arc<dyn ArtifactStore>>,
    exporter: Option<Arc<dyn GraphExporter>>,
    export: bool,
    revision: String,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    max_new_tokens: Option<usize>,
    #[cfg(feature = "seq2seq")]
    sampler: Option<Arc<dyn Sampler>>,
    #[cfg(feature = "diffusion")]
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl PipelineBuilder {
    pub(super) fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            store: None,
            exporter: None,
            export: false,
            revision: DEFAULT_REVISION.into(),
            tokenizer: None,
            max_new_tokens: None,
            #[cfg(feature = "seq2seq")]
            sampler: None,
            #[cfg(feature = "diffusion")]
            scheduler: None,
        }
    }

    /// The artifact store used for loading with `export = false` and for
    /// persistence.
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The conversion collaborator used when `export = true`.
    pub fn exporter(mut self, exporter: Arc<dyn GraphExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Convert the source checkpoint on load instead of resolving
    /// pre-built artifacts.
    pub fn export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Overrides the generation length cap for seq2seq pipelines.
    pub fn max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = Some(max_new_tokens);
        self
    }

    /// Overrides the token selection strategy for seq2seq pipelines.
    #[cfg(feature = "seq2seq")]
    pub fn sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Overrides the noise schedule for diffusion pipelines.
    #[cfg(feature = "diffusion")]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Resolves `model_id` and builds the pipeline.
    ///
    /// Must be called within a tokio runtime; generation pipelines spawn
    /// their worker here.
    pub fn build(self, model_id: &str) -> Result<Pipeline> {
        let (config, handles) = if self.export {
            let exporter = self
                .exporter
                .clone()
                .ok_or_else(|| Error::InvalidInput("export requested without an exporter".into()))?;
            ExportingProvider::new(exporter).load(model_id, &self.revision)?
        } else {
            let store = self
                .store
                .clone()
                .ok_or_else(|| Error::InvalidInput("loading artifacts requires a store".into()))?;
            ArtifactProvider::new(store).load(model_id, &self.revision)?
        };
        config.validate()?;
        let config = Arc::new(config);
        let artifacts = handles.clone();

        let kind = match config.architecture {
            Architecture::Seq2Seq => self.build_seq2seq(&config, &handles)?,
            Architecture::EncoderOnly | Architecture::Classification => PipelineKind::Encoder(
                SingleGraphAdapter::load(self.engine.as_ref(), find_handle(&handles, GraphRole::Encoder)?)?,
            ),
            Architecture::Diffusion => self.build_diffusion(&config, &handles)?,
        };

        info!(model_id, architecture = ?config.architecture, task = ?config.task, "pipeline ready");
        Ok(Pipeline {
            config,
            kind,
            tokenizer: self.tokenizer,
            artifacts,
        })
    }

    #[cfg(feature = "seq2seq")]
    fn build_seq2seq(&self, config: &Arc<ModelConfig>, handles: &[GraphHandle]) -> Result<PipelineKind> {
        let adapter = Seq2SeqAdapter::load(self.engine.as_ref(), config.clone(), handles)?;
        let decoder = config.decoder.as_ref().expect("validated before dispatch");
        let generation = GenerationConfig {
            max_new_tokens: self.max_new_tokens.unwrap_or(256),
            eos_token_id: Some(decoder.eos_token_id),
            decoder_start_token_id: decoder.decoder_start_token_id,
        };
        let sampler: Arc<dyn Sampler> = self.sampler.clone().unwrap_or_else(|| Arc::new(Greedy));
        Ok(PipelineKind::Seq2Seq(Seq2SeqOrchestrator::new(adapter, sampler, generation)))
    }

    #[cfg(not(feature = "seq2seq"))]
    fn build_seq2seq(&self, _config: &Arc<ModelConfig>, _handles: &[GraphHandle]) -> Result<PipelineKind> {
        Err(Error::InvalidInput(
            "this build carries no seq2seq support (enable the `seq2seq` feature)".into(),
        ))
    }

    #[cfg(feature = "diffusion")]
    fn build_diffusion(&self, config: &Arc<ModelConfig>, handles: &[GraphHandle]) -> Result<PipelineKind> {
        let scheduler: Arc<dyn Scheduler> = self.scheduler.clone().unwrap_or_else(|| Arc::new(LinearScheduler));
        let orchestrator = DiffusionOrchestrator::load(self.engine.as_ref(), config.clone(), handles, scheduler)?;
        Ok(PipelineKind::Diffusion(orchestrator))
    }

    #[cfg(not(feature = "diffusion"))]
    fn build_diffusion(&self, _config: &Arc<ModelConfig>, _handles: &[GraphHandle]) -> Result<PipelineKind> {
        Err(Error::InvalidInput(
            "this build carries no diffusion support (enable the `diffusion` feature)".into(),
        ))
    }
}
