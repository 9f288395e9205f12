//! The base + refiner two-pipeline composition.

use super::orchestrator::{DiffusionOrchestrator, OutputKind, Synthesis, SynthesisParams};
use super::scheduler::validate_strength;
use crate::error::Result;
use tracing::debug;

/// Chains two diffusion pipelines: the base runs with latent output and
/// short-circuits before its decoder; its raw latent becomes the refiner's
/// starting latent, skipping the refiner's own noise/encode stage.
///
/// The hand-off is shape-checked by the refiner; a base latent that does
/// not match the refiner's expected geometry fails with `ShapeMismatch`
/// rather than being silently reshaped.
pub struct BaseRefiner {
    base: DiffusionOrchestrator,
    refiner: DiffusionOrchestrator,
    refiner_strength: f32,
}

impl BaseRefiner {
    /// `refiner_strength` in `(0, 1]` is the fraction of the refiner's
    /// schedule that runs over the handed-off latent.
    pub fn new(
        base: DiffusionOrchestrator,
        refiner: DiffusionOrchestrator,
        refiner_strength: f32,
    ) -> Result<Self> {
        validate_strength(refiner_strength)?;
        Ok(Self {
            base,
            refiner,
            refiner_strength,
        })
    }

    /// Runs the full two-pipeline workflow.
    pub async fn text_to_image(&self, params: &SynthesisParams) -> Result<Synthesis> {
        let base_params = SynthesisParams {
            output: OutputKind::Latent,
            ..params.clone()
        };
        let latent = self.base.text_to_image(&base_params).await?.into_latent()?;
        debug!(shape = ?latent.shape(), "base latent handed to refiner");
        self.refiner
            .refine_from_latent(latent, self.refiner_strength, params)
            .await
    }
}
