//! The stage-sequencing core of the diffusion workflows.

use super::scheduler::{Scheduler, validate_strength};
use crate::adapter::{SingleGraphAdapter, find_handle, take_output};
use crate::backend::ExecutionEngine;
use crate::config::{DiffusionConfig, GraphRole, ModelConfig};
use crate::error::{Error, Result};
use crate::provider::GraphHandle;
use crate::tensor::ops::{ensure_finite, token_tensor};
use crate::tensor::{Tensor, TensorMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a synthesis call hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Decode the final latent into image space.
    Image,
    /// Short-circuit before the latent decoder and return the raw latent,
    /// e.g. to hand it to a refiner pipeline.
    Latent,
}

/// Parameters shared by every synthesis workflow.
#[derive(Debug, Clone)]
pub struct SynthesisParams {
    /// Tokenized prompt. Tokenization itself lives outside this crate.
    pub prompt_ids: Vec<i64>,
    /// Tokenized negative prompt for classifier-free guidance. When absent
    /// the unconditional pass uses a zero-token prompt of equal length.
    pub negative_prompt_ids: Option<Vec<i64>>,
    /// Denoise loop length.
    pub steps: usize,
    /// Classifier-free guidance strength; values above 1 enable the
    /// second, unconditional denoiser pass per step.
    pub guidance_scale: f32,
    /// Seed for the initial latent noise; fixed seed, fixed output.
    pub seed: u64,
    /// Image-space output height in pixels.
    pub height: usize,
    /// Image-space output width in pixels.
    pub width: usize,
    pub output: OutputKind,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            prompt_ids: Vec::new(),
            negative_prompt_ids: None,
            steps: 50,
            guidance_scale: 7.5,
            seed: 0,
            height: 512,
            width: 512,
            output: OutputKind::Image,
        }
    }
}

/// The result of one synthesis call.
#[derive(Debug, Clone)]
pub enum Synthesis {
    Image(Tensor),
    Latent(Tensor),
}

impl Synthesis {
    pub fn into_image(self) -> Result<Tensor> {
        match self {
            Synthesis::Image(image) => Ok(image),
            Synthesis::Latent(_) => Err(Error::InvalidInput("synthesis produced a latent, not an image".into())),
        }
    }

    pub fn into_latent(self) -> Result<Tensor> {
        match self {
            Synthesis::Latent(latent) => Ok(latent),
            Synthesis::Image(_) => Err(Error::InvalidInput("synthesis produced an image, not a latent".into())),
        }
    }
}

/// Composes the four diffusion stages into synthesis workflows.
///
/// The orchestrator owns one adapter per stage plus the scheduler seam;
/// every workflow is a fixed sequence over those collaborators. Latents
/// live only on the call frame and are never persisted.
pub struct DiffusionOrchestrator {
    config: Arc<ModelConfig>,
    text_encoder: SingleGraphAdapter,
    denoiser: SingleGraphAdapter,
    latent_encoder: SingleGraphAdapter,
    latent_decoder: SingleGraphAdapter,
    scheduler: Arc<dyn Scheduler>,
}

impl DiffusionOrchestrator {
    /// Loads all four graphs of a resolved bundle into `engine`.
    pub fn load(
        engine: &dyn ExecutionEngine,
        config: Arc<ModelConfig>,
        handles: &[GraphHandle],
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        let text_encoder = SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::TextEncoder)?)?;
        let denoiser = SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::Denoiser)?)?;
        let latent_encoder =
            SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::LatentEncoder)?)?;
        let latent_decoder =
            SingleGraphAdapter::load(engine, find_handle(handles, GraphRole::LatentDecoder)?)?;
        Self::from_adapters(config, text_encoder, denoiser, latent_encoder, latent_decoder, scheduler)
    }

    /// Builds the orchestrator from already-constructed stage adapters.
    pub fn from_adapters(
        config: Arc<ModelConfig>,
        text_encoder: SingleGraphAdapter,
        denoiser: SingleGraphAdapter,
        latent_encoder: SingleGraphAdapter,
        latent_decoder: SingleGraphAdapter,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        if config.diffusion.is_none() {
            return Err(Error::InvalidInput("diffusion config missing diffusion section".into()));
        }
        Ok(Self {
            config,
            text_encoder,
            denoiser,
            latent_encoder,
            latent_decoder,
            scheduler,
        })
    }

    fn diffusion_cfg(&self) -> &DiffusionConfig {
        self.config.diffusion.as_ref().expect("checked at construction")
    }

    /// The graph handles this orchestrator owns, in bundle order.
    pub fn graph_handles(&self) -> Vec<GraphHandle> {
        vec![
            self.text_encoder.handle().clone(),
            self.denoiser.handle().clone(),
            self.latent_encoder.handle().clone(),
            self.latent_decoder.handle().clone(),
        ]
    }

    /// Text encoder, denoise loop from noise, latent decoder.
    pub async fn text_to_image(&self, params: &SynthesisParams) -> Result<Synthesis> {
        self.validate(params)?;
        let (cond, uncond) = self.encode_prompts(params)?;
        let latent = noise_latent(&self.latent_shape(params.height, params.width), params.seed)?;
        let latent = self.denoise(latent, &cond, uncond.as_ref(), params, 0, None)?;
        self.finish(latent, params.output)
    }

    /// Latent encoder over the input image, partial denoise loop, decoder.
    ///
    /// `strength` in `(0, 1]` controls how much of the schedule runs; 1.0
    /// traverses the full range, starting from pure noise derived from the
    /// input image's latent.
    pub async fn image_to_image(
        &self,
        image: &Tensor,
        strength: f32,
        params: &SynthesisParams,
    ) -> Result<Synthesis> {
        validate_strength(strength)?;
        self.validate_image(image)?;
        self.validate(params)?;

        let (cond, uncond) = self.encode_prompts(params)?;
        let original = self.encode_image(image)?;
        let noise = noise_latent(original.shape(), params.seed)?;
        let start = self.scheduler.start_step(strength, params.steps);
        debug!(strength, start, steps = params.steps, "image-to-image partial schedule");
        let latent = self.scheduler.add_noise(&original, &noise, start, params.steps)?;
        let latent = self.denoise(latent, &cond, uncond.as_ref(), params, start, None)?;
        self.finish(latent, params.output)
    }

    /// Image-to-image that only repaints the masked region.
    ///
    /// The mask is `(1, 1, height, width)` with 1 where the image should be
    /// repainted; it is resized to latent resolution and every denoise step
    /// blends the denoised latent with the original latent outside it.
    pub async fn inpaint(
        &self,
        image: &Tensor,
        mask: &Tensor,
        params: &SynthesisParams,
    ) -> Result<Synthesis> {
        self.validate_image(image)?;
        if mask.rank() != 4
            || mask.shape()[0] != 1
            || mask.shape()[1] != 1
            || &mask.shape()[2..] != &image.shape()[2..]
        {
            return Err(Error::ShapeMismatch {
                name: "mask".into(),
                expected: format!("[1, 1, {}, {}]", image.shape()[2], image.shape()[3]),
                actual: format!("{:?}", mask.shape()),
            });
        }
        self.validate(params)?;

        let (cond, uncond) = self.encode_prompts(params)?;
        let original = self.encode_image(image)?;
        let latent_mask = mask.downsample_nearest(self.diffusion_cfg().scale_factor)?;
        let noise = noise_latent(original.shape(), params.seed)?;
        let latent = self.scheduler.add_noise(&original, &noise, 0, params.steps)?;
        let latent =
            self.denoise(latent, &cond, uncond.as_ref(), params, 0, Some((&latent_mask, &original, &noise)))?;
        self.finish(latent, params.output)
    }

    /// Continues denoising from a latent produced elsewhere, skipping this
    /// pipeline's own noise/encode stage. The base+refiner composition
    /// enters here.
    pub async fn refine_from_latent(
        &self,
        latent: Tensor,
        strength: f32,
        params: &SynthesisParams,
    ) -> Result<Synthesis> {
        validate_strength(strength)?;
        self.validate(params)?;

        // the handed-off latent must already match this pipeline's
        // geometry; reshaping it silently would hide a wiring bug
        let expected = self.latent_shape(params.height, params.width);
        if latent.shape() != expected {
            return Err(Error::ShapeMismatch {
                name: "starting latent".into(),
                expected: format!("{expected:?}"),
                actual: format!("{:?}", latent.shape()),
            });
        }

        let (cond, uncond) = self.encode_prompts(params)?;
        let start = self.scheduler.start_step(strength, params.steps);
        debug!(strength, start, steps = params.steps, "refining from handed-off latent");
        let latent = self.denoise(latent, &cond, uncond.as_ref(), params, start, None)?;
        self.finish(latent, params.output)
    }

    fn validate(&self, params: &SynthesisParams) -> Result<()> {
        if params.prompt_ids.is_empty() {
            return Err(Error::InvalidInput("prompt is empty".into()));
        }
        if params.steps == 0 {
            return Err(Error::InvalidInput("steps must be non-zero".into()));
        }
        if !params.guidance_scale.is_finite() || params.guidance_scale < 0.0 {
            return Err(Error::InvalidInput(format!(
                "guidance scale must be finite and non-negative, got {}",
                params.guidance_scale
            )));
        }
        let scale = self.diffusion_cfg().scale_factor;
        if params.height == 0 || params.width == 0 || params.height % scale != 0 || params.width % scale != 0 {
            return Err(Error::InvalidInput(format!(
                "image dimensions {}x{} must be positive multiples of {scale}",
                params.height, params.width
            )));
        }
        Ok(())
    }

    fn validate_image(&self, image: &Tensor) -> Result<()> {
        let scale = self.diffusion_cfg().scale_factor;
        if image.rank() != 4 || image.shape()[0] != 1 {
            return Err(Error::ShapeMismatch {
                name: "image".into(),
                expected: "[1, channels, height, width]".into(),
                actual: format!("{:?}", image.shape()),
            });
        }
        if image.shape()[2] % scale != 0 || image.shape()[3] % scale != 0 {
            return Err(Error::ShapeMismatch {
                name: "image".into(),
                expected: format!("spatial dims divisible by {scale}"),
                actual: format!("{}x{}", image.shape()[2], image.shape()[3]),
            });
        }
        Ok(())
    }

    fn latent_shape(&self, height: usize, width: usize) -> Vec<usize> {
        let cfg = self.diffusion_cfg();
        vec![
            1,
            cfg.latent_channels,
            height / cfg.scale_factor,
            width / cfg.scale_factor,
        ]
    }

    fn encode_prompts(&self, params: &SynthesisParams) -> Result<(Tensor, Option<Tensor>)> {
        let cond = self.encode_prompt(&params.prompt_ids)?;
        if params.guidance_scale <= 1.0 {
            return Ok((cond, None));
        }
        let uncond_ids = params
            .negative_prompt_ids
            .clone()
            .unwrap_or_else(|| vec![0; params.prompt_ids.len()]);
        let uncond = self.encode_prompt(&uncond_ids)?;
        Ok((cond, Some(uncond)))
    }

    fn encode_prompt(&self, ids: &[i64]) -> Result<Tensor> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.input_ids.clone(), token_tensor(ids)?);
        let mut outputs = self.text_encoder.forward(&inputs)?;
        take_output(&mut outputs, &naming.text_embeddings, GraphRole::TextEncoder)
    }

    fn encode_image(&self, image: &Tensor) -> Result<Tensor> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.image.clone(), image.clone());
        let mut outputs = self.latent_encoder.forward(&inputs)?;
        take_output(&mut outputs, &naming.latent, GraphRole::LatentEncoder)
    }

    fn decode_latent(&self, latent: &Tensor) -> Result<Tensor> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.latent.clone(), latent.clone());
        let mut outputs = self.latent_decoder.forward(&inputs)?;
        take_output(&mut outputs, &naming.image, GraphRole::LatentDecoder)
    }

    /// The denoise loop. Spatial dimensions stay fixed; only values evolve.
    fn denoise(
        &self,
        mut latent: Tensor,
        cond: &Tensor,
        uncond: Option<&Tensor>,
        params: &SynthesisParams,
        start_step: usize,
        inpaint: Option<(&Tensor, &Tensor, &Tensor)>,
    ) -> Result<Tensor> {
        let shape = latent.shape().to_vec();
        for step in start_step..params.steps {
            let noise_pred = self.predict_noise(&latent, step, params, cond, uncond)?;
            latent = self.scheduler.step(&noise_pred, step, params.steps, &latent)?;
            ensure_finite("denoised latent", &latent)?;
            if latent.shape() != shape {
                return Err(Error::ShapeMismatch {
                    name: "denoised latent".into(),
                    expected: format!("{shape:?}"),
                    actual: format!("{:?}", latent.shape()),
                }
                .in_stage(GraphRole::Denoiser));
            }

            // outside the mask the latent tracks the original at the
            // current noise level, converging to it exactly by the end
            if let Some((mask, original, noise)) = inpaint {
                let reference = self.scheduler.add_noise(original, noise, step + 1, params.steps)?;
                latent = latent.blend(&reference, mask)?;
            }
            trace!(step, total = params.steps, "denoise step complete");
        }
        Ok(latent)
    }

    fn predict_noise(
        &self,
        latent: &Tensor,
        step: usize,
        params: &SynthesisParams,
        cond: &Tensor,
        uncond: Option<&Tensor>,
    ) -> Result<Tensor> {
        let timestep = self.scheduler.timestep(step, params.steps);
        let conditional = self.run_denoiser(latent, timestep, cond)?;
        let Some(uncond) = uncond else {
            return Ok(conditional);
        };
        let unconditional = self.run_denoiser(latent, timestep, uncond)?;
        // classifier-free guidance: push the prediction away from the
        // unconditional direction
        unconditional.add(&conditional.sub(&unconditional)?.scale(params.guidance_scale)?)
    }

    fn run_denoiser(&self, latent: &Tensor, timestep: f32, context: &Tensor) -> Result<Tensor> {
        let naming = &self.config.naming;
        let mut inputs = TensorMap::new();
        inputs.insert(naming.latent.clone(), latent.clone());
        inputs.insert(naming.timestep.clone(), Tensor::from_f32(vec![1], vec![timestep])?);
        inputs.insert(naming.text_embeddings.clone(), context.clone());
        let mut outputs = self.denoiser.forward(&inputs)?;
        take_output(&mut outputs, &naming.noise_pred, GraphRole::Denoiser)
    }

    fn finish(&self, latent: Tensor, output: OutputKind) -> Result<Synthesis> {
        match output {
            OutputKind::Latent => Ok(Synthesis::Latent(latent)),
            OutputKind::Image => self.decode_latent(&latent).map(Synthesis::Image),
        }
    }
}

/// Standard-normal noise for the initial latent, deterministic per seed.
fn noise_latent(shape: &[usize], seed: u64) -> Result<Tensor> {
    let n: usize = shape.iter().product();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(n + 1);
    while data.len() < n {
        // Box-Muller transform over two uniforms
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen_range(0.0..1.0);
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f32::consts::PI * u2;
        data.push(radius * angle.cos());
        data.push(radius * angle.sin());
    }
    data.truncate(n);
    Tensor::from_f32(shape.to_vec(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TensorSpec;
    use crate::backend::mock::MockEngine;
    use crate::config::{Architecture, Precision, Task, TensorNaming};
    use crate::diffusion::scheduler::LinearScheduler;
    use crate::tensor::DType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCALE: usize = 8;
    const CHANNELS: usize = 3;

    #[derive(Clone, Default)]
    struct Counters {
        denoiser: Arc<AtomicUsize>,
        decoder: Arc<AtomicUsize>,
    }

    fn config() -> Arc<ModelConfig> {
        Arc::new(ModelConfig {
            architecture: Architecture::Diffusion,
            task: Task::TextToImage,
            precision: Precision::F32,
            naming: TensorNaming::default(),
            decoder: None,
            diffusion: Some(DiffusionConfig {
                latent_channels: CHANNELS,
                scale_factor: SCALE,
            }),
        })
    }

    /// A mock bundle shaped like a latent diffusion model: the denoiser
    /// predicts zero noise, the latent codec is nearest-neighbor resampling.
    fn engine(counters: &Counters, nan_denoiser: bool) -> MockEngine {
        let engine = MockEngine::new();

        engine.register(
            GraphRole::TextEncoder,
            vec![TensorSpec::new("input_ids", DType::I64, 2)],
            vec![TensorSpec::new("encoder_hidden_states", DType::F32, 3)],
            |inputs| {
                let ids = inputs["input_ids"].i64_data()?.to_vec();
                let mut out = TensorMap::new();
                out.insert(
                    "encoder_hidden_states".into(),
                    Tensor::from_f32(vec![1, ids.len(), 1], ids.iter().map(|&i| i as f32).collect())?,
                );
                Ok(out)
            },
        );

        let denoiser_calls = counters.denoiser.clone();
        engine.register(
            GraphRole::Denoiser,
            vec![
                TensorSpec::new("latent_sample", DType::F32, 4),
                TensorSpec::new("timestep", DType::F32, 1),
                TensorSpec::new("encoder_hidden_states", DType::F32, 3),
            ],
            vec![TensorSpec::new("noise_pred", DType::F32, 4)],
            move |inputs| {
                denoiser_calls.fetch_add(1, Ordering::SeqCst);
                let latent = &inputs["latent_sample"];
                let pred = if nan_denoiser {
                    Tensor::full(latent.shape().to_vec(), f32::NAN)
                } else {
                    Tensor::zeros(latent.shape().to_vec(), DType::F32)
                };
                let mut out = TensorMap::new();
                out.insert("noise_pred".into(), pred);
                Ok(out)
            },
        );

        engine.register(
            GraphRole::LatentEncoder,
            vec![TensorSpec::new("sample", DType::F32, 4)],
            vec![TensorSpec::new("latent_sample", DType::F32, 4)],
            |inputs| {
                let mut out = TensorMap::new();
                out.insert("latent_sample".into(), inputs["sample"].downsample_nearest(SCALE)?);
                Ok(out)
            },
        );

        let decoder_calls = counters.decoder.clone();
        engine.register(
            GraphRole::LatentDecoder,
            vec![TensorSpec::new("latent_sample", DType::F32, 4)],
            vec![TensorSpec::new("sample", DType::F32, 4)],
            move |inputs| {
                decoder_calls.fetch_add(1, Ordering::SeqCst);
                let mut out = TensorMap::new();
                out.insert("sample".into(), inputs["latent_sample"].upsample_nearest(SCALE)?);
                Ok(out)
            },
        );

        engine
    }

    fn handles() -> Vec<GraphHandle> {
        Architecture::Diffusion
            .expected_roles()
            .iter()
            .map(|&role| GraphHandle { role, bytes: vec![0] })
            .collect()
    }

    fn orchestrator(counters: &Counters) -> DiffusionOrchestrator {
        let engine = engine(counters, false);
        DiffusionOrchestrator::load(&engine, config(), &handles(), Arc::new(LinearScheduler)).unwrap()
    }

    fn params() -> SynthesisParams {
        SynthesisParams {
            prompt_ids: vec![2, 3],
            steps: 4,
            guidance_scale: 1.0,
            seed: 7,
            height: 64,
            width: 64,
            ..Default::default()
        }
    }

    /// An image built from constant 8x8 blocks survives the mock latent
    /// codec exactly, which keeps the inpainting test sharp.
    fn block_image(left: f32, right: f32) -> Tensor {
        let mut data = Vec::with_capacity(CHANNELS * 64 * 64);
        for _c in 0..CHANNELS {
            for _y in 0..64 {
                for x in 0..64 {
                    data.push(if x < 32 { left } else { right });
                }
            }
        }
        Tensor::from_f32(vec![1, CHANNELS, 64, 64], data).unwrap()
    }

    fn right_half_mask() -> Tensor {
        let mut data = Vec::with_capacity(64 * 64);
        for _y in 0..64 {
            for x in 0..64 {
                data.push(if x < 32 { 0.0 } else { 1.0 });
            }
        }
        Tensor::from_f32(vec![1, 1, 64, 64], data).unwrap()
    }

    #[tokio::test]
    async fn test_text_to_image_dimensions_and_stage_counts() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);

        let image = orchestrator.text_to_image(&params()).await.unwrap().into_image().unwrap();
        assert_eq!(image.shape(), &[1, CHANNELS, 64, 64]);
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 4);
        assert_eq!(counters.decoder.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guidance_doubles_denoiser_passes() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);

        let mut params = params();
        params.guidance_scale = 7.5;
        orchestrator.text_to_image(&params).await.unwrap();
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_latent_output_short_circuits_decoder() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);

        let mut params = params();
        params.output = OutputKind::Latent;
        let latent = orchestrator.text_to_image(&params).await.unwrap().into_latent().unwrap();
        assert_eq!(latent.shape(), &[1, CHANNELS, 8, 8]);
        assert_eq!(counters.decoder.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_strength_fails_before_any_session_call() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);
        let image = block_image(1.0, 1.0);

        for strength in [0.0, -1.0, 1.5, f32::NAN] {
            let err = orchestrator
                .image_to_image(&image, strength, &params())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_strength_traverses_every_step() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);
        let image = block_image(1.0, 2.0);

        orchestrator.image_to_image(&image, 1.0, &params()).await.unwrap();
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_half_strength_runs_half_the_schedule() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);
        let image = block_image(1.0, 2.0);

        orchestrator.image_to_image(&image, 0.5, &params()).await.unwrap();
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mismatched_mask_fails_before_any_session_call() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);
        let image = block_image(1.0, 2.0);
        let mask = Tensor::zeros(vec![1, 1, 32, 32], DType::F32);

        let err = orchestrator.inpaint(&image, &mask, &params()).await.unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(counters.denoiser.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inpaint_preserves_unmasked_region() {
        let counters = Counters::default();
        let orchestrator = orchestrator(&counters);
        let image = block_image(0.25, 0.75);
        let mask = right_half_mask();

        let out = orchestrator
            .inpaint(&image, &mask, &params())
            .await
            .unwrap()
            .into_image()
            .unwrap();

        assert_eq!(out.shape(), image.shape());
        let original = image.f32_data().unwrap();
        let painted = out.f32_data().unwrap();
        for c in 0..CHANNELS {
            for y in 0..64 {
                for x in 0..32 {
                    let i = (c * 64 + y) * 64 + x;
                    assert!(
                        (painted[i] - original[i]).abs() < 1e-5,
                        "pixel ({c},{y},{x}) drifted: {} vs {}",
                        painted[i],
                        original[i]
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_non_finite_latent_is_numerical_error() {
        let counters = Counters::default();
        let engine = engine(&counters, true);
        let orchestrator =
            DiffusionOrchestrator::load(&engine, config(), &handles(), Arc::new(LinearScheduler)).unwrap();

        let err = orchestrator.text_to_image(&params()).await.unwrap_err();
        assert!(matches!(err, Error::Numerical(_)));
    }

    #[tokio::test]
    async fn test_fixed_seed_is_deterministic() {
        let orchestrator = orchestrator(&Counters::default());

        let first = orchestrator.text_to_image(&params()).await.unwrap().into_image().unwrap();
        let second = orchestrator.text_to_image(&params()).await.unwrap().into_image().unwrap();
        assert_eq!(first, second);

        let mut reseeded = params();
        reseeded.seed = 8;
        let third = orchestrator.text_to_image(&reseeded).await.unwrap().into_image().unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_refine_rejects_mismatched_starting_latent() {
        let orchestrator = orchestrator(&Counters::default());
        let wrong = Tensor::zeros(vec![1, CHANNELS + 1, 8, 8], DType::F32);
        let err = orchestrator.refine_from_latent(wrong, 0.5, &params()).await.unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
