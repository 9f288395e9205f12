//! # Multi-Stage Diffusion Orchestration
//!
//! A module composing four compiled graphs — text encoder, iterative
//! denoiser, latent encoder, and latent decoder — into image synthesis
//! workflows.
//!
//! ## Workflows
//!
//! Each workflow is a fixed ordered composition of stages:
//!
//! * **Text-to-image** — text encoder, then a denoise loop over the
//!   configured step count, then the latent decoder.
//! * **Image-to-image** — latent encoder over the input image, then a
//!   partial denoise loop starting at an index derived from `strength`,
//!   then the latent decoder.
//! * **Inpainting** — image-to-image where every denoise step blends the
//!   denoised latent with the original latent outside the mask region,
//!   the mask resized to latent resolution.
//! * **Base + refiner** — a base run with latent output short-circuits
//!   before its decoder and hands the raw latent to a second pipeline's
//!   denoise loop, which skips its own noise/encode stage.
//!
//! The denoise loop never changes the latent's spatial dimensions; only
//! its values evolve. Step count and noise schedule come from the
//! [`Scheduler`] collaborator; the orchestrator only sequences calls to it
//! and to the denoiser graph.
//!
//! Synthesis keeps all per-call state (latents, embeddings) on the call
//! frame, so one orchestrator instance may serve concurrent calls; the
//! sessions underneath are pure functions of their inputs.

mod compose;
mod orchestrator;
mod scheduler;

pub use compose::BaseRefiner;
pub use orchestrator::{DiffusionOrchestrator, OutputKind, Synthesis, SynthesisParams};
pub use scheduler::{LinearScheduler, Scheduler};
