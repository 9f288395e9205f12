//! The noise schedule collaborator.

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Supplies the noise schedule a denoise loop follows.
///
/// The orchestrator owns the loop; the scheduler owns the numbers. Where a
/// partial run starts for a given `strength` is deliberately a scheduler
/// policy, not an orchestrator formula.
pub trait Scheduler: Send + Sync {
    /// The noise-level value fed to the denoiser at `step`.
    fn timestep(&self, step: usize, total_steps: usize) -> f32;

    /// Applies one denoising update to `latent` given the predicted noise.
    fn step(
        &self,
        noise_pred: &Tensor,
        step: usize,
        total_steps: usize,
        latent: &Tensor,
    ) -> Result<Tensor>;

    /// Mixes a clean sample with noise at `step`'s noise level.
    fn add_noise(
        &self,
        sample: &Tensor,
        noise: &Tensor,
        step: usize,
        total_steps: usize,
    ) -> Result<Tensor>;

    /// The first step index of a partial run controlled by `strength` in
    /// `(0, 1]`; `1.0` must start at step 0 (the full range).
    fn start_step(&self, strength: f32, total_steps: usize) -> usize;
}

/// An Euler-style scheduler over a linear noise ramp.
///
/// Noise level runs from 1 at step 0 down to 0 after the final step; each
/// update removes one step's worth of the predicted noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScheduler;

impl LinearScheduler {
    pub fn new() -> Self {
        Self
    }

    fn sigma(step: usize, total_steps: usize) -> f32 {
        1.0 - step as f32 / total_steps as f32
    }
}

impl Scheduler for LinearScheduler {
    fn timestep(&self, step: usize, total_steps: usize) -> f32 {
        Self::sigma(step, total_steps)
    }

    fn step(
        &self,
        noise_pred: &Tensor,
        step: usize,
        total_steps: usize,
        latent: &Tensor,
    ) -> Result<Tensor> {
        let delta = Self::sigma(step, total_steps) - Self::sigma(step + 1, total_steps);
        latent.sub(&noise_pred.scale(delta)?)
    }

    fn add_noise(
        &self,
        sample: &Tensor,
        noise: &Tensor,
        step: usize,
        total_steps: usize,
    ) -> Result<Tensor> {
        let sigma = Self::sigma(step, total_steps);
        sample.scale(1.0 - sigma)?.add(&noise.scale(sigma)?)
    }

    fn start_step(&self, strength: f32, total_steps: usize) -> usize {
        let start = ((1.0 - strength) * total_steps as f32).floor() as usize;
        start.min(total_steps.saturating_sub(1))
    }
}

/// Checks a `strength` parameter against its `(0, 1]` domain.
pub(crate) fn validate_strength(strength: f32) -> Result<()> {
    if strength.is_finite() && strength > 0.0 && strength <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "strength must be in (0, 1], got {strength}"
        )))
    }
}
