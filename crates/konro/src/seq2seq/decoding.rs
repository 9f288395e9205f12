//! The autoregressive decoding state machine.

use super::cache::KvCache;
use super::core_trait::Seq2SeqModel;
use super::sampler::{Sampler, Selection};
use crate::error::{Error, Result};
use crate::tensor::ops::last_token_logits;
use tracing::{debug, trace};

/// Limits and special tokens for one generation.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Hard cap on generated tokens; generation halts once reached.
    pub max_new_tokens: usize,
    /// Token that ends generation when selected. `None` relies on the
    /// length cap and the sampler alone.
    pub eos_token_id: Option<i64>,
    /// Token the decoder is primed with before the first step.
    pub decoder_start_token_id: i64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            eos_token_id: None,
            decoder_start_token_id: 0,
        }
    }
}

/// Drives one generation through the state machine
/// `Init → Encoding → Decoding(0..n) → Done`.
///
/// `emit` is called once per selected token; returning `false` signals the
/// receiver is gone and cancels the generation at the next step. The only
/// cleanup cancellation needs is dropping the cache, which happens with
/// this call frame.
pub(crate) async fn run_decoding<M>(
    model: &M,
    sampler: &dyn Sampler,
    config: &GenerationConfig,
    input_ids: &[i64],
    mut emit: impl FnMut(i64) -> bool + Send,
) -> Result<Vec<i64>>
where
    M: Seq2SeqModel + ?Sized,
{
    // Init: reject before any session runs
    if input_ids.is_empty() {
        return Err(Error::InvalidInput("input sequence is empty".into()));
    }
    if config.max_new_tokens == 0 {
        return Err(Error::InvalidInput("max_new_tokens must be non-zero".into()));
    }

    // Encoding: once, retained for the whole generation
    let encoder_state = model.encode(input_ids).await?;
    debug!(input_len = input_ids.len(), "encoded input sequence");

    // Decoding(0): the without-past graph primes the cache
    let (mut logits, mut cache) = model
        .decode_first(&[config.decoder_start_token_id], &encoder_state)
        .await?;

    let mut tokens = Vec::new();
    loop {
        let row = last_token_logits(&logits)?;
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::Numerical("decoder logits".into()));
        }

        let token = match sampler.select(tokens.len(), &row)? {
            Selection::Stop => break,
            Selection::Token(token) => token,
        };
        if config.eos_token_id == Some(token) {
            break;
        }

        tokens.push(token);
        trace!(step = tokens.len(), token, cache_len = cache.seq_len(), "decoded token");
        if !emit(token) {
            debug!(step = tokens.len(), "receiver dropped, cancelling generation");
            break;
        }
        if tokens.len() >= config.max_new_tokens {
            break;
        }

        // Decoding(n → n+1): one new token through the with-past graph
        let (next_logits, next_cache) = model.decode_step(token, &encoder_state, cache).await?;
        logits = next_logits;
        cache = next_cache;
    }

    debug!(generated = tokens.len(), "generation done");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq2seq::cache::LayerKv;
    use crate::seq2seq::sampler::Greedy;
    use crate::tensor::{DType, Tensor};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const VOCAB: usize = 16;
    const EOS: i64 = 1;

    /// Emits a scripted token sequence followed by the end token.
    struct ScriptedModel {
        script: Vec<i64>,
        num_layers: usize,
        /// Cache length observed entering every with-past step.
        seen_cache_lens: Mutex<Vec<usize>>,
        encoded: AtomicBool,
        nan_at_step: Option<usize>,
    }

    impl ScriptedModel {
        fn new(script: Vec<i64>) -> Self {
            Self {
                script,
                num_layers: 2,
                seen_cache_lens: Mutex::new(vec![]),
                encoded: AtomicBool::new(false),
                nan_at_step: None,
            }
        }

        fn layers(&self, seq: usize) -> Vec<LayerKv> {
            (0..self.num_layers)
                .map(|_| LayerKv {
                    key: Tensor::zeros(vec![1, 2, seq, 4], DType::F32),
                    value: Tensor::zeros(vec![1, 2, seq, 4], DType::F32),
                })
                .collect()
        }

        fn logits_for_step(&self, step: usize) -> Tensor {
            if self.nan_at_step == Some(step) {
                return Tensor::from_f32(vec![1, 1, VOCAB], vec![f32::NAN; VOCAB]).unwrap();
            }
            let target = self.script.get(step).copied().unwrap_or(EOS);
            let mut row = vec![0.0f32; VOCAB];
            row[target as usize] = 10.0;
            Tensor::from_f32(vec![1, 1, VOCAB], row).unwrap()
        }
    }

    #[async_trait]
    impl Seq2SeqModel for ScriptedModel {
        async fn encode(&self, input_ids: &[i64]) -> crate::error::Result<Tensor> {
            self.encoded.store(true, Ordering::SeqCst);
            let state: Vec<f32> = input_ids.iter().map(|&i| i as f32).collect();
            Tensor::from_f32(vec![1, input_ids.len(), 1], state)
        }

        async fn decode_first(
            &self,
            decoder_input_ids: &[i64],
            _encoder_state: &Tensor,
        ) -> crate::error::Result<(Tensor, KvCache)> {
            let cache = KvCache::new(self.layers(decoder_input_ids.len()))?;
            Ok((self.logits_for_step(0), cache))
        }

        async fn decode_step(
            &self,
            _token: i64,
            _encoder_state: &Tensor,
            cache: KvCache,
        ) -> crate::error::Result<(Tensor, KvCache)> {
            let step = cache.seq_len();
            self.seen_cache_lens.lock().unwrap().push(step);
            let cache = cache.advanced(self.layers(step + 1))?;
            Ok((self.logits_for_step(step), cache))
        }
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: 32,
            eos_token_id: Some(EOS),
            decoder_start_token_id: 0,
        }
    }

    #[tokio::test]
    async fn test_scripted_generation_runs_to_eos() {
        let model = ScriptedModel::new(vec![4, 7, 9]);
        let tokens = run_decoding(&model, &Greedy, &config(), &[2, 3], |_| true)
            .await
            .unwrap();
        assert_eq!(tokens, vec![4, 7, 9]);
    }

    #[tokio::test]
    async fn test_cache_grows_by_one_per_step() {
        let model = ScriptedModel::new(vec![4, 7, 9, 11]);
        run_decoding(&model, &Greedy, &config(), &[2], |_| true)
            .await
            .unwrap();
        // with-past steps observed the cache at lengths 1, 2, 3, 4
        assert_eq!(*model.seen_cache_lens.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_input_fails_before_encoding() {
        let model = ScriptedModel::new(vec![4]);
        let err = run_decoding(&model, &Greedy, &config(), &[], |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!model.encoded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_non_finite_logits_are_numerical_errors() {
        let mut model = ScriptedModel::new(vec![4, 7, 9]);
        model.nan_at_step = Some(2);
        let err = run_decoding(&model, &Greedy, &config(), &[2], |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Numerical(_)));
    }

    #[tokio::test]
    async fn test_max_new_tokens_caps_generation() {
        // script never reaches the end token
        let model = ScriptedModel::new(vec![3; 100]);
        let mut config = config();
        config.max_new_tokens = 5;
        let tokens = run_decoding(&model, &Greedy, &config, &[2], |_| true)
            .await
            .unwrap();
        assert_eq!(tokens.len(), 5);
    }

    #[tokio::test]
    async fn test_generation_is_deterministic() {
        let model = ScriptedModel::new(vec![4, 7, 9, 2, 5]);
        let first = run_decoding(&model, &Greedy, &config(), &[2, 3], |_| true)
            .await
            .unwrap();
        let second = run_decoding(&model, &Greedy, &config(), &[2, 3], |_| true)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sampler_stop_ends_generation() {
        struct StopAfter(usize);
        impl Sampler for StopAfter {
            fn select(&self, step: usize, logits: &[f32]) -> crate::error::Result<Selection> {
                if step >= self.0 {
                    Ok(Selection::Stop)
                } else {
                    Greedy.select(step, logits)
                }
            }
        }

        let model = ScriptedModel::new(vec![4; 50]);
        let tokens = run_decoding(&model, &StopAfter(3), &config(), &[2], |_| true)
            .await
            .unwrap();
        assert_eq!(tokens.len(), 3);
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_generation() {
        let model = ScriptedModel::new(vec![4; 50]);
        let mut emitted = 0;
        let tokens = run_decoding(&model, &Greedy, &config(), &[2], |_| {
            emitted += 1;
            emitted < 4
        })
        .await
        .unwrap();
        assert_eq!(tokens.len(), 4);
        // no further with-past steps ran after cancellation
        assert_eq!(model.seen_cache_lens.lock().unwrap().len(), 3);
    }
}
