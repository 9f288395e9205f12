use super::cache::KvCache;
use crate::error::Result;
use crate::tensor::Tensor;
use async_trait::async_trait;

/// # Seq2SeqModel
///
/// The model seam the generation state machine drives.
///
/// The three methods correspond to the three compiled graphs a decomposed
/// sequence-to-sequence model consists of. Implementations translate
/// between these logical calls and whatever named tensors their graphs
/// declare; the state machine neither knows nor cares how many sessions
/// sit behind the seam.
///
/// ## Contract
///
/// * `encode` is called exactly once per generation, over the full input
///   sequence. Its output is retained by the caller for every later step
///   and must not need recomputation.
/// * `decode_first` consumes the decoder start token(s) and returns the
///   first logits plus the initial cache, whose sequence length equals the
///   number of tokens consumed.
/// * `decode_step` consumes exactly one new token plus the cache from the
///   previous step and returns the next logits plus a cache grown by
///   exactly one position.
///
/// Implementations must surface failures as errors tagged with the graph
/// that produced them; they must never silently repair shapes or values.
#[async_trait]
pub trait Seq2SeqModel: Send + Sync {
    /// Runs the encoder over the full input sequence.
    async fn encode(&self, input_ids: &[i64]) -> Result<Tensor>;

    /// Runs the decoder-without-past graph, producing the first logits and
    /// the initial key/value cache.
    async fn decode_first(&self, decoder_input_ids: &[i64], encoder_state: &Tensor)
    -> Result<(Tensor, KvCache)>;

    /// Runs the decoder-with-past graph over one new token, consuming the
    /// previous cache and returning the grown one.
    async fn decode_step(
        &self,
        token: i64,
        encoder_state: &Tensor,
        cache: KvCache,
    ) -> Result<(Tensor, KvCache)>;
}
