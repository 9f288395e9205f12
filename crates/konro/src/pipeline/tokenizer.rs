//! The text tokenization seam.

use crate::error::Result;

/// Converts between text and token ids.
///
/// Tokenization itself lives outside this crate; pipelines receive a
/// tokenizer as an explicit constructor parameter and never consult any
/// ambient registry. Implementations wrap whatever vocabulary the model
/// was trained with.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<i64>>;

    fn decode(&self, ids: &[i64]) -> Result<String>;
}
