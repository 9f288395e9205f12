//! Token selection between decoding steps.

use crate::error::{Error, Result};

/// What the sampler decided for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Continue generation with this token.
    Token(i64),
    /// Stop generation now, independent of end token and length limits.
    Stop,
}

/// Chooses the next token from a logits row.
///
/// Samplers are explicit constructor parameters of the orchestrator, never
/// ambient state. A sampler may end generation early by returning
/// [`Selection::Stop`]; the orchestrator treats that exactly like the end
/// token.
pub trait Sampler: Send + Sync {
    /// Selects the next token. `step` counts completed decoding steps.
    fn select(&self, step: usize, logits: &[f32]) -> Result<Selection>;
}

impl<T: Sampler + ?Sized> Sampler for std::sync::Arc<T> {
    fn select(&self, step: usize, logits: &[f32]) -> Result<Selection> {
        (**self).select(step, logits)
    }
}

/// Deterministic argmax selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl Sampler for Greedy {
    fn select(&self, _step: usize, logits: &[f32]) -> Result<Selection> {
        let (best, _) = logits
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| Error::InvalidInput("empty logits row".into()))?;
        Ok(Selection::Token(best as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greedy_picks_argmax() {
        let selection = Greedy.select(0, &[0.1, 2.5, -1.0, 2.4]).unwrap();
        assert_eq!(selection, Selection::Token(1));
    }

    #[test]
    fn test_greedy_rejects_empty_logits() {
        assert!(matches!(Greedy.select(0, &[]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_greedy_is_deterministic_on_ties() {
        // first maximal index wins
        let selection = Greedy.select(3, &[1.0, 5.0, 5.0]).unwrap();
        assert_eq!(selection, Selection::Token(1));
    }
}
