//! Small tensor helpers shared by the orchestrators.

use super::constant::SEQ_DIM;
use super::Tensor;
use crate::error::{Error, Result};

/// Packs token ids into the `(batch = 1, seq)` tensor shape decoders expect.
pub(crate) fn token_tensor(ids: &[i64]) -> Result<Tensor> {
    Tensor::from_i64(vec![1, ids.len()], ids.to_vec())
}

/// Extracts the logits row for the final sequence position.
///
/// Accepts `(batch = 1, seq, vocab)` or `(seq, vocab)` logits; the decoder
/// graphs emit the former, test doubles often the latter.
pub(crate) fn last_token_logits(logits: &Tensor) -> Result<Vec<f32>> {
    let (seq_dim, vocab) = match logits.rank() {
        3 => (SEQ_DIM, logits.shape()[2]),
        2 => (0, logits.shape()[1]),
        r => {
            return Err(Error::ShapeMismatch {
                name: "logits".into(),
                expected: "rank 2 or 3".into(),
                actual: format!("rank {r}"),
            });
        }
    };
    let seq = logits.shape()[seq_dim];
    if seq == 0 || vocab == 0 {
        return Err(Error::ShapeMismatch {
            name: "logits".into(),
            expected: "non-empty sequence and vocab".into(),
            actual: format!("{:?}", logits.shape()),
        });
    }
    let last = logits.narrow(seq_dim, seq - 1, 1)?;
    Ok(last.f32_data()?.to_vec())
}

/// Fails with [`Error::Numerical`] when `tensor` holds NaN or Inf.
pub(crate) fn ensure_finite(name: &str, tensor: &Tensor) -> Result<()> {
    if tensor.all_finite() {
        Ok(())
    } else {
        Err(Error::Numerical(name.into()))
    }
}

/// Numerically stable softmax over a logits row.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_tensor_shape() {
        let t = token_tensor(&[3, 5, 7]).unwrap();
        assert_eq!(t.shape(), &[1, 3]);
        assert_eq!(t.i64_data().unwrap(), &[3, 5, 7]);
    }

    #[test]
    fn test_last_token_logits_rank3() {
        let logits = Tensor::from_f32(vec![1, 2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(last_token_logits(&logits).unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_last_token_logits_rank2() {
        let logits = Tensor::from_f32(vec![2, 2], vec![0.0, 1.0, 9.0, 8.0]).unwrap();
        assert_eq!(last_token_logits(&logits).unwrap(), vec![9.0, 8.0]);
    }

    #[test]
    fn test_last_token_logits_rejects_vectors() {
        let logits = Tensor::from_f32(vec![4], vec![0.0; 4]).unwrap();
        assert!(last_token_logits(&logits).is_err());
    }

    #[test]
    fn test_ensure_finite() {
        let good = Tensor::from_f32(vec![2], vec![1.0, 2.0]).unwrap();
        assert!(ensure_finite("logits", &good).is_ok());

        let bad = Tensor::from_f32(vec![2], vec![1.0, f32::NAN]).unwrap();
        assert!(matches!(ensure_finite("logits", &bad), Err(Error::Numerical(_))));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }
}
