//! The boundary buffer type crossing the execution-engine interface.
//!
//! Graphs consume and produce named, typed, shaped numeric buffers. This
//! module provides that buffer type plus exactly the operations the
//! orchestration layer needs between graph calls: concatenation for cache
//! growth, narrowing for logit extraction, elementwise blending for masked
//! denoising, and finiteness checks. It is deliberately not a math library;
//! anything heavier belongs inside the execution engine.
//!
//! ## Reserved dimensions
//!
//! Regardless of backend, two dimensions carry fixed meanings:
//!  - the `0th` dimension is the batch dimension
//!  - the `1st` dimension is the sequence dimension
//!
//! Cached key/value tensors additionally reserve their `2nd` dimension for
//! the growing sequence, and image tensors are `(batch, channel, height,
//! width)`.

pub mod constant;
pub(crate) mod ops;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Element types carried across the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    I64,
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F32 => f.write_str("f32"),
            DType::I64 => f.write_str("i64"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

/// A dense, contiguous, row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

/// Named tensors, as passed to and returned from an execution session.
pub type TensorMap = HashMap<String, Tensor>;

fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    /// Builds an `f32` tensor, checking that `data` fills `shape` exactly.
    pub fn from_f32(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        if numel(&shape) != data.len() {
            return Err(Error::ShapeMismatch {
                name: "from_f32".into(),
                expected: format!("{} elements for {:?}", numel(&shape), shape),
                actual: format!("{} elements", data.len()),
            });
        }
        Ok(Self {
            shape,
            data: TensorData::F32(data),
        })
    }

    /// Builds an `i64` tensor, checking that `data` fills `shape` exactly.
    pub fn from_i64(shape: impl Into<Vec<usize>>, data: Vec<i64>) -> Result<Self> {
        let shape = shape.into();
        if numel(&shape) != data.len() {
            return Err(Error::ShapeMismatch {
                name: "from_i64".into(),
                expected: format!("{} elements for {:?}", numel(&shape), shape),
                actual: format!("{} elements", data.len()),
            });
        }
        Ok(Self {
            shape,
            data: TensorData::I64(data),
        })
    }

    /// A tensor of zeros with the given shape and dtype.
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DType) -> Self {
        let shape = shape.into();
        let n = numel(&shape);
        let data = match dtype {
            DType::F32 => TensorData::F32(vec![0.0; n]),
            DType::I64 => TensorData::I64(vec![0; n]),
        };
        Self { shape, data }
    }

    /// An `f32` tensor filled with `value`.
    pub fn full(shape: impl Into<Vec<usize>>, value: f32) -> Self {
        let shape = shape.into();
        let n = numel(&shape);
        Self {
            shape,
            data: TensorData::F32(vec![value; n]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    pub fn dtype(&self) -> DType {
        match self.data {
            TensorData::F32(_) => DType::F32,
            TensorData::I64(_) => DType::I64,
        }
    }

    /// The flat `f32` data, failing if this tensor holds another dtype.
    pub fn f32_data(&self) -> Result<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            TensorData::I64(_) => Err(dtype_mismatch("f32_data", DType::F32, DType::I64)),
        }
    }

    /// The flat `i64` data, failing if this tensor holds another dtype.
    pub fn i64_data(&self) -> Result<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Ok(v),
            TensorData::F32(_) => Err(dtype_mismatch("i64_data", DType::I64, DType::F32)),
        }
    }

    /// `true` when every element is finite. `i64` tensors are always finite.
    pub fn all_finite(&self) -> bool {
        match &self.data {
            TensorData::F32(v) => v.iter().all(|x| x.is_finite()),
            TensorData::I64(_) => true,
        }
    }

    /// Concatenates tensors along `dim`. All parts must agree in rank,
    /// dtype, and every dimension other than `dim`.
    pub fn cat(parts: &[Tensor], dim: usize) -> Result<Tensor> {
        let first = parts
            .first()
            .ok_or_else(|| Error::InvalidInput("cat of zero tensors".into()))?;
        if dim >= first.rank() {
            return Err(dim_out_of_range("cat", dim, first.rank()));
        }
        let mut out_shape = first.shape.clone();
        out_shape[dim] = 0;
        for part in parts {
            if part.rank() != first.rank() || part.dtype() != first.dtype() {
                return Err(Error::ShapeMismatch {
                    name: "cat".into(),
                    expected: format!("rank {} {} tensors", first.rank(), first.dtype()),
                    actual: format!("rank {} {}", part.rank(), part.dtype()),
                });
            }
            for (d, (&a, &b)) in first.shape.iter().zip(part.shape.iter()).enumerate() {
                if d != dim && a != b {
                    return Err(Error::ShapeMismatch {
                        name: "cat".into(),
                        expected: format!("{:?} outside dim {dim}", first.shape),
                        actual: format!("{:?}", part.shape),
                    });
                }
            }
            out_shape[dim] += part.shape[dim];
        }

        let inner: usize = first.shape[dim + 1..].iter().product();
        let outer: usize = first.shape[..dim].iter().product();
        let data = match first.data {
            TensorData::F32(_) => {
                let slices: Vec<(&[f32], usize)> = parts
                    .iter()
                    .map(|p| (p.f32_data().expect("dtype checked"), p.shape[dim]))
                    .collect();
                TensorData::F32(cat_blocks(&slices, outer, inner))
            }
            TensorData::I64(_) => {
                let slices: Vec<(&[i64], usize)> = parts
                    .iter()
                    .map(|p| (p.i64_data().expect("dtype checked"), p.shape[dim]))
                    .collect();
                TensorData::I64(cat_blocks(&slices, outer, inner))
            }
        };
        Ok(Tensor {
            shape: out_shape,
            data,
        })
    }

    /// Returns the `[start, start + len)` slice of `dim`.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Tensor> {
        if dim >= self.rank() {
            return Err(dim_out_of_range("narrow", dim, self.rank()));
        }
        if start + len > self.shape[dim] {
            return Err(Error::ShapeMismatch {
                name: "narrow".into(),
                expected: format!("start + len <= {}", self.shape[dim]),
                actual: format!("start {start}, len {len}"),
            });
        }
        let inner: usize = self.shape[dim + 1..].iter().product();
        let outer: usize = self.shape[..dim].iter().product();
        let block_in = self.shape[dim] * inner;
        let mut out_shape = self.shape.clone();
        out_shape[dim] = len;

        let data = match &self.data {
            TensorData::F32(v) => TensorData::F32(narrow_blocks(v, outer, block_in, start * inner, len * inner)),
            TensorData::I64(v) => TensorData::I64(narrow_blocks(v, outer, block_in, start * inner, len * inner)),
        };
        Ok(Tensor {
            shape: out_shape,
            data,
        })
    }

    /// Inserts a dimension of size 1 at `dim`.
    pub fn unsqueeze(&self, dim: usize) -> Result<Tensor> {
        if dim > self.rank() {
            return Err(dim_out_of_range("unsqueeze", dim, self.rank() + 1));
        }
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        Ok(Tensor {
            shape,
            data: self.data.clone(),
        })
    }

    /// Elementwise `self * factor`. `f32` only.
    pub fn scale(&self, factor: f32) -> Result<Tensor> {
        let data = self.f32_data()?;
        Tensor::from_f32(self.shape.clone(), data.iter().map(|x| x * factor).collect())
    }

    /// Elementwise addition of equal-shaped `f32` tensors.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_map("add", other, |a, b| a + b)
    }

    /// Elementwise subtraction of equal-shaped `f32` tensors.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_map("sub", other, |a, b| a - b)
    }

    /// Elementwise multiplication of equal-shaped `f32` tensors.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_map("mul", other, |a, b| a * b)
    }

    /// Masked merge of two `(batch, channel, height, width)` tensors.
    ///
    /// Where `mask` is 1 the result takes `self`; where it is 0 the result
    /// takes `other`; fractional mask values interpolate. The mask has a
    /// single channel, broadcast across the channels of the operands.
    pub fn blend(&self, other: &Tensor, mask: &Tensor) -> Result<Tensor> {
        if self.rank() != 4 || self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                name: "blend".into(),
                expected: format!("two rank-4 tensors of {:?}", self.shape),
                actual: format!("{:?} vs {:?}", self.shape, other.shape),
            });
        }
        let (n, c, h, w) = (self.shape[0], self.shape[1], self.shape[2], self.shape[3]);
        if mask.shape() != &[n, 1, h, w] {
            return Err(Error::ShapeMismatch {
                name: "blend mask".into(),
                expected: format!("{:?}", [n, 1, h, w]),
                actual: format!("{:?}", mask.shape()),
            });
        }
        let a = self.f32_data()?;
        let b = other.f32_data()?;
        let m = mask.f32_data()?;
        let mut out = vec![0.0f32; a.len()];
        let plane = h * w;
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * plane;
                let mask_base = ni * plane;
                for p in 0..plane {
                    let mv = m[mask_base + p];
                    out[base + p] = mv * a[base + p] + (1.0 - mv) * b[base + p];
                }
            }
        }
        Tensor::from_f32(self.shape.clone(), out)
    }

    /// Nearest-neighbor downsampling of a `(batch, channel, height, width)`
    /// tensor by an integer factor. Spatial dimensions must divide evenly.
    pub fn downsample_nearest(&self, factor: usize) -> Result<Tensor> {
        if factor == 0 {
            return Err(Error::InvalidInput("downsample factor must be non-zero".into()));
        }
        let data = self.f32_data()?;
        if self.rank() != 4 {
            return Err(dim_out_of_range("downsample_nearest", 3, self.rank()));
        }
        let (n, c, h, w) = (self.shape[0], self.shape[1], self.shape[2], self.shape[3]);
        if h % factor != 0 || w % factor != 0 {
            return Err(Error::ShapeMismatch {
                name: "downsample_nearest".into(),
                expected: format!("spatial dims divisible by {factor}"),
                actual: format!("{h}x{w}"),
            });
        }
        let (oh, ow) = (h / factor, w / factor);
        let mut out = Vec::with_capacity(n * c * oh * ow);
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * h * w;
                for y in 0..oh {
                    for x in 0..ow {
                        out.push(data[base + (y * factor) * w + x * factor]);
                    }
                }
            }
        }
        Tensor::from_f32(vec![n, c, oh, ow], out)
    }

    /// Nearest-neighbor upsampling of a `(batch, channel, height, width)`
    /// tensor by an integer factor.
    pub fn upsample_nearest(&self, factor: usize) -> Result<Tensor> {
        if factor == 0 {
            return Err(Error::InvalidInput("upsample factor must be non-zero".into()));
        }
        let data = self.f32_data()?;
        if self.rank() != 4 {
            return Err(dim_out_of_range("upsample_nearest", 3, self.rank()));
        }
        let (n, c, h, w) = (self.shape[0], self.shape[1], self.shape[2], self.shape[3]);
        let (oh, ow) = (h * factor, w * factor);
        let mut out = Vec::with_capacity(n * c * oh * ow);
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * h * w;
                for y in 0..oh {
                    for x in 0..ow {
                        out.push(data[base + (y / factor) * w + x / factor]);
                    }
                }
            }
        }
        Tensor::from_f32(vec![n, c, oh, ow], out)
    }

    fn zip_map(&self, op: &str, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                name: op.into(),
                expected: format!("{:?}", self.shape),
                actual: format!("{:?}", other.shape),
            });
        }
        let a = self.f32_data()?;
        let b = other.f32_data()?;
        Tensor::from_f32(
            self.shape.clone(),
            a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect(),
        )
    }
}

fn cat_blocks<T: Copy>(parts: &[(&[T], usize)], outer: usize, inner: usize) -> Vec<T> {
    let total: usize = parts.iter().map(|(s, _)| s.len()).sum();
    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for &(slice, dim_len) in parts {
            let block = dim_len * inner;
            out.extend_from_slice(&slice[o * block..(o + 1) * block]);
        }
    }
    out
}

fn narrow_blocks<T: Copy>(
    data: &[T],
    outer: usize,
    block_in: usize,
    offset: usize,
    take: usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(outer * take);
    for o in 0..outer {
        let start = o * block_in + offset;
        out.extend_from_slice(&data[start..start + take]);
    }
    out
}

fn dtype_mismatch(op: &str, expected: DType, actual: DType) -> Error {
    Error::ShapeMismatch {
        name: op.into(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn dim_out_of_range(op: &str, dim: usize, rank: usize) -> Error {
    Error::ShapeMismatch {
        name: op.into(),
        expected: format!("dim < {rank}"),
        actual: format!("dim {dim}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32_rejects_short_data() {
        let err = Tensor::from_f32(vec![2, 3], vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_cat_along_middle_dim() {
        let a = Tensor::from_f32(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_f32(vec![1, 1, 2], vec![5.0, 6.0]).unwrap();
        let out = Tensor::cat(&[a, b], 1).unwrap();
        assert_eq!(out.shape(), &[1, 3, 2]);
        assert_eq!(out.f32_data().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_cat_interleaves_outer_blocks() {
        // two batches: cat along dim 1 must interleave per batch, not append
        let a = Tensor::from_i64(vec![2, 1], vec![1, 2]).unwrap();
        let b = Tensor::from_i64(vec![2, 1], vec![3, 4]).unwrap();
        let out = Tensor::cat(&[a, b], 1).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.i64_data().unwrap(), &[1, 3, 2, 4]);
    }

    #[test]
    fn test_cat_rejects_mismatched_shapes() {
        let a = Tensor::zeros(vec![1, 2, 2], DType::F32);
        let b = Tensor::zeros(vec![1, 2, 3], DType::F32);
        assert!(Tensor::cat(&[a, b], 1).is_err());
    }

    #[test]
    fn test_narrow_middle_dim() {
        let t = Tensor::from_f32(vec![1, 3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = t.narrow(1, 2, 1).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2]);
        assert_eq!(out.f32_data().unwrap(), &[5.0, 6.0]);
    }

    #[test]
    fn test_narrow_is_inverse_of_cat() {
        let a = Tensor::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_f32(vec![2, 1], vec![9.0, 8.0]).unwrap();
        let merged = Tensor::cat(&[a.clone(), b], 1).unwrap();
        assert_eq!(merged.narrow(1, 0, 2).unwrap(), a);
    }

    #[test]
    fn test_all_finite_detects_nan_and_inf() {
        let good = Tensor::from_f32(vec![2], vec![1.0, -2.0]).unwrap();
        assert!(good.all_finite());
        let nan = Tensor::from_f32(vec![2], vec![1.0, f32::NAN]).unwrap();
        assert!(!nan.all_finite());
        let inf = Tensor::from_f32(vec![2], vec![f32::INFINITY, 0.0]).unwrap();
        assert!(!inf.all_finite());
    }

    #[test]
    fn test_blend_broadcasts_mask_over_channels() {
        let a = Tensor::full(vec![1, 2, 2, 2], 1.0);
        let b = Tensor::full(vec![1, 2, 2, 2], 5.0);
        let mask = Tensor::from_f32(vec![1, 1, 2, 2], vec![1.0, 0.0, 0.5, 0.0]).unwrap();
        let out = a.blend(&b, &mask).unwrap();
        let data = out.f32_data().unwrap();
        // both channels see the same mask plane
        assert_eq!(&data[..4], &[1.0, 5.0, 3.0, 5.0]);
        assert_eq!(&data[4..], &[1.0, 5.0, 3.0, 5.0]);
    }

    #[test]
    fn test_blend_rejects_bad_mask_shape() {
        let a = Tensor::zeros(vec![1, 2, 2, 2], DType::F32);
        let b = Tensor::zeros(vec![1, 2, 2, 2], DType::F32);
        let mask = Tensor::zeros(vec![1, 1, 4, 4], DType::F32);
        assert!(matches!(a.blend(&b, &mask), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_downsample_then_upsample_shapes() {
        let t = Tensor::full(vec![1, 1, 8, 8], 2.0);
        let down = t.downsample_nearest(4).unwrap();
        assert_eq!(down.shape(), &[1, 1, 2, 2]);
        let up = down.upsample_nearest(4).unwrap();
        assert_eq!(up.shape(), &[1, 1, 8, 8]);
        assert_eq!(up, t);
    }

    #[test]
    fn test_downsample_picks_top_left_sample() {
        let t = Tensor::from_f32(
            vec![1, 1, 2, 2],
            vec![7.0, 1.0, 2.0, 3.0],
        )
        .unwrap();
        let down = t.downsample_nearest(2).unwrap();
        assert_eq!(down.f32_data().unwrap(), &[7.0]);
    }

    #[test]
    fn test_elementwise_arithmetic() {
        let a = Tensor::from_f32(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_f32(vec![3], vec![0.5, 0.5, 0.5]).unwrap();
        assert_eq!(a.add(&b).unwrap().f32_data().unwrap(), &[1.5, 2.5, 3.5]);
        assert_eq!(a.sub(&b).unwrap().f32_data().unwrap(), &[0.5, 1.5, 2.5]);
        assert_eq!(a.mul(&b).unwrap().f32_data().unwrap(), &[0.5, 1.0, 1.5]);
        assert_eq!(a.scale(2.0).unwrap().f32_data().unwrap(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_dtype_accessors_guard() {
        let t = Tensor::zeros(vec![2], DType::I64);
        assert!(t.f32_data().is_err());
        assert!(t.i64_data().is_ok());
    }
}
