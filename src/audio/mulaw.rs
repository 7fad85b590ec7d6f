//! Mu-law companding and quantization
//!
//! All four operations take the alphabet size `mu` (256 for 8-bit audio) and
//! work with `mu - 1` internally, so `mu = 256` compresses with parameter 255.
//! Quantization decrements once more before companding, which keeps the codes
//! bit-compatible with the WaveNet vocoder preprocessing they are used with.
//!
//! Numeric edge cases are not errors: `mu <= 1` divides by `ln(1) = 0` and
//! out-of-range samples are not clamped, so both show up as NaN/Inf.
//!
//! The [`MuLaw`] trait applies the codec to whole arrays, eagerly on
//! [`ndarray`] arrays or lazily on candle [`Tensor`]s.

use anyhow::Result;
use candle_core::{DType, Tensor};
use ndarray::{Array, Dimension};

/// Default alphabet size (8-bit mu-law)
pub const DEFAULT_MU: u32 = 256;

/// Mu-law companding of a single sample.
///
/// `f(x) = sign(x) * ln(1 + m|x|) / ln(1 + m)` with `m = mu - 1`.
pub fn mulaw(x: f32, mu: f32) -> f32 {
    let m = f64::from(mu) - 1.0;
    let x = f64::from(x);
    (x.signum() * (m * x.abs()).ln_1p() / m.ln_1p()) as f32
}

/// Mu-law expansion, the inverse of [`mulaw`].
///
/// `f^-1(y) = sign(y) * ((1 + m)^|y| - 1) / m` with `m = mu - 1`.
pub fn inv_mulaw(y: f32, mu: f32) -> f32 {
    let m = f64::from(mu) - 1.0;
    let y = f64::from(y);
    (y.signum() * ((1.0 + m).powf(y.abs()) - 1.0) / m) as f32
}

/// Compand and quantize a sample to an integer code.
///
/// Codes lie in `[0, mu - 1]` for `x` in `[-1, 1]`; `mu - 1` is only reached
/// at `x = 1`. The scaled value is truncated toward zero.
pub fn mulaw_quantize(x: f32, mu: f32) -> i64 {
    let q = f64::from(mu) - 1.0;
    let m = q - 1.0;
    let x = f64::from(x);
    let y = x.signum() * (m * x.abs()).ln_1p() / m.ln_1p();
    ((y + 1.0) / 2.0 * q) as i64
}

/// Map a code back to a sample, the approximate inverse of [`mulaw_quantize`].
pub fn inv_mulaw_quantize(code: i64, mu: f32) -> f32 {
    let q = f64::from(mu) - 1.0;
    let m = q - 1.0;
    let y = 2.0 * code as f64 / q - 1.0;
    (y.signum() * ((1.0 + m).powf(y.abs()) - 1.0) / m) as f32
}

/// Mu-law codec over a whole array or tensor.
///
/// Implemented for eager `ndarray` arrays of any dimensionality and for
/// candle tensors. Shapes are preserved by every operation.
pub trait MuLaw: Sized {
    /// Container for quantized codes
    type Codes;

    /// Element-wise [`mulaw`]
    fn companding(&self, mu: u32) -> Result<Self>;

    /// Element-wise [`inv_mulaw`]
    fn expansion(&self, mu: u32) -> Result<Self>;

    /// Element-wise [`mulaw_quantize`]
    fn quantize(&self, mu: u32) -> Result<Self::Codes>;

    /// Element-wise [`inv_mulaw_quantize`]
    fn dequantize(codes: &Self::Codes, mu: u32) -> Result<Self>;
}

impl<D: Dimension> MuLaw for Array<f32, D> {
    type Codes = Array<i64, D>;

    fn companding(&self, mu: u32) -> Result<Self> {
        let mu = mu as f32;
        Ok(self.mapv(|x| mulaw(x, mu)))
    }

    fn expansion(&self, mu: u32) -> Result<Self> {
        let mu = mu as f32;
        Ok(self.mapv(|y| inv_mulaw(y, mu)))
    }

    fn quantize(&self, mu: u32) -> Result<Self::Codes> {
        let mu = mu as f32;
        Ok(self.mapv(|x| mulaw_quantize(x, mu)))
    }

    fn dequantize(codes: &Self::Codes, mu: u32) -> Result<Self> {
        let mu = mu as f32;
        Ok(codes.mapv(|c| inv_mulaw_quantize(c, mu)))
    }
}

/// `+1` where `x >= 0`, `-1` elsewhere, in the dtype of `x`.
///
/// The sign of zero is irrelevant here because both companding and expansion
/// map a zero magnitude to zero.
fn sign_of(x: &Tensor) -> Result<Tensor> {
    Ok(x.ge(0f64)?.to_dtype(x.dtype())?.affine(2.0, -1.0)?)
}

/// Companding with the internal parameter `m` already applied
fn compand_tensor(x: &Tensor, m: f64) -> Result<Tensor> {
    let magnitude = x.abs()?.affine(m, 1.0)?.log()?.affine(1.0 / m.ln_1p(), 0.0)?;
    Ok(sign_of(x)?.mul(&magnitude)?)
}

/// Expansion with the internal parameter `m` already applied
fn expand_tensor(y: &Tensor, m: f64) -> Result<Tensor> {
    let magnitude = y
        .abs()?
        .affine((1.0 + m).ln(), 0.0)?
        .exp()?
        .affine(1.0 / m, -1.0 / m)?;
    Ok(sign_of(y)?.mul(&magnitude)?)
}

impl MuLaw for Tensor {
    type Codes = Tensor;

    fn companding(&self, mu: u32) -> Result<Self> {
        compand_tensor(self, f64::from(mu) - 1.0)
    }

    fn expansion(&self, mu: u32) -> Result<Self> {
        expand_tensor(self, f64::from(mu) - 1.0)
    }

    /// Returns an `I64` tensor of codes.
    fn quantize(&self, mu: u32) -> Result<Self::Codes> {
        let q = f64::from(mu) - 1.0;
        let y = compand_tensor(self, q - 1.0)?;
        // Casting to an integer dtype truncates toward zero.
        Ok(y.affine(q / 2.0, q / 2.0)?.to_dtype(DType::I64)?)
    }

    /// Accepts integer codes of any dtype and returns an `F32` tensor.
    fn dequantize(codes: &Self::Codes, mu: u32) -> Result<Self> {
        let q = f64::from(mu) - 1.0;
        let y = codes.to_dtype(DType::F32)?.affine(2.0 / q, -1.0)?;
        expand_tensor(&y, q - 1.0)
    }
}
