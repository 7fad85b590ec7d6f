//! Sequence masks and masked losses over padded batches
//!
//! Targets are padded up to a multiple of the decoder's outputs per step `r`
//! (see [`prepare_targets`](super::prepare_targets)), so by default masks
//! span `round_up(max(lengths), r)` frames and zero out that padding.

use anyhow::{ensure, Result};
use candle_core::{DType, Device, Tensor};

use super::padding::round_up;

/// `[batch, max_len]` float mask, 1 for positions before each length.
///
/// `max_len` defaults to the longest length. With `expand` the mask gets a
/// trailing unit axis, `[batch, max_len, 1]`, for broadcasting over channels.
pub fn sequence_mask(
    lengths: &[usize],
    max_len: Option<usize>,
    expand: bool,
    device: &Device,
) -> Result<Tensor> {
    let max_len = max_len.unwrap_or_else(|| lengths.iter().copied().max().unwrap_or(0));
    let batch = lengths.len();
    let lengths: Vec<u32> = lengths.iter().map(|&l| l as u32).collect();

    let positions = Tensor::arange(0u32, max_len as u32, device)?.unsqueeze(0)?;
    let lengths = Tensor::from_vec(lengths, (batch, 1), device)?;
    let mask = positions.broadcast_lt(&lengths)?.to_dtype(DType::F32)?;

    if expand {
        Ok(mask.unsqueeze(2)?)
    } else {
        Ok(mask)
    }
}

fn default_mask(lengths: &[usize], r: usize, expand: bool, device: &Device) -> Result<Tensor> {
    ensure!(r > 0, "outputs per step must be positive");
    let longest = lengths.iter().copied().max().unwrap_or(0);
    sequence_mask(lengths, Some(round_up(longest, r)), expand, device)
}

/// `sum(values) / count_nonzero(weights)`, 0 when every weight is zero
fn sum_by_nonzero(values: &Tensor, weights: &Tensor) -> Result<Tensor> {
    let nonzero = weights.ne(0f64)?.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()?;
    if nonzero == 0.0 {
        return Ok(Tensor::zeros((), DType::F32, values.device())?);
    }
    Ok((values.sum_all()? / f64::from(nonzero))?)
}

/// Masked mean squared error over `[batch, frames, channels]` tensors.
///
/// Squared errors are weighted by the mask (broadcast over channels) and
/// summed, then divided by the number of nonzero weights. Without an explicit
/// `mask`, one is built from `lengths` and `r`.
pub fn masked_mse(
    targets: &Tensor,
    outputs: &Tensor,
    lengths: &[usize],
    r: usize,
    mask: Option<&Tensor>,
) -> Result<Tensor> {
    ensure!(
        targets.dims() == outputs.dims(),
        "Targets {:?} and outputs {:?} differ in shape",
        targets.dims(),
        outputs.dims()
    );
    ensure!(
        targets.rank() == 3,
        "Expected [batch, frames, channels] targets, got {:?}",
        targets.dims()
    );

    let mask = match mask {
        Some(mask) => mask.clone(),
        None => default_mask(lengths, r, true, targets.device())?,
    };
    let (batch, frames, _) = targets.dims3()?;
    ensure!(
        mask.rank() == 3 && mask.dim(0)? == batch && mask.dim(1)? == frames,
        "Mask {:?} does not match targets {:?}",
        mask.dims(),
        targets.dims()
    );
    let weights = mask.to_dtype(DType::F32)?.broadcast_as(targets.shape())?;

    let squared = targets.sub(outputs)?.sqr()?;
    sum_by_nonzero(&squared.mul(&weights)?, &weights)
}

/// Masked, weighted sigmoid cross entropy over `[batch, frames]` logits.
///
/// Per element, with target `z`, logit `x` and `l = 1 + (pos_weight - 1) z`:
/// `(1 - z) x + l (ln(1 + e^-|x|) + max(-x, 0))`. The masked losses are summed
/// and divided by how many of them are nonzero. A `pos_weight` of 1 gives
/// plain sigmoid cross entropy.
pub fn masked_sigmoid_cross_entropy(
    targets: &Tensor,
    logits: &Tensor,
    lengths: &[usize],
    r: usize,
    pos_weight: f32,
    mask: Option<&Tensor>,
) -> Result<Tensor> {
    let mask = match mask {
        Some(mask) => mask.to_dtype(DType::F32)?,
        None => default_mask(lengths, r, false, targets.device())?,
    };
    ensure!(
        targets.dims() == mask.dims(),
        "Targets {:?} and mask {:?} differ in shape",
        targets.dims(),
        mask.dims()
    );
    ensure!(
        logits.dims() == mask.dims(),
        "Logits {:?} and mask {:?} differ in shape",
        logits.dims(),
        mask.dims()
    );

    let weight = targets.affine(f64::from(pos_weight) - 1.0, 1.0)?;
    // ln(1 + e^-|x|) written as -ln(sigmoid(|x|)), which stays in [0, ln 2]
    let soft = candle_nn::ops::sigmoid(&logits.abs()?)?.log()?.neg()?;
    let losses = targets
        .affine(-1.0, 1.0)?
        .mul(logits)?
        .add(&weight.mul(&soft.add(&logits.neg()?.relu()?)?)?)?;

    let masked = losses.mul(&mask)?;
    sum_by_nonzero(&masked, &masked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    fn bce(z: f32, x: f32) -> f32 {
        let p = 1.0 / (1.0 + (-x).exp());
        -(z * p.ln() + (1.0 - z) * (1.0 - p).ln())
    }

    #[test]
    fn test_sequence_mask() {
        let mask = sequence_mask(&[1, 3, 2], Some(5), false, &Device::Cpu).unwrap();
        assert_eq!(
            mask.to_vec2::<f32>().unwrap(),
            vec![
                vec![1.0, 0.0, 0.0, 0.0, 0.0],
                vec![1.0, 1.0, 1.0, 0.0, 0.0],
                vec![1.0, 1.0, 0.0, 0.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_sequence_mask_defaults_and_expand() {
        let mask = sequence_mask(&[2, 4], None, true, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[2, 4, 1]);
        assert_eq!(scalar(&mask.sum_all().unwrap()), 6.0);
    }

    #[test]
    fn test_masked_mse_ignores_padding() {
        let device = Device::Cpu;
        // Batch of 2, 4 frames, 2 channels; second item has 2 valid frames
        let targets = Tensor::zeros((2, 4, 2), DType::F32, &device).unwrap();
        let mut out = vec![1.0f32; 16];
        for v in out.iter_mut().skip(8 + 4) {
            *v = 100.0;
        }
        let outputs = Tensor::from_vec(out, (2, 4, 2), &device).unwrap();

        let loss = masked_mse(&targets, &outputs, &[4, 2], 1, None).unwrap();
        assert!((scalar(&loss) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_masked_mse_rounds_mask_to_outputs_per_step() {
        let device = Device::Cpu;
        let targets = Tensor::zeros((1, 4, 1), DType::F32, &device).unwrap();
        let outputs = Tensor::new(&[[[2.0f32], [2.0], [2.0], [50.0]]], &device).unwrap();
        // Length 3 with r = 4 gives a 4-frame mask whose last frame is off
        let loss = masked_mse(&targets, &outputs, &[3], 4, None).unwrap();
        assert!((scalar(&loss) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_masked_mse_explicit_mask_and_shape_errors() {
        let device = Device::Cpu;
        let targets = Tensor::zeros((1, 2, 3), DType::F32, &device).unwrap();
        let outputs = Tensor::ones((1, 2, 3), DType::F32, &device).unwrap();
        let mask = Tensor::new(&[[[1.0f32], [0.0]]], &device).unwrap();
        let loss = masked_mse(&targets, &outputs, &[], 1, Some(&mask)).unwrap();
        assert!((scalar(&loss) - 1.0).abs() < 1e-6);

        let wrong = Tensor::ones((1, 3, 3), DType::F32, &device).unwrap();
        assert!(masked_mse(&targets, &wrong, &[2], 1, None).is_err());
        let bad_mask = Tensor::ones((1, 5, 1), DType::F32, &device).unwrap();
        assert!(masked_mse(&targets, &outputs, &[2], 1, Some(&bad_mask)).is_err());
    }

    #[test]
    fn test_masked_mse_empty_mask_is_zero() {
        let device = Device::Cpu;
        let targets = Tensor::zeros((1, 2, 1), DType::F32, &device).unwrap();
        let outputs = Tensor::ones((1, 2, 1), DType::F32, &device).unwrap();
        let mask = Tensor::zeros((1, 2, 1), DType::F32, &device).unwrap();
        let loss = masked_mse(&targets, &outputs, &[], 1, Some(&mask)).unwrap();
        assert_eq!(scalar(&loss), 0.0);
    }

    #[test]
    fn test_cross_entropy_matches_reference() {
        let device = Device::Cpu;
        let z = [0.0f32, 1.0, 0.0, 1.0];
        let x = [-2.0f32, 3.0, 0.5, -1.0];
        let targets = Tensor::new(&[z], &device).unwrap();
        let logits = Tensor::new(&[x], &device).unwrap();

        let loss = masked_sigmoid_cross_entropy(&targets, &logits, &[4], 1, 1.0, None).unwrap();
        let expected: f32 = z.iter().zip(x.iter()).map(|(&z, &x)| bce(z, x)).sum::<f32>() / 4.0;
        assert!((scalar(&loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_pos_weight_and_mask() {
        let device = Device::Cpu;
        let targets = Tensor::new(&[[1.0f32, 0.0, 1.0]], &device).unwrap();
        let logits = Tensor::new(&[[0.0f32, 0.0, 9.0]], &device).unwrap();

        // Only the first two frames count
        let loss = masked_sigmoid_cross_entropy(&targets, &logits, &[2], 3, 3.0, None).unwrap();
        let ln2 = std::f32::consts::LN_2;
        let expected = (3.0 * ln2 + ln2) / 2.0;
        assert!((scalar(&loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_extreme_logits_are_finite() {
        let device = Device::Cpu;
        let targets = Tensor::new(&[[0.0f32, 1.0]], &device).unwrap();
        let logits = Tensor::new(&[[80.0f32, -80.0]], &device).unwrap();
        let loss = masked_sigmoid_cross_entropy(&targets, &logits, &[2], 1, 1.0, None).unwrap();
        let value = scalar(&loss);
        assert!(value.is_finite());
        assert!((value - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_cross_entropy_shape_mismatch() {
        let device = Device::Cpu;
        let targets = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let logits = Tensor::zeros((2, 4), DType::F32, &device).unwrap();
        assert!(masked_sigmoid_cross_entropy(&targets, &logits, &[3, 3], 1, 1.0, None).is_err());
    }
}
