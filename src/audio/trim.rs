//! Silence trimming and frame bookkeeping for vocoder training data

use super::mulaw::mulaw_quantize;
use anyhow::{ensure, Context, Result};
use std::ops::Range;

/// Code that mu-law quantization with `quantize_channels` assigns to silence
pub fn silence_code(quantize_channels: u32) -> i64 {
    mulaw_quantize(0.0, quantize_channels as f32)
}

/// First and last positions of mu-law codes that are not silence.
///
/// A code is silent when it lies within `silence_threshold` of
/// `silence_code` (see [`silence_code`]). Fails if every code is silent.
pub fn start_and_end_indices(
    quantized: &[i64],
    silence_code: i64,
    silence_threshold: i64,
) -> Result<(usize, usize)> {
    let is_voiced = |&c: &i64| (c - silence_code).abs() > silence_threshold;

    let start = quantized
        .iter()
        .position(is_voiced)
        .context("No sample above the silence threshold")?;
    let end = quantized
        .iter()
        .rposition(is_voiced)
        .context("No sample above the silence threshold")?;

    Ok((start, end))
}

/// Range of `samples` left after dropping leading and trailing silence.
///
/// Frames of `frame_length` samples every `hop_length` (centered, zero padded)
/// are silent when their mean power is more than `top_db` below the loudest
/// frame. Returns an empty range when the whole signal is silent.
pub fn trim_silence_range(
    samples: &[f32],
    top_db: f32,
    frame_length: usize,
    hop_length: usize,
) -> Result<Range<usize>> {
    ensure!(frame_length > 0, "frame_length must be positive");
    ensure!(hop_length > 0, "hop_length must be positive");
    if samples.is_empty() {
        return Ok(0..0);
    }

    let pad = (frame_length / 2) as isize;
    let n_frames = 1 + samples.len() / hop_length;
    let power: Vec<f32> = (0..n_frames)
        .map(|frame| {
            let start = (frame * hop_length) as isize - pad;
            let energy: f32 = (start..start + frame_length as isize)
                .filter(|&i| i >= 0 && (i as usize) < samples.len())
                .map(|i| samples[i as usize] * samples[i as usize])
                .sum();
            energy / frame_length as f32
        })
        .collect();

    const AMIN: f32 = 1e-10;
    let reference = power.iter().fold(0.0f32, |a, &b| a.max(b)).max(AMIN);
    let to_db = |p: f32| 10.0 * p.max(AMIN).log10() - 10.0 * reference.log10();
    let voiced = |p: &f32| to_db(*p) > -top_db;

    let Some(first) = power.iter().position(voiced) else {
        return Ok(0..0);
    };
    let last = power.iter().rposition(voiced).unwrap_or(first);

    let start = first * hop_length;
    let end = ((last + 1) * hop_length).min(samples.len());
    Ok(start..end)
}

/// Copy of `samples` with leading and trailing silence removed.
///
/// See [`trim_silence_range`].
pub fn trim_silence(
    samples: &[f32],
    top_db: f32,
    frame_length: usize,
    hop_length: usize,
) -> Result<Vec<f32>> {
    let range = trim_silence_range(samples, top_db, frame_length, hop_length)?;
    Ok(samples[range].to_vec())
}

/// Number of frames a signal of `length` samples produces once padded by
/// `fsize - fshift` on both sides. Requires `fsize >= fshift > 0`.
///
/// The division floors, so signals shorter than one padded frame still
/// count as a single frame.
pub fn num_frames(length: usize, fsize: usize, fshift: usize) -> usize {
    let (length, fsize, fshift) = (length as isize, fsize as isize, fshift as isize);
    let pad = fsize - fshift;
    let frames = (length + pad * 2 - fsize).div_euclid(fshift);
    let frames = if length % fshift == 0 { frames + 1 } else { frames + 2 };
    frames.max(0) as usize
}

/// Left and right padding that makes a signal of `length` samples split into
/// exactly [`num_frames`] frames of `fsize` every `fshift`.
pub fn pad_lr(length: usize, fsize: usize, fshift: usize) -> Result<(usize, usize)> {
    ensure!(fshift > 0, "fshift must be positive");
    ensure!(
        fsize >= fshift,
        "Frame size {} is smaller than the frame shift {}",
        fsize,
        fshift
    );
    let m = num_frames(length, fsize, fshift) as isize;
    let pad = (fsize - fshift) as isize;
    let total = length as isize + 2 * pad;
    let r = (m - 1) * fshift as isize + fsize as isize - total;
    let right = pad + r;
    ensure!(
        right >= 0,
        "Negative right padding for length={} fsize={} fshift={}",
        length,
        fsize,
        fshift
    );
    Ok((pad as usize, right as usize))
}
