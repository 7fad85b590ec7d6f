//! Decibel conversion and bounded normalization of spectrograms
//!
//! Spectrograms are normalized into `[-M, M]` (symmetric) or `[0, M]`
//! (unsigned), `M = max_abs_value`, using `min_level_db` as the bottom of the
//! dynamic range. With clipping disabled, inputs outside `[min_level_db, 0]`
//! are rejected; with clipping enabled they are clamped, and [`denormalize`]
//! inverts the clamped values, so the round trip is lossy outside that range.

use anyhow::{ensure, Result};
use ndarray::{Array, ArrayBase, Data, Dimension};

/// Parameters of the normalizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationConfig {
    /// dB floor, always negative
    pub min_level_db: f32,
    /// Bound of the normalized range
    pub max_abs_value: f32,
    /// Map into `[-M, M]` instead of `[0, M]`
    pub symmetric_mels: bool,
    /// Clamp out-of-range values instead of rejecting them
    pub allow_clipping_in_normalization: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            min_level_db: -100.0,
            max_abs_value: 4.0,
            symmetric_mels: true,
            allow_clipping_in_normalization: true,
        }
    }
}

impl NormalizationConfig {
    /// Reject parameters that leave the normalized range empty or undefined
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_abs_value.is_finite() && self.max_abs_value > 0.0,
            "max_abs_value must be positive and finite, got {}",
            self.max_abs_value
        );
        ensure!(
            self.min_level_db.is_finite() && self.min_level_db < 0.0,
            "min_level_db must be negative and finite, got {}",
            self.min_level_db
        );
        Ok(())
    }

    /// Range of normalized values
    fn bounds(&self) -> (f32, f32) {
        if self.symmetric_mels {
            (-self.max_abs_value, self.max_abs_value)
        } else {
            (0.0, self.max_abs_value)
        }
    }
}

/// Linear amplitude corresponding to `min_level_db`
pub fn min_level(min_level_db: f32) -> f32 {
    (min_level_db / 20.0 * std::f32::consts::LN_10).exp()
}

/// Convert linear amplitude to dB, flooring at `min_level_db` first.
pub fn amp_to_db<S, D>(x: &ArrayBase<S, D>, min_level_db: f32) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let floor = min_level(min_level_db);
    x.mapv(|v| 20.0 * v.max(floor).log10())
}

/// Convert dB back to linear amplitude.
///
/// The floor applied by [`amp_to_db`] is not undone.
pub fn db_to_amp<S, D>(x: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    x.mapv(|v| 10f32.powf(v * 0.05))
}

/// Map dB values into the normalized range.
///
/// Without clipping, every value must lie in `[min_level_db, 0]`; NaN counts
/// as out of range.
pub fn normalize<S, D>(s: &ArrayBase<S, D>, config: &NormalizationConfig) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    config.validate()?;
    let min_db = config.min_level_db;
    let max_abs = config.max_abs_value;

    let scaled = if config.symmetric_mels {
        s.mapv(|v| (2.0 * max_abs) * ((v - min_db) / (-min_db)) - max_abs)
    } else {
        s.mapv(|v| max_abs * ((v - min_db) / (-min_db)))
    };

    if config.allow_clipping_in_normalization {
        let (lo, hi) = config.bounds();
        return Ok(scaled.mapv_into(|v| v.clamp(lo, hi)));
    }

    let in_range = s.iter().all(|&v| v <= 0.0 && v - min_db >= 0.0);
    ensure!(
        in_range,
        "Spectrogram out of range for normalization without clipping: expected values in [{}, 0] dB, got max={} min={}",
        min_db,
        s.fold(f32::NEG_INFINITY, |a, &b| a.max(b)),
        s.fold(f32::INFINITY, |a, &b| a.min(b)),
    );

    Ok(scaled)
}

/// Map normalized values back to dB.
///
/// With clipping enabled the input is clamped to the normalized range first.
/// Parameters that fail [`NormalizationConfig::validate`] yield NaN or
/// unbounded values rather than a panic.
pub fn denormalize<S, D>(d: &ArrayBase<S, D>, config: &NormalizationConfig) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let min_db = config.min_level_db;
    let max_abs = config.max_abs_value;
    let (lo, hi) = config.bounds();
    let clip = config.allow_clipping_in_normalization;

    d.mapv(|v| {
        let v = if clip { v.max(lo).min(hi) } else { v };
        if config.symmetric_mels {
            (v + max_abs) * -min_db / (2.0 * max_abs) + min_db
        } else {
            v * -min_db / max_abs + min_db
        }
    })
}
