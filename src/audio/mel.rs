//! Mel filter bank, STFT magnitudes and linear/mel conversion
//!
//! The filter bank matches librosa's `filters.mel` defaults (Slaney mel scale
//! with Slaney area normalization). [`SpectrogramTransform`] owns the basis and
//! its pseudo-inverse for one configuration; build one per configuration and
//! share it by reference.

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

use super::linalg::pinv;

/// Floor applied to reconstructed linear magnitudes
pub const MEL_TO_LINEAR_FLOOR: f32 = 1e-10;

/// Configuration of the mel filter bank
#[derive(Debug, Clone, PartialEq)]
pub struct MelConfig {
    /// Sample rate of input audio
    pub sample_rate: u32,
    /// FFT size
    pub n_fft: usize,
    /// Number of mel bands
    pub num_mels: usize,
    /// Minimum frequency for mel filterbank
    pub fmin: f32,
    /// Maximum frequency for mel filterbank, at most `sample_rate / 2`
    pub fmax: f32,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 1024,
            num_mels: 80,
            fmin: 55.0,
            fmax: 7600.0,
        }
    }
}

impl MelConfig {
    /// Number of non-negative FFT frequencies, `n_fft / 2 + 1`
    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Convert frequency in Hz to mel scale (Slaney / O'Shaughnessy).
///
/// This is the librosa default (`htk=False`): linear below 1000 Hz,
/// logarithmic above.
fn hz_to_mel(f: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if f < MIN_LOG_HZ {
        f / F_SP
    } else {
        MIN_LOG_MEL + (f / MIN_LOG_HZ).ln() / logstep
    }
}

/// Convert mel value to Hz (Slaney / O'Shaughnessy).
fn mel_to_hz(m: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if m < MIN_LOG_MEL {
        m * F_SP
    } else {
        MIN_LOG_HZ * ((m - MIN_LOG_MEL) * logstep).exp()
    }
}

/// Build the `(num_mels, n_fft / 2 + 1)` mel filter bank.
///
/// Fails if `fmax` exceeds the Nyquist frequency (`sample_rate / 2`, integer
/// division) or if the configuration is empty.
pub fn build_mel_basis(config: &MelConfig) -> Result<Array2<f32>> {
    let nyquist = (config.sample_rate / 2) as f32;
    ensure!(
        config.fmax <= nyquist,
        "fmax={} exceeds the Nyquist frequency {} for sample_rate={}",
        config.fmax,
        nyquist,
        config.sample_rate
    );
    ensure!(
        config.fmin >= 0.0 && config.fmin < config.fmax,
        "fmin={} must be non-negative and below fmax={}",
        config.fmin,
        config.fmax
    );
    ensure!(config.n_fft > 0, "n_fft must be positive");
    ensure!(config.num_mels > 0, "num_mels must be positive");

    let n_mels = config.num_mels;
    let n_freqs = config.n_freqs();
    let sample_rate = f64::from(config.sample_rate);

    // Linearly spaced points on the mel axis, converted back to Hz
    let mel_min = hz_to_mel(f64::from(config.fmin));
    let mel_max = hz_to_mel(f64::from(config.fmax));
    let hz_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|i| i as f64 * sample_rate / config.n_fft as f64)
        .collect();

    let mut basis = Array2::<f32>::zeros((n_mels, n_freqs));
    for i in 0..n_mels {
        let lower_width = hz_points[i + 1] - hz_points[i];
        let upper_width = hz_points[i + 2] - hz_points[i + 1];
        // Slaney area normalization
        let enorm = 2.0 / (hz_points[i + 2] - hz_points[i]);

        for (j, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - hz_points[i]) / lower_width;
            let upper = (hz_points[i + 2] - freq) / upper_width;
            let weight = lower.min(upper).max(0.0);
            basis[[i, j]] = (weight * enorm) as f32;
        }
    }

    let empty = basis
        .rows()
        .into_iter()
        .filter(|row| row.iter().all(|&v| v == 0.0))
        .count();
    if empty > 0 {
        tracing::warn!(
            "{} of {} mel filters are empty; consider fewer mels or a larger n_fft",
            empty,
            n_mels
        );
    }

    Ok(basis)
}

/// Periodic Hann window, matching `scipy.signal.get_window("hann", n)`
fn hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / length as f64).cos())) as f32)
        .collect()
}

/// Index into a signal of length `len` with reflect padding (edge not repeated)
fn reflect_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = index.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

/// Mel basis and its pseudo-inverse for one configuration.
///
/// The basis is built on construction. The pseudo-inverse is computed on the
/// first call to [`mel_to_linear`](Self::mel_to_linear) and reused; concurrent
/// first calls block on a single computation.
pub struct SpectrogramTransform {
    config: MelConfig,
    basis: Array2<f32>,
    inverse: OnceLock<Array2<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for SpectrogramTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramTransform")
            .field("config", &self.config)
            .field("inverse_ready", &self.inverse.get().is_some())
            .finish()
    }
}

impl SpectrogramTransform {
    /// Build the mel basis for `config`
    pub fn new(config: MelConfig) -> Result<Self> {
        let basis = build_mel_basis(&config)?;
        tracing::debug!(
            "Built mel basis {}x{} (sr={}, fmin={}, fmax={})",
            basis.nrows(),
            basis.ncols(),
            config.sample_rate,
            config.fmin,
            config.fmax
        );

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Ok(Self {
            config,
            basis,
            inverse: OnceLock::new(),
            fft,
        })
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    /// The `(num_mels, n_fft / 2 + 1)` filter bank
    pub fn basis(&self) -> &Array2<f32> {
        &self.basis
    }

    /// The `(n_fft / 2 + 1, num_mels)` pseudo-inverse of the filter bank
    pub fn inverse_basis(&self) -> &Array2<f32> {
        self.inverse.get_or_init(|| {
            let _span = tracing::info_span!("mel_pinv").entered();
            pinv(&self.basis)
        })
    }

    /// Project a `[n_freqs, frames]` linear spectrogram onto the mel axis
    pub fn linear_to_mel<S>(&self, spectrogram: &ArrayBase<S, Ix2>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
    {
        ensure!(
            spectrogram.nrows() == self.config.n_freqs(),
            "Expected {} frequency bins, got {}",
            self.config.n_freqs(),
            spectrogram.nrows()
        );
        Ok(self.basis.dot(spectrogram))
    }

    /// Map a `[num_mels, frames]` mel spectrogram back to linear frequency.
    ///
    /// Values are floored at [`MEL_TO_LINEAR_FLOOR`].
    pub fn mel_to_linear<S>(&self, mel: &ArrayBase<S, Ix2>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
    {
        ensure!(
            mel.nrows() == self.config.num_mels,
            "Expected {} mel bins, got {}",
            self.config.num_mels,
            mel.nrows()
        );
        Ok(self
            .inverse_basis()
            .dot(mel)
            .mapv_into(|v| v.max(MEL_TO_LINEAR_FLOOR)))
    }

    /// Magnitude of the centered STFT, shape `[n_fft / 2 + 1, frames]`.
    ///
    /// The signal is reflect-padded by `n_fft / 2` on both sides and framed
    /// every `hop_length` samples, giving `1 + len / hop_length` frames. A
    /// periodic Hann window of `win_length` is centered in each FFT frame.
    pub fn stft_magnitude(
        &self,
        samples: &[f32],
        hop_length: usize,
        win_length: usize,
    ) -> Result<Array2<f32>> {
        let n_fft = self.config.n_fft;
        ensure!(!samples.is_empty(), "Cannot compute STFT of an empty signal");
        ensure!(hop_length > 0, "hop_length must be positive");
        ensure!(
            win_length > 0 && win_length <= n_fft,
            "win_length={} must be in 1..={}",
            win_length,
            n_fft
        );

        // Window zero-padded to n_fft, centered
        let mut window = vec![0.0f32; n_fft];
        let offset = (n_fft - win_length) / 2;
        window[offset..offset + win_length].copy_from_slice(&hann_window(win_length));

        let pad = (n_fft / 2) as isize;
        let n_frames = 1 + samples.len() / hop_length;
        let n_freqs = self.config.n_freqs();
        let mut magnitudes = Array2::<f32>::zeros((n_freqs, n_frames));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame in 0..n_frames {
            let start = (frame * hop_length) as isize - pad;
            for (j, slot) in buffer.iter_mut().enumerate() {
                let sample = samples[reflect_index(start + j as isize, samples.len())];
                *slot = Complex::new(sample * window[j], 0.0);
            }

            self.fft.process(&mut buffer);

            for (bin, value) in buffer.iter().take(n_freqs).enumerate() {
                magnitudes[[bin, frame]] = value.norm();
            }
        }

        Ok(magnitudes)
    }
}
