//! WAV loading and saving

use anyhow::{Context, Result};
use candle_core::Tensor;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::Array1;
use std::path::Path;

use super::resample::resample;

/// Peak below which [`save_wav`] stops amplifying
const MIN_PEAK: f32 = 0.01;

/// Mono waveform with its sample rate.
///
/// Samples are 32-bit floats, nominally in \[-1.0, 1.0\].
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono audio samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create from a Candle tensor (assumed shape: `[samples]` or `[1, samples]`)
    pub fn from_tensor(tensor: Tensor, sample_rate: u32) -> Result<Self> {
        let tensor = tensor.flatten_all()?;
        let samples: Vec<f32> = tensor.to_vec1()?;
        Ok(Self::new(samples, sample_rate))
    }

    /// Convert to a Candle tensor
    pub fn to_tensor(&self, device: &candle_core::Device) -> Result<Tensor> {
        Ok(Tensor::new(self.samples.as_slice(), device)?)
    }

    /// Copy the samples into an `ndarray` vector
    pub fn to_array(&self) -> Array1<f32> {
        Array1::from_vec(self.samples.clone())
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Save as peak-normalized 16-bit PCM, see [`save_wav`]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_wav(path, &self.samples, self.sample_rate)
    }

    /// Load a WAV file at its native sample rate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_wav(path, None)
    }
}

/// Load a WAV file as mono, optionally resampling to `sample_rate`.
///
/// Integer formats are scaled to \[-1, 1\]; multi-channel files are averaged.
pub fn load_wav<P: AsRef<Path>>(path: P, sample_rate: Option<u32>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono_samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    let audio = AudioBuffer::new(mono_samples, spec.sample_rate);
    match sample_rate {
        Some(target) if target != audio.sample_rate => {
            tracing::debug!(
                "Resampling {} from {} Hz to {} Hz",
                path.display(),
                audio.sample_rate,
                target
            );
            resample(&audio, target)
        }
        _ => Ok(audio),
    }
}

/// Save samples as 16-bit PCM, scaled so the peak reaches full range.
///
/// The gain is `32767 / max(0.01, peak)`, so near-silent signals are not
/// blown up to full scale.
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    let gain = 32767.0 / peak.max(MIN_PEAK);

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        writer.write_sample((sample * gain) as i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Save samples unscaled as 32-bit float WAV.
pub fn save_float_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}
