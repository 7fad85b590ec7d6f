//! Waveform to training features
//!
//! [`FeatureExtractor`] ties one [`AudioConfig`] to its [`SpectrogramTransform`]
//! and produces normalized dB spectrograms plus the waveform encoding the
//! vocoder is trained on.

use anyhow::{ensure, Context, Result};
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix2};

use super::mulaw::MuLaw;
use super::normalize::{amp_to_db, db_to_amp, denormalize, normalize};
use super::trim::{pad_lr, silence_code, start_and_end_indices};
use super::SpectrogramTransform;
use crate::config::{AudioConfig, InputType};

/// Waveform as the vocoder sees it
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedAudio {
    /// Mu-law codes (`mulaw-quantize`)
    Codes(Array1<i64>),
    /// Companded (`mulaw`) or raw (`raw`) samples
    Samples(Array1<f32>),
}

impl EncodedAudio {
    pub fn len(&self) -> usize {
        match self {
            Self::Codes(codes) => codes.len(),
            Self::Samples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Features of one utterance
#[derive(Debug, Clone)]
pub struct Features {
    /// `[num_mels, frames]`
    pub mel: Array2<f32>,
    /// `[n_fft / 2 + 1, frames]`
    pub linear: Array2<f32>,
    /// Encoded waveform, `frames * hop_size` long
    pub audio: EncodedAudio,
}

impl Features {
    pub fn mel_frames(&self) -> usize {
        self.mel.ncols()
    }

    pub fn time_steps(&self) -> usize {
        self.audio.len()
    }
}

/// Spectrogram and waveform feature extraction for one configuration
#[derive(Debug)]
pub struct FeatureExtractor {
    config: AudioConfig,
    transform: SpectrogramTransform,
    hop_size: usize,
}

impl FeatureExtractor {
    /// Validate `config` and build its mel basis
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;
        let hop_size = config.hop_size()?;
        ensure!(
            config.n_fft >= hop_size,
            "n_fft={} is smaller than hop_size={}",
            config.n_fft,
            hop_size
        );
        let transform = SpectrogramTransform::new(config.mel())?;
        Ok(Self {
            config,
            transform,
            hop_size,
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn transform(&self) -> &SpectrogramTransform {
        &self.transform
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn magnitude(&self, samples: &[f32]) -> Result<Array2<f32>> {
        self.transform
            .stft_magnitude(samples, self.hop_size, self.config.win_size)
    }

    /// Shift by `ref_level_db` and normalize when `signal_normalization` is on
    fn finish_db(&self, amplitude: &Array2<f32>) -> Result<Array2<f32>> {
        let db = amp_to_db(amplitude, self.config.min_level_db) - self.config.ref_level_db;
        if self.config.signal_normalization {
            normalize(&db, &self.config.normalization())
        } else {
            Ok(db)
        }
    }

    /// Undo [`finish_db`](Self::finish_db), back to linear amplitude
    fn undo_db<S>(&self, spectrogram: &ArrayBase<S, Ix2>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let db = if self.config.signal_normalization {
            denormalize(spectrogram, &self.config.normalization())
        } else {
            spectrogram.to_owned()
        };
        db_to_amp(&(db + self.config.ref_level_db))
    }

    /// `[n_fft / 2 + 1, frames]` dB spectrogram
    pub fn linear_spectrogram(&self, samples: &[f32]) -> Result<Array2<f32>> {
        let magnitude = self.magnitude(samples)?;
        self.finish_db(&magnitude)
    }

    /// `[num_mels, frames]` dB mel spectrogram
    pub fn melspectrogram(&self, samples: &[f32]) -> Result<Array2<f32>> {
        let magnitude = self.magnitude(samples)?;
        let mel = self.transform.linear_to_mel(&magnitude)?;
        self.finish_db(&mel)
    }

    /// Linear magnitude recovered from a [`linear_spectrogram`](Self::linear_spectrogram)
    pub fn inv_linear_magnitude<S>(&self, spectrogram: &ArrayBase<S, Ix2>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        self.undo_db(spectrogram)
    }

    /// Linear magnitude recovered from a [`melspectrogram`](Self::melspectrogram)
    /// through the pseudo-inverse of the mel basis
    pub fn inv_mel_to_linear_magnitude<S>(&self, mel: &ArrayBase<S, Ix2>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
    {
        let amplitude = self.undo_db(mel);
        self.transform.mel_to_linear(&amplitude)
    }

    /// Encode samples according to `input_type`
    pub fn encode(&self, samples: &[f32]) -> Result<EncodedAudio> {
        let wav = Array1::from_vec(samples.to_vec());
        let mu = self.config.quantize_channels;
        Ok(match self.config.input_type {
            InputType::MulawQuantize => EncodedAudio::Codes(wav.quantize(mu)?),
            InputType::Mulaw => EncodedAudio::Samples(wav.companding(mu)?),
            InputType::Raw => EncodedAudio::Samples(wav),
        })
    }

    /// Spectrograms plus a waveform encoding aligned to them.
    ///
    /// For `mulaw-quantize`, leading and trailing samples whose code stays
    /// within `silence_threshold` of silence are dropped first. The encoded
    /// waveform is padded with silence and cut to exactly
    /// `mel_frames * hop_size` samples.
    pub fn extract(&self, samples: &[f32]) -> Result<Features> {
        let silence = silence_code(self.config.quantize_channels);
        let (samples, encoded) = match self.encode(samples)? {
            EncodedAudio::Codes(codes) => {
                let (start, end) = start_and_end_indices(
                    codes.as_slice().context("Mu-law codes are not contiguous")?,
                    silence,
                    self.config.silence_threshold,
                )?;
                (
                    &samples[start..=end],
                    EncodedAudio::Codes(codes.slice_move(s![start..=end])),
                )
            }
            samples_only => (samples, samples_only),
        };

        let mel = self.melspectrogram(samples)?;
        let linear = self.linear_spectrogram(samples)?;
        let frames = mel.ncols();

        let (left, right) = pad_lr(samples.len(), self.config.n_fft, self.hop_size)?;
        let target = frames * self.hop_size;
        ensure!(
            samples.len() + left + right >= target,
            "Padded audio ({} samples) is shorter than {} frames",
            samples.len() + left + right,
            frames
        );

        let audio = match encoded {
            EncodedAudio::Codes(codes) => {
                EncodedAudio::Codes(pad_and_cut(&codes, left, right, silence, target))
            }
            EncodedAudio::Samples(wav) => {
                EncodedAudio::Samples(pad_and_cut(&wav, left, right, 0.0, target))
            }
        };

        tracing::debug!(
            "Extracted {} mel frames, {} time steps",
            frames,
            audio.len()
        );

        Ok(Features { mel, linear, audio })
    }
}

fn pad_and_cut<T: Clone>(
    values: &Array1<T>,
    left: usize,
    right: usize,
    fill: T,
    target: usize,
) -> Array1<T> {
    let mut padded = Array1::from_elem(values.len() + left + right, fill);
    padded
        .slice_mut(s![left..left + values.len()])
        .assign(values);
    padded.slice_move(s![..target])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / 22050.0).sin())
            .collect()
    }

    fn extractor(input_type: InputType) -> FeatureExtractor {
        FeatureExtractor::new(AudioConfig {
            input_type,
            ..AudioConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_spectrogram_shapes() {
        let fx = extractor(InputType::Raw);
        let wav = sine(4096);
        let mel = fx.melspectrogram(&wav).unwrap();
        let linear = fx.linear_spectrogram(&wav).unwrap();
        assert_eq!(mel.shape(), &[80, 1 + 4096 / 256]);
        assert_eq!(linear.shape(), &[513, 1 + 4096 / 256]);
    }

    #[test]
    fn test_normalized_range() {
        let fx = extractor(InputType::Raw);
        let mel = fx.melspectrogram(&sine(4096)).unwrap();
        assert!(mel.iter().all(|&v| (-4.0..=4.0).contains(&v)));
        assert!(mel.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_unnormalized_is_shifted_db() {
        let fx = FeatureExtractor::new(AudioConfig {
            signal_normalization: false,
            ..AudioConfig::default()
        })
        .unwrap();
        let linear = fx.linear_spectrogram(&vec![0.0; 1024]).unwrap();
        // Silence sits at the dB floor minus the reference level
        assert!(linear.iter().all(|&v| (v + 120.0).abs() < 1e-3));
    }

    #[test]
    fn test_inv_linear_magnitude_recovers_stft() {
        let fx = extractor(InputType::Raw);
        let wav = sine(2048);
        let magnitude = fx.transform().stft_magnitude(&wav, 256, 1024).unwrap();
        let recovered = fx.inv_linear_magnitude(&fx.linear_spectrogram(&wav).unwrap());
        // Within the normalized dynamic range the round trip is exact
        for (a, b) in magnitude.iter().zip(recovered.iter()) {
            if *a > 1e-3 && *a < 10.0 {
                assert!((a - b).abs() / a < 1e-3, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_inv_mel_to_linear_magnitude_shape_and_floor() {
        let fx = extractor(InputType::Raw);
        let mel = fx.melspectrogram(&sine(2048)).unwrap();
        let linear = fx.inv_mel_to_linear_magnitude(&mel).unwrap();
        assert_eq!(linear.shape(), &[513, mel.ncols()]);
        assert!(linear.iter().all(|&v| v >= 1e-10));
    }

    #[test]
    fn test_encode_per_input_type() {
        let wav = [0.0f32, 0.5, -1.0];
        match extractor(InputType::MulawQuantize).encode(&wav).unwrap() {
            EncodedAudio::Codes(codes) => {
                assert_eq!(codes[0], 127);
                assert_eq!(codes[2], 0);
            }
            other => panic!("expected codes, got {other:?}"),
        }
        match extractor(InputType::Mulaw).encode(&wav).unwrap() {
            EncodedAudio::Samples(y) => assert!((y[2] + 1.0).abs() < 1e-6),
            other => panic!("expected samples, got {other:?}"),
        }
        assert_eq!(
            extractor(InputType::Raw).encode(&wav).unwrap(),
            EncodedAudio::Samples(Array1::from_vec(wav.to_vec()))
        );
    }

    #[test]
    fn test_extract_aligns_audio_to_frames() {
        for input_type in [InputType::Raw, InputType::Mulaw, InputType::MulawQuantize] {
            let fx = extractor(input_type);
            let features = fx.extract(&sine(5000)).unwrap();
            assert_eq!(features.linear.ncols(), features.mel_frames());
            assert_eq!(features.time_steps(), features.mel_frames() * 256);
        }
    }

    #[test]
    fn test_extract_trims_quantized_silence() {
        let fx = extractor(InputType::MulawQuantize);
        let mut wav = vec![0.0f32; 1000];
        wav.extend(sine(3000));
        wav.extend(vec![0.0f32; 1000]);

        let features = fx.extract(&wav).unwrap();
        // Leading silence is gone, so fewer frames than the untrimmed signal
        assert!(features.mel_frames() < 1 + wav.len() / 256);
    }

    #[test]
    fn test_extract_all_silent_quantized_fails() {
        let fx = extractor(InputType::MulawQuantize);
        assert!(fx.extract(&vec![0.0; 2048]).is_err());
    }

    #[test]
    fn test_extract_hop_larger_than_half_frame() {
        // n_fft + clip length < 2 * hop once the clip is trimmed to one sample
        let fx = FeatureExtractor::new(AudioConfig {
            hop_size: Some(600),
            input_type: InputType::MulawQuantize,
            ..AudioConfig::default()
        })
        .unwrap();
        let mut wav = vec![0.0f32; 50];
        wav[25] = 0.5;

        let features = fx.extract(&wav).unwrap();
        assert_eq!(features.mel_frames(), 1);
        assert_eq!(features.time_steps(), 600);
        match &features.audio {
            EncodedAudio::Codes(codes) => {
                assert_eq!(codes.iter().filter(|&&c| c != 127).count(), 1);
            }
            other => panic!("expected codes, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_trims_against_channel_silence_code() {
        let fx = FeatureExtractor::new(AudioConfig {
            input_type: InputType::MulawQuantize,
            quantize_channels: 16,
            ..AudioConfig::default()
        })
        .unwrap();
        let mut wav = vec![0.0f32; 2000];
        wav.extend(sine(3000));
        wav.extend(vec![0.0f32; 2000]);

        let features = fx.extract(&wav).unwrap();
        assert!(features.mel_frames() < 1 + wav.len() / 256);
        match &features.audio {
            EncodedAudio::Codes(codes) => {
                assert!(codes.iter().all(|&c| (0..16).contains(&c)));
                // Left padding uses the 16-channel silence code
                assert_eq!(codes[0], 7);
            }
            other => panic!("expected codes, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_invalid_max_abs_value() {
        for max_abs_value in [-4.0, 0.0, f32::NAN] {
            let config = AudioConfig {
                max_abs_value,
                ..AudioConfig::default()
            };
            assert!(FeatureExtractor::new(config).is_err(), "{max_abs_value}");
        }
    }

    #[test]
    fn test_rejects_missing_hop() {
        let config = AudioConfig {
            hop_size: None,
            frame_shift_ms: None,
            ..AudioConfig::default()
        };
        assert!(FeatureExtractor::new(config).is_err());
    }
}
