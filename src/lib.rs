//! # tacotron-audio
//!
//! Audio signal processing and tensor helpers for training Tacotron-2 style
//! acoustic models and WaveNet vocoders.
//!
//! ## Features
//!
//! - **Mu-law codec**: companding, expansion, quantization and
//!   dequantization over `ndarray` arrays or candle tensors ([`MuLaw`])
//! - **Spectrograms**: centered STFT, Slaney mel filter bank and its
//!   pseudo-inverse, cached per configuration ([`SpectrogramTransform`])
//! - **Normalization**: dB conversion and bounded symmetric/unsigned
//!   normalization with optional clipping
//! - **Preprocessing**: WAV I/O, resampling, silence trimming, feature
//!   extraction aligned to the vocoder's hop size ([`FeatureExtractor`])
//! - **Training**: batch padding, sequence masks, masked MSE and weighted
//!   sigmoid cross entropy, running loss averages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tacotron_audio::{load_wav, AudioConfig, FeatureExtractor};
//!
//! let config = AudioConfig::from_file("hparams.json")?;
//! let extractor = FeatureExtractor::new(config)?;
//!
//! let audio = load_wav("speech.wav", Some(extractor.config().sample_rate))?;
//! let features = extractor.extract(&audio.samples)?;
//! println!("{} mel frames", features.mel_frames());
//! ```
//!
//! ## Conventions
//!
//! Spectrograms are `[bins, frames]`. The mu-law functions take the alphabet
//! size (`256` for 8-bit codes) and compand with `mu - 1`. Numeric edge cases
//! such as `mu <= 1` produce NaN/Inf instead of errors; invalid configuration
//! and violated preconditions are reported through [`anyhow::Result`].

pub mod audio;
pub mod config;
pub mod training;

pub use audio::{
    load_wav, save_float_wav, save_wav, AudioBuffer, EncodedAudio, FeatureExtractor, Features,
    MelConfig, MuLaw, NormalizationConfig, SpectrogramTransform, DEFAULT_MU,
};
pub use config::{AudioConfig, InputType};
pub use training::ValueWindow;
