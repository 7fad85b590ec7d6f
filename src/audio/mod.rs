//! Audio processing for speech synthesis training data
//!
//! This module provides:
//! - WAV file I/O
//! - Audio resampling
//! - Mu-law companding and quantization
//! - STFT, mel filter banks and their pseudo-inverse
//! - Spectrogram dB conversion and normalization
//! - Silence trimming
//! - End-to-end feature extraction driven by [`AudioConfig`](crate::AudioConfig)

mod features;
mod io;
mod linalg;
mod mel;
pub mod mulaw;
pub mod normalize;
pub mod resample;
pub mod trim;

pub use features::{EncodedAudio, FeatureExtractor, Features};
pub use io::{load_wav, save_float_wav, save_wav, AudioBuffer};
pub use linalg::pinv;
pub use mel::{build_mel_basis, MelConfig, SpectrogramTransform, MEL_TO_LINEAR_FLOOR};
pub use mulaw::{MuLaw, DEFAULT_MU};
pub use normalize::{amp_to_db, db_to_amp, denormalize, normalize, NormalizationConfig};
pub use resample::{resample, resample_dir, resample_dir_with, Resampler};
pub use trim::{silence_code, start_and_end_indices, trim_silence};
