//! Audio hyperparameters for feature extraction and training targets

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::audio::{MelConfig, NormalizationConfig};

/// How the vocoder consumes the waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    /// Mu-law companded, then quantized to `quantize_channels` integer classes
    #[serde(rename = "mulaw-quantize")]
    MulawQuantize,
    /// Mu-law companded, kept continuous
    #[serde(rename = "mulaw")]
    Mulaw,
    /// Raw waveform in [-1, 1]
    #[serde(rename = "raw")]
    Raw,
}

impl InputType {
    pub fn is_mulaw_quantize(self) -> bool {
        self == InputType::MulawQuantize
    }

    pub fn is_mulaw(self) -> bool {
        self == InputType::Mulaw
    }

    pub fn is_raw(self) -> bool {
        self == InputType::Raw
    }

    /// Whether the model sees a single scalar per timestep (as opposed to a class index)
    pub fn is_scalar_input(self) -> bool {
        self.is_raw() || self.is_mulaw()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputType::MulawQuantize => "mulaw-quantize",
            InputType::Mulaw => "mulaw",
            InputType::Raw => "raw",
        }
    }
}

impl FromStr for InputType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mulaw-quantize" => Ok(InputType::MulawQuantize),
            "mulaw" => Ok(InputType::Mulaw),
            "raw" => Ok(InputType::Raw),
            other => bail!(
                "Invalid input type '{}': expected 'mulaw-quantize', 'mulaw' or 'raw'",
                other
            ),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio hyperparameters shared by preprocessing and training.
///
/// Every field has a default, so a JSON file only needs to list overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of the training audio
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// FFT size
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,

    /// Hop between STFT frames in samples (takes precedence over `frame_shift_ms`)
    #[serde(default = "default_hop_size")]
    pub hop_size: Option<usize>,

    /// Hop in milliseconds, used only when `hop_size` is unset
    #[serde(default)]
    pub frame_shift_ms: Option<f32>,

    /// STFT window length
    #[serde(default = "default_win_size")]
    pub win_size: usize,

    /// Number of mel bands
    #[serde(default = "default_num_mels")]
    pub num_mels: usize,

    /// Lowest mel filter frequency (Hz)
    #[serde(default = "default_fmin")]
    pub fmin: f32,

    /// Highest mel filter frequency (Hz), at most `sample_rate / 2`
    #[serde(default = "default_fmax")]
    pub fmax: f32,

    /// dB floor for amplitude conversion, always negative
    #[serde(default = "default_min_level_db")]
    pub min_level_db: f32,

    /// Reference level subtracted after dB conversion
    #[serde(default = "default_ref_level_db")]
    pub ref_level_db: f32,

    /// Bound of the normalized target range
    #[serde(default = "default_max_abs_value")]
    pub max_abs_value: f32,

    /// Normalize into [-max, max] instead of [0, max]
    #[serde(default = "default_true")]
    pub symmetric_mels: bool,

    /// Clamp out-of-range values instead of rejecting them
    #[serde(default = "default_true")]
    pub allow_clipping_in_normalization: bool,

    /// Whether spectrogram features are normalized at all
    #[serde(default = "default_true")]
    pub signal_normalization: bool,

    /// Waveform representation fed to the vocoder
    #[serde(default = "default_input_type")]
    pub input_type: InputType,

    /// Mu-law alphabet size
    #[serde(default = "default_quantize_channels")]
    pub quantize_channels: u32,

    /// Decoder frames predicted per step (reduction factor `r`)
    #[serde(default = "default_outputs_per_step")]
    pub outputs_per_step: usize,

    /// Silence threshold in dB below peak for trimming
    #[serde(default = "default_trim_top_db")]
    pub trim_top_db: f32,

    /// Frame length used for silence trimming
    #[serde(default = "default_trim_fft_size")]
    pub trim_fft_size: usize,

    /// Hop used for silence trimming
    #[serde(default = "default_trim_hop_size")]
    pub trim_hop_size: usize,

    /// Distance from the mu-law midpoint still counted as silence
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: i64,

    /// Positive class weight for the stop-token loss
    #[serde(default = "default_cross_entropy_pos_weight")]
    pub cross_entropy_pos_weight: f32,
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_n_fft() -> usize {
    1024
}

fn default_hop_size() -> Option<usize> {
    Some(256)
}

fn default_win_size() -> usize {
    1024
}

fn default_num_mels() -> usize {
    80
}

fn default_fmin() -> f32 {
    55.0
}

fn default_fmax() -> f32 {
    7600.0
}

fn default_min_level_db() -> f32 {
    -100.0
}

fn default_ref_level_db() -> f32 {
    20.0
}

fn default_max_abs_value() -> f32 {
    4.0
}

fn default_true() -> bool {
    true
}

fn default_input_type() -> InputType {
    InputType::Raw
}

fn default_quantize_channels() -> u32 {
    256
}

fn default_outputs_per_step() -> usize {
    1
}

fn default_trim_top_db() -> f32 {
    23.0
}

fn default_trim_fft_size() -> usize {
    512
}

fn default_trim_hop_size() -> usize {
    128
}

fn default_silence_threshold() -> i64 {
    2
}

fn default_cross_entropy_pos_weight() -> f32 {
    1.0
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            n_fft: default_n_fft(),
            hop_size: default_hop_size(),
            frame_shift_ms: None,
            win_size: default_win_size(),
            num_mels: default_num_mels(),
            fmin: default_fmin(),
            fmax: default_fmax(),
            min_level_db: default_min_level_db(),
            ref_level_db: default_ref_level_db(),
            max_abs_value: default_max_abs_value(),
            symmetric_mels: true,
            allow_clipping_in_normalization: true,
            signal_normalization: true,
            input_type: default_input_type(),
            quantize_channels: default_quantize_channels(),
            outputs_per_step: default_outputs_per_step(),
            trim_top_db: default_trim_top_db(),
            trim_fft_size: default_trim_fft_size(),
            trim_hop_size: default_trim_hop_size(),
            silence_threshold: default_silence_threshold(),
            cross_entropy_pos_weight: default_cross_entropy_pos_weight(),
        }
    }
}

impl AudioConfig {
    /// Load configuration from a local JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Check the parameters that would otherwise fail deep inside extraction
    pub fn validate(&self) -> Result<()> {
        self.normalization()
            .validate()
            .context("Invalid normalization parameters")?;
        ensure!(
            self.quantize_channels >= 2,
            "quantize_channels must be at least 2, got {}",
            self.quantize_channels
        );
        ensure!(self.n_fft > 0, "n_fft must be positive");
        ensure!(self.num_mels > 0, "num_mels must be positive");
        Ok(())
    }

    /// Hop size in samples.
    ///
    /// Uses `hop_size` when set, otherwise derives it from `frame_shift_ms`.
    pub fn hop_size(&self) -> Result<usize> {
        if let Some(hop) = self.hop_size {
            return Ok(hop);
        }
        let Some(shift_ms) = self.frame_shift_ms else {
            bail!("Either hop_size or frame_shift_ms must be set");
        };
        let hop = (shift_ms / 1000.0 * self.sample_rate as f32) as usize;
        ensure!(hop > 0, "frame_shift_ms={} gives a zero hop size", shift_ms);
        Ok(hop)
    }

    /// Parameters of the spectrogram normalizer
    pub fn normalization(&self) -> NormalizationConfig {
        NormalizationConfig {
            min_level_db: self.min_level_db,
            max_abs_value: self.max_abs_value,
            symmetric_mels: self.symmetric_mels,
            allow_clipping_in_normalization: self.allow_clipping_in_normalization,
        }
    }

    /// Parameters of the mel filter bank
    pub fn mel(&self) -> MelConfig {
        MelConfig {
            sample_rate: self.sample_rate,
            n_fft: self.n_fft,
            num_mels: self.num_mels,
            fmin: self.fmin,
            fmax: self.fmax,
        }
    }
}

impl fmt::Display for AudioConfig {
    /// One `name: value` line per hyperparameter, sorted by name
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        writeln!(f, "Hyperparameters:")?;
        if let serde_json::Value::Object(map) = value {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let lines: Vec<String> = entries
                .iter()
                .map(|(name, v)| match v {
                    serde_json::Value::String(s) => format!("  {name}: {s}"),
                    other => format!("  {name}: {other}"),
                })
                .collect();
            write!(f, "{}", lines.join("\n"))?;
        }
        Ok(())
    }
}
