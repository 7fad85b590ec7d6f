//! Audio resampling using rubato
//!
//! Single-buffer resampling plus a batch helper that converts every WAV
//! file in a directory.

use anyhow::{ensure, Context, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::{Path, PathBuf};

use super::io::{load_wav, save_float_wav};
use super::AudioBuffer;

/// Name of the directory created next to the inputs when no output is given
pub const RESAMPLED_DIR: &str = "resampled";

/// Resampling quality preset
#[derive(Debug, Clone, Copy, Default)]
pub enum ResampleQuality {
    /// Cubic polynomial interpolation
    Fast,
    /// Sinc interpolation, 128 taps
    #[default]
    Normal,
    /// Sinc interpolation, 256 taps
    High,
}

/// Audio resampler
pub struct Resampler {
    quality: ResampleQuality,
}

impl Resampler {
    pub fn new(quality: ResampleQuality) -> Self {
        Self { quality }
    }

    /// Resample audio to a target sample rate
    pub fn resample(&self, audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if audio.sample_rate == target_rate {
            return Ok(audio.clone());
        }

        let ratio = target_rate as f64 / audio.sample_rate as f64;
        let chunk_size = 1024;
        let expected = output_len(audio.len(), audio.sample_rate, target_rate);

        let output = if matches!(self.quality, ResampleQuality::Fast) {
            let mut resampler =
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                    .context("Failed to create fast resampler")?;
            process_chunks(&mut resampler, &audio.samples, chunk_size, expected)?
        } else {
            let taps = if matches!(self.quality, ResampleQuality::High) {
                256
            } else {
                128
            };
            let params = SincInterpolationParameters {
                sinc_len: taps,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: taps,
                window: WindowFunction::BlackmanHarris2,
            };
            let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, 1)
                .context("Failed to create sinc resampler")?;
            process_chunks(&mut resampler, &audio.samples, chunk_size, expected)?
        };

        Ok(AudioBuffer::new(output, target_rate))
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(ResampleQuality::Normal)
    }
}

/// `ceil(len * to / from)`, the length of a signal once resampled
fn output_len(len: usize, from: u32, to: u32) -> usize {
    let scaled = len as u64 * u64::from(to);
    scaled.div_ceil(u64::from(from)) as usize
}

/// Feed mono samples through a fixed-input resampler.
///
/// Zero chunks are appended until the resampler's output delay is flushed.
/// The delay is dropped from the front and the result cut to `expected`
/// samples, so output sample `i` lines up with input time `i / ratio`.
fn process_chunks<R: RubatoResampler<f32>>(
    resampler: &mut R,
    samples: &[f32],
    chunk_size: usize,
    expected: usize,
) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(delay + expected + chunk_size);
    let mut chunks = samples.chunks(chunk_size);

    while output.len() < delay + expected {
        let mut data = chunks.next().map(<[f32]>::to_vec).unwrap_or_default();
        data.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[data], None)
            .context("Resampling failed")?;
        let channel = result.into_iter().next().unwrap_or_default();
        ensure!(!channel.is_empty(), "Resampler produced no output");
        output.extend(channel);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

/// Resample with the default quality
pub fn resample(audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    Resampler::default().resample(audio, target_rate)
}

/// `.wav` files directly inside `dir`, sorted by name
pub fn list_wav_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "wav") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load `input`, resample it to `sample_rate` and write it as float WAV to `output`
pub fn resample_file(input: &Path, output: &Path, sample_rate: u32) -> Result<()> {
    let audio = load_wav(input, Some(sample_rate))?;
    save_float_wav(output, &audio.samples, sample_rate).with_context(|| {
        format!(
            "Could not write wav file {}, check folder permission",
            output.display()
        )
    })
}

/// Resample every `.wav` file in `input_dir` to `sample_rate`.
///
/// Outputs keep their file names and go to `output_dir`, or to
/// `input_dir/resampled/` when none is given. Returns the written paths.
pub fn resample_dir<P: AsRef<Path>>(
    input_dir: P,
    output_dir: Option<&Path>,
    sample_rate: u32,
) -> Result<Vec<PathBuf>> {
    resample_dir_with(input_dir, output_dir, sample_rate, |_, _, _| {})
}

/// [`resample_dir`], calling `on_file(done, total, output)` after each file
/// is written.
pub fn resample_dir_with<P, F>(
    input_dir: P,
    output_dir: Option<&Path>,
    sample_rate: u32,
    mut on_file: F,
) -> Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: FnMut(usize, usize, &Path),
{
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input_dir.join(RESAMPLED_DIR));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let files = list_wav_files(input_dir)?;
    tracing::info!(
        "Resampling {} files from {} to {} Hz",
        files.len(),
        input_dir.display(),
        sample_rate
    );

    let total = files.len();
    let mut written = Vec::with_capacity(total);
    for input in files {
        let Some(name) = input.file_name() else {
            continue;
        };
        let output = output_dir.join(name);
        resample_file(&input, &output, sample_rate)?;
        on_file(written.len() + 1, total, &output);
        written.push(output);
    }

    tracing::info!("Wrote {} files to {}", written.len(), output_dir.display());
    Ok(written)
}
