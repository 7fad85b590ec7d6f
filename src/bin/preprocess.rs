//! Preprocessing CLI for speech synthesis training data
//!
//! Usage:
//!     cargo run --features cli --bin preprocess -- features speech.wav --out-dir features/
//!     cargo run --features cli --bin preprocess -- resample wavs/ --sample-rate 22050
//!     cargo run --features cli --bin preprocess -- hparams --config hparams.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray_npy::write_npy;
use std::path::{Path, PathBuf};

use tacotron_audio::audio::resample::resample_dir_with;
use tacotron_audio::audio::trim::trim_silence;
use tacotron_audio::{load_wav, AudioConfig, EncodedAudio, FeatureExtractor};

/// Prepare audio features for Tacotron/WaveNet training
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute mel/linear spectrograms and the encoded waveform of a WAV file
    Features {
        /// Input WAV file
        wav: PathBuf,

        /// Directory receiving mel.npy, linear.npy and audio.npy
        #[arg(short, long, default_value = "features")]
        out_dir: PathBuf,

        /// Hyperparameter JSON file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trim leading and trailing silence before extraction
        #[arg(long)]
        trim: bool,
    },

    /// Resample every WAV file in a directory
    Resample {
        /// Directory containing .wav files
        input_dir: PathBuf,

        /// Output directory (defaults to <input_dir>/resampled)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Target sample rate in Hz
        #[arg(short, long, default_value_t = 22050)]
        sample_rate: u32,
    },

    /// Print the hyperparameters in effect
    Hparams {
        /// Hyperparameter JSON file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AudioConfig> {
    match path {
        Some(path) => AudioConfig::from_file(path),
        None => Ok(AudioConfig::default()),
    }
}

fn run_features(wav: &Path, out_dir: &Path, config: Option<&Path>, trim: bool) -> Result<()> {
    let config = load_config(config)?;
    let extractor = FeatureExtractor::new(config)?;
    let config = extractor.config();

    let audio = load_wav(wav, Some(config.sample_rate))?;
    tracing::info!(
        "Loaded {} ({:.2}s at {} Hz)",
        wav.display(),
        audio.duration(),
        audio.sample_rate
    );

    let samples = if trim {
        let trimmed = trim_silence(
            &audio.samples,
            config.trim_top_db,
            config.trim_fft_size,
            config.trim_hop_size,
        )?;
        tracing::info!(
            "Trimmed {} -> {} samples",
            audio.samples.len(),
            trimmed.len()
        );
        trimmed
    } else {
        audio.samples
    };

    let features = extractor.extract(&samples)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    // Stored frames-major, [frames, bins]
    write_npy(out_dir.join("mel.npy"), &features.mel.t())
        .context("Failed to write mel.npy")?;
    write_npy(out_dir.join("linear.npy"), &features.linear.t())
        .context("Failed to write linear.npy")?;
    match &features.audio {
        EncodedAudio::Codes(codes) => write_npy(out_dir.join("audio.npy"), codes),
        EncodedAudio::Samples(samples) => write_npy(out_dir.join("audio.npy"), samples),
    }
    .context("Failed to write audio.npy")?;

    tracing::info!(
        "Wrote {} mel frames ({} x {}), linear {} x {}, {} {} time steps to {}",
        features.mel_frames(),
        features.mel.ncols(),
        features.mel.nrows(),
        features.linear.ncols(),
        features.linear.nrows(),
        features.time_steps(),
        config.input_type,
        out_dir.display()
    );
    Ok(())
}

fn run_resample(input_dir: &Path, output_dir: Option<&Path>, sample_rate: u32) -> Result<()> {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("#>-"),
    );

    let written = resample_dir_with(input_dir, output_dir, sample_rate, |done, total, _| {
        progress.set_length(total as u64);
        progress.set_position(done as u64);
    })?;
    progress.finish();

    tracing::info!("Done, {} files resampled", written.len());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Command::Features {
            wav,
            out_dir,
            config,
            trim,
        } => run_features(&wav, &out_dir, config.as_deref(), trim),
        Command::Resample {
            input_dir,
            output_dir,
            sample_rate,
        } => run_resample(&input_dir, output_dir.as_deref(), sample_rate),
        Command::Hparams { config } => {
            println!("{}", load_config(config.as_deref())?);
            Ok(())
        }
    }
}
