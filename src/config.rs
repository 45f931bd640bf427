//! Command-line arguments and validation of pipeline parameters.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::error::{Result, VisualizerError};
use crate::types::{BandStrategy, EnergyScale, NormalizeMode, PipelineConfig};

pub const MAX_BARS: usize = 1024;
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

/// Where audio is captured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CaptureSource {
    /// Default input device (microphone, line in).
    Input,
    /// Default output device, captured as a loopback stream where the host allows it.
    Loopback,
}

/// Normalization mode as chosen on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NormalizeArg {
    Max,
    MinMax,
    Fixed,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "bandscope")]
#[command(about = "Real-time audio spectrum visualizer", long_about = None)]
pub struct Args {
    /// Number of bars (frequency bands)
    #[arg(short, long, default_value_t = 64)]
    pub bars: usize,

    /// FFT size in samples; a power of two between 32 and 32768
    #[arg(long, default_value_t = 512)]
    pub fft_size: usize,

    /// How the spectrum is split into bands
    #[arg(short, long, value_enum, default_value_t = BandStrategy::StftLogged)]
    pub strategy: BandStrategy,

    /// How band energies are scaled into bar heights
    #[arg(short, long, value_enum, default_value_t = NormalizeArg::Max)]
    pub normalize: NormalizeArg,

    /// Domain in which bins are averaged into a band
    #[arg(long, value_enum, default_value_t = EnergyScale::Decibel)]
    pub scale: EnergyScale,

    /// Height of the tallest bar, in percent of the chart
    #[arg(short, long, default_value_t = 100.0)]
    pub amplitude: f32,

    /// Level treated as silence, in dB
    #[arg(long, value_name = "DB", default_value_t = -100.0, allow_negative_numbers = true)]
    pub db_floor: f32,

    /// Time smoothing of the analyser, between 0 (none) and 1
    #[arg(long, default_value_t = 0.8)]
    pub smoothing: f32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Audio source
    #[arg(long, value_enum, default_value_t = CaptureSource::Input)]
    pub source: CaptureSource,

    /// Enable debug logging (to bandscope.log unless --log-file is given)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to this file; without it only --debug logs anything
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Builds and validates the initial pipeline configuration.
    ///
    /// The sample rate is a placeholder until the audio device reports its own.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            bar_count: self.bars,
            fft_size: self.fft_size,
            strategy: self.strategy,
            target_amplitude: self.amplitude,
            normalize_mode: self.normalize_mode(),
            energy_scale: self.scale,
            db_floor: self.db_floor,
            ..PipelineConfig::default()
        };
        validate_smoothing(self.smoothing)?;
        if self.fps == 0 || self.fps > 240 {
            return Err(VisualizerError::InvalidParameter(format!(
                "fps must be between 1 and 240, got {}",
                self.fps
            )));
        }
        validate_config(&config)?;
        Ok(config)
    }

    fn normalize_mode(&self) -> NormalizeMode {
        match self.normalize {
            NormalizeArg::Max => NormalizeMode::MaxRelative,
            NormalizeArg::MinMax => NormalizeMode::MinMax,
            // 0 dB sits this far above the floor
            NormalizeArg::Fixed => NormalizeMode::Fixed {
                reference: -self.db_floor,
            },
        }
    }
}

pub fn validate_bar_count(bar_count: usize) -> Result<()> {
    if bar_count == 0 || bar_count > MAX_BARS {
        return Err(VisualizerError::InvalidParameter(format!(
            "bar count must be between 1 and {MAX_BARS}, got {bar_count}"
        )));
    }
    Ok(())
}

pub fn validate_fft_size(fft_size: usize) -> Result<()> {
    if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        return Err(VisualizerError::InvalidParameter(format!(
            "fft size must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}, got {fft_size}"
        )));
    }
    Ok(())
}

pub fn validate_target_amplitude(amplitude: f32) -> Result<()> {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return Err(VisualizerError::InvalidParameter(format!(
            "target amplitude must be positive, got {amplitude}"
        )));
    }
    Ok(())
}

pub fn validate_smoothing(smoothing: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&smoothing) {
        return Err(VisualizerError::InvalidParameter(format!(
            "smoothing must be within [0, 1], got {smoothing}"
        )));
    }
    Ok(())
}

pub fn validate_db_floor(db_floor: f32) -> Result<()> {
    if !db_floor.is_finite() || db_floor >= 0.0 {
        return Err(VisualizerError::InvalidParameter(format!(
            "dB floor must be negative, got {db_floor}"
        )));
    }
    Ok(())
}

pub fn validate_normalize_mode(mode: NormalizeMode) -> Result<()> {
    if let NormalizeMode::Fixed { reference } = mode {
        if !reference.is_finite() || reference <= 0.0 {
            return Err(VisualizerError::InvalidParameter(format!(
                "fixed reference must be positive, got {reference}"
            )));
        }
    }
    Ok(())
}

/// Checks every field of `config` except the sample rate's fit with the strategy.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    validate_bar_count(config.bar_count)?;
    validate_fft_size(config.fft_size)?;
    validate_target_amplitude(config.target_amplitude)?;
    validate_normalize_mode(config.normalize_mode)?;
    validate_db_floor(config.db_floor)?;
    Ok(())
}
