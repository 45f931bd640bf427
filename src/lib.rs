//! Real-time spectrum visualizer: FFT bins are bucketed into frequency bands,
//! each band's energy is normalized into a bar height, and one bar per band is
//! drawn every frame.

pub mod analyser;
pub mod audio;
pub mod bands;
pub mod config;
pub mod energy;
pub mod error;
pub mod input;
pub mod normalize;
pub mod render;
pub mod scheduler;
pub mod types;

pub use analyser::{Analyser, AudioAcquirer, FftAnalyser};
pub use bands::compute_bands;
pub use energy::{compute_band_energies, compute_band_energies_with, lift_above_floor};
pub use error::{Result, VisualizerError};
pub use normalize::normalize;
pub use scheduler::{
    ChannelFrames, Control, ControlHandle, DrawSurface, FrameScheduler, Scheduler,
    SchedulerState, TickReport,
};
pub use types::{Band, BandStrategy, BarDraw, EnergyScale, NormalizeMode, PipelineConfig};
