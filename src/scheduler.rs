//! The render loop: one tick turns the analyser's latest spectrum into one
//! draw per bar, and the loop keeps ticking until it is stopped.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info, trace, warn};
use std::fmt;
use std::time::{Duration, Instant};

use crate::analyser::{Analyser, AudioAcquirer};
use crate::bands::compute_bands;
use crate::config::{
    validate_bar_count, validate_config, validate_db_floor, validate_normalize_mode,
    validate_target_amplitude,
};
use crate::energy::{compute_band_energies_with, lift_above_floor};
use crate::error::{Result, VisualizerError};
use crate::normalize::normalize;
use crate::types::{Band, BandStrategy, BarDraw, EnergyScale, NormalizeMode, PipelineConfig};

/// Where draw commands end up.
pub trait DrawSurface {
    /// Called once per tick before any bar is drawn.
    fn begin_frame(&mut self, config: &PipelineConfig, bands: &[Band]) -> Result<()>;

    fn issue_draw(&mut self, bar: BarDraw) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    fn resize_viewport(&mut self, width: u16, height: u16) -> Result<()>;
}

/// Paces the loop. `next_frame` blocks until the next tick is due and
/// returns `None` once the scheduler has been cancelled.
pub trait FrameScheduler {
    fn next_frame(&mut self) -> Option<Instant>;

    fn cancel(&mut self);
}

/// Frame pacing from a `crossbeam_channel::tick` source.
pub struct ChannelFrames {
    ticker: Receiver<Instant>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    cancelled: bool,
}

impl ChannelFrames {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        Self {
            ticker: crossbeam_channel::tick(period),
            cancel_tx,
            cancel_rx,
            cancelled: false,
        }
    }

    /// A handle that cancels the frames from another thread.
    pub fn canceller(&self) -> FrameCanceller {
        FrameCanceller {
            tx: self.cancel_tx.clone(),
        }
    }
}

impl FrameScheduler for ChannelFrames {
    fn next_frame(&mut self) -> Option<Instant> {
        if self.cancelled || self.cancel_rx.try_recv().is_ok() {
            self.cancel();
            return None;
        }
        let tick = crossbeam_channel::select! {
            recv(self.ticker) -> t => t.ok(),
            recv(self.cancel_rx) -> _ => None,
        };
        if tick.is_none() {
            self.cancel();
        }
        tick
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.ticker = crossbeam_channel::never();
    }
}

#[derive(Clone)]
pub struct FrameCanceller {
    tx: Sender<()>,
}

impl FrameCanceller {
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

impl SchedulerState {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerState::Uninitialized => "Uninitialized",
            SchedulerState::Ready => "Ready",
            SchedulerState::Running => "Running",
            SchedulerState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requests from the UI side, applied at the start of the next tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Control {
    SetBarCount(usize),
    SetBandStrategy(BandStrategy),
    SetTargetAmplitude(f32),
    SetNormalizeMode(NormalizeMode),
    SetEnergyScale(EnergyScale),
    SetDbFloor(f32),
    Resize(u16, u16),
    Stop,
}

/// Cloneable sender for [`Control`] requests.
///
/// Sends fail with `InvalidState` once the scheduler has stopped.
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Control>,
}

impl ControlHandle {
    pub fn send(&self, control: Control) -> Result<()> {
        self.tx
            .send(control)
            .map_err(|_| VisualizerError::InvalidState("Stopped"))
    }

    pub fn set_bar_count(&self, n: usize) -> Result<()> {
        self.send(Control::SetBarCount(n))
    }

    pub fn set_band_strategy(&self, strategy: BandStrategy) -> Result<()> {
        self.send(Control::SetBandStrategy(strategy))
    }

    pub fn set_target_amplitude(&self, amplitude: f32) -> Result<()> {
        self.send(Control::SetTargetAmplitude(amplitude))
    }

    pub fn set_normalize_mode(&self, mode: NormalizeMode) -> Result<()> {
        self.send(Control::SetNormalizeMode(mode))
    }

    pub fn set_energy_scale(&self, scale: EnergyScale) -> Result<()> {
        self.send(Control::SetEnergyScale(scale))
    }

    pub fn set_db_floor(&self, db_floor: f32) -> Result<()> {
        self.send(Control::SetDbFloor(db_floor))
    }

    pub fn resize(&self, width: u16, height: u16) -> Result<()> {
        self.send(Control::Resize(width, height))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Control::Stop)
    }
}

/// What happened during one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bars_drawn: usize,
    pub read_failed: bool,
    pub draw_failures: usize,
    pub stopped: bool,
}

struct BandCache {
    sample_rate: u32,
    bar_count: usize,
    strategy: BandStrategy,
    bands: Vec<Band>,
}

pub struct Scheduler<A, S> {
    state: SchedulerState,
    config: PipelineConfig,
    analyser: Option<A>,
    surface: S,
    spectrum: Vec<f32>,
    band_cache: Option<BandCache>,
    controls_tx: Sender<Control>,
    controls_rx: Option<Receiver<Control>>,
    frames: u64,
    failure_streak: u32,
}

impl<A: Analyser, S: DrawSurface> Scheduler<A, S> {
    pub fn new(surface: S, config: PipelineConfig) -> Result<Self> {
        validate_config(&config)?;
        let (controls_tx, controls_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            state: SchedulerState::Uninitialized,
            config,
            analyser: None,
            surface,
            spectrum: Vec::new(),
            band_cache: None,
            controls_tx,
            controls_rx: Some(controls_rx),
            frames: 0,
            failure_streak: 0,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyser(&self) -> Option<&A> {
        self.analyser.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Ticks completed since the loop started.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn controls(&self) -> ControlHandle {
        ControlHandle {
            tx: self.controls_tx.clone(),
        }
    }

    /// Acquires audio and an analyser. On failure the scheduler stays
    /// `Uninitialized` and the error is returned.
    pub fn initialize<Q>(&mut self, acquirer: &mut Q) -> Result<()>
    where
        Q: AudioAcquirer<Analyser = A>,
    {
        if self.state != SchedulerState::Uninitialized {
            return Err(VisualizerError::InvalidState(self.state.name()));
        }

        let analyser = acquirer.acquire(self.config.fft_size).inspect_err(|e| {
            warn!("audio acquisition failed: {e}");
        })?;

        let sample_rate = analyser.sample_rate();
        if let Err(e) = compute_bands(sample_rate, self.config.bar_count, self.config.strategy) {
            warn!("analyser sample rate {sample_rate} Hz rejected: {e}");
            return Err(VisualizerError::AnalyserUnavailable(e.to_string()));
        }

        self.config.sample_rate = sample_rate;
        self.config.fft_size = analyser.fft_size();
        self.spectrum = vec![0.0; analyser.bin_count()];
        self.analyser = Some(analyser);
        self.state = SchedulerState::Ready;
        info!(
            "scheduler ready: {} Hz, fft {}, {} bars",
            self.config.sample_rate, self.config.fft_size, self.config.bar_count
        );
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SchedulerState::Ready => {
                self.state = SchedulerState::Running;
                info!("render loop running");
                Ok(())
            }
            SchedulerState::Running => Ok(()),
            other => Err(VisualizerError::InvalidState(other.name())),
        }
    }

    /// Stops the loop and releases the analyser and the control channel.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        info!("render loop stopping after {} frames", self.frames);
        self.state = SchedulerState::Stopped;
        self.analyser = None;
        self.controls_rx = None;
        self.band_cache = None;
    }

    pub fn set_bar_count(&mut self, bar_count: usize) -> Result<()> {
        validate_bar_count(bar_count)?;
        debug!("bar count {} -> {bar_count}", self.config.bar_count);
        self.config.bar_count = bar_count;
        Ok(())
    }

    pub fn set_band_strategy(&mut self, strategy: BandStrategy) -> Result<()> {
        compute_bands(self.config.sample_rate, 1, strategy)?;
        debug!("band strategy {:?} -> {strategy:?}", self.config.strategy);
        self.config.strategy = strategy;
        Ok(())
    }

    pub fn set_target_amplitude(&mut self, amplitude: f32) -> Result<()> {
        validate_target_amplitude(amplitude)?;
        debug!("target amplitude {} -> {amplitude}", self.config.target_amplitude);
        self.config.target_amplitude = amplitude;
        Ok(())
    }

    pub fn set_normalize_mode(&mut self, mode: NormalizeMode) -> Result<()> {
        validate_normalize_mode(mode)?;
        debug!("normalize mode {:?} -> {mode:?}", self.config.normalize_mode);
        self.config.normalize_mode = mode;
        Ok(())
    }

    pub fn set_energy_scale(&mut self, scale: EnergyScale) -> Result<()> {
        self.config.energy_scale = scale;
        Ok(())
    }

    pub fn set_db_floor(&mut self, db_floor: f32) -> Result<()> {
        validate_db_floor(db_floor)?;
        self.config.db_floor = db_floor;
        Ok(())
    }

    fn apply(&mut self, control: Control) {
        let result = match control {
            Control::SetBarCount(n) => self.set_bar_count(n),
            Control::SetBandStrategy(s) => self.set_band_strategy(s),
            Control::SetTargetAmplitude(v) => self.set_target_amplitude(v),
            Control::SetNormalizeMode(m) => self.set_normalize_mode(m),
            Control::SetEnergyScale(s) => self.set_energy_scale(s),
            Control::SetDbFloor(v) => self.set_db_floor(v),
            Control::Resize(w, h) => self.surface.resize_viewport(w, h),
            Control::Stop => {
                self.stop();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("ignoring {control:?}: {e}");
        }
    }

    fn apply_pending_controls(&mut self) {
        while self.state != SchedulerState::Stopped {
            let next = match &self.controls_rx {
                Some(rx) => rx.try_recv(),
                None => Err(TryRecvError::Disconnected),
            };
            match next {
                Ok(control) => self.apply(control),
                Err(_) => break,
            }
        }
    }

    fn refresh_bands(&mut self) -> Result<()> {
        let sample_rate = self.config.sample_rate.to_bits();
        let fresh = matches!(
            &self.band_cache,
            Some(c) if c.sample_rate == sample_rate
                && c.bar_count == self.config.bar_count
                && c.strategy == self.config.strategy
        );
        if !fresh {
            let bands = compute_bands(
                self.config.sample_rate,
                self.config.bar_count,
                self.config.strategy,
            )?;
            trace!("recomputed {} bands", bands.len());
            self.band_cache = Some(BandCache {
                sample_rate,
                bar_count: self.config.bar_count,
                strategy: self.config.strategy,
                bands,
            });
        }
        Ok(())
    }

    fn report_failure(&mut self, what: &str, err: &VisualizerError) {
        self.failure_streak += 1;
        if self.failure_streak == 1 {
            warn!("{what} failed: {err}");
        } else {
            debug!("{what} failed ({} in a row): {err}", self.failure_streak);
        }
    }

    /// Runs one frame: read, band, aggregate, normalize, draw.
    ///
    /// A failed read or draw is logged and reflected in the report; it never
    /// turns into an error, so the caller keeps scheduling ticks.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.start()?;
        self.apply_pending_controls();
        let mut report = TickReport::default();
        if self.state == SchedulerState::Stopped {
            report.stopped = true;
            return Ok(report);
        }

        let read = match self.analyser.as_mut() {
            Some(analyser) => analyser.read_current_spectrum(&mut self.spectrum),
            None => Err(VisualizerError::AnalyserUnavailable(
                "no analyser attached".into(),
            )),
        };
        if let Err(e) = read {
            self.report_failure("spectrum read", &e);
            report.read_failed = true;
            self.frames += 1;
            return Ok(report);
        }

        if let Err(e) = self.refresh_bands() {
            self.report_failure("band computation", &e);
            self.frames += 1;
            return Ok(report);
        }

        let config = self.config.clone();
        let bands = self
            .band_cache
            .as_ref()
            .map(|c| c.bands.as_slice())
            .unwrap_or_default();
        let energies = compute_band_energies_with(
            &self.spectrum,
            bands,
            config.sample_rate,
            config.fft_size,
            config.energy_scale,
        );
        let levels = lift_above_floor(&energies, config.db_floor);
        let heights = normalize(&levels, config.target_amplitude, config.normalize_mode);

        let total_bars = heights.len();
        if let Err(e) = self.surface.begin_frame(&config, bands) {
            report.draw_failures += 1;
            self.report_failure("frame setup", &e);
        } else {
            for (index, &height) in heights.iter().enumerate() {
                match self.surface.issue_draw(BarDraw {
                    index,
                    height,
                    total_bars,
                }) {
                    Ok(()) => report.bars_drawn += 1,
                    Err(e) => {
                        report.draw_failures += 1;
                        self.report_failure("bar draw", &e);
                    }
                }
            }
            if let Err(e) = self.surface.end_frame() {
                report.draw_failures += 1;
                self.report_failure("frame present", &e);
            }
        }

        if report.draw_failures == 0 {
            if self.failure_streak > 0 {
                info!("rendering recovered after {} failed steps", self.failure_streak);
            }
            self.failure_streak = 0;
        }
        self.frames += 1;
        trace!("frame {} drew {} bars", self.frames, report.bars_drawn);
        Ok(report)
    }

    /// Drives ticks from `frames` until stopped by a [`Control::Stop`] or
    /// by the frame source running dry, then cancels the frame source.
    pub fn run<F: FrameScheduler>(&mut self, frames: &mut F) -> Result<u64> {
        self.start()?;
        while frames.next_frame().is_some() {
            let report = self.tick()?;
            if report.stopped {
                break;
            }
        }
        frames.cancel();
        self.stop();
        Ok(self.frames)
    }
}
