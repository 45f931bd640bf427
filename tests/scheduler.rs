use std::collections::VecDeque;
use std::time::Instant;

use approx::assert_relative_eq;
use bandscope::{
    Analyser, Band, BandStrategy, BarDraw, Control, DrawSurface, EnergyScale, FrameScheduler,
    NormalizeMode, PipelineConfig, Result, Scheduler, SchedulerState, VisualizerError,
};

const SR: f32 = 48_000.0;
const FFT: usize = 512;

/// Replays scripted spectra; `None` entries fail the read.
struct ScriptedAnalyser {
    script: VecDeque<Option<Vec<f32>>>,
    last: Vec<f32>,
}

impl ScriptedAnalyser {
    fn steady(spectrum: Vec<f32>) -> Self {
        Self {
            script: VecDeque::new(),
            last: spectrum,
        }
    }

    fn scripted(script: Vec<Option<Vec<f32>>>) -> Self {
        Self {
            script: script.into(),
            last: vec![-100.0; FFT / 2],
        }
    }
}

impl Analyser for ScriptedAnalyser {
    fn sample_rate(&self) -> f32 {
        SR
    }

    fn fft_size(&self) -> usize {
        FFT
    }

    fn read_current_spectrum(&mut self, buffer: &mut [f32]) -> Result<()> {
        match self.script.pop_front() {
            Some(None) => return Err(VisualizerError::SpectrumRead("scripted failure".into())),
            Some(Some(spectrum)) => self.last = spectrum,
            None => {}
        }
        buffer.copy_from_slice(&self.last);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSurface {
    frames: Vec<Vec<BarDraw>>,
    bands: Vec<Vec<Band>>,
    resizes: Vec<(u16, u16)>,
    fail_draws_in_frame: Option<usize>,
    frame_index: usize,
}

impl DrawSurface for RecordingSurface {
    fn begin_frame(&mut self, _config: &PipelineConfig, bands: &[Band]) -> Result<()> {
        self.frames.push(Vec::new());
        self.bands.push(bands.to_vec());
        Ok(())
    }

    fn issue_draw(&mut self, bar: BarDraw) -> Result<()> {
        if self.fail_draws_in_frame == Some(self.frame_index) {
            return Err(VisualizerError::Surface("surface unavailable".into()));
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(bar);
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frame_index += 1;
        Ok(())
    }

    fn resize_viewport(&mut self, width: u16, height: u16) -> Result<()> {
        self.resizes.push((width, height));
        Ok(())
    }
}

struct CountedFrames {
    remaining: usize,
    cancelled: bool,
}

impl CountedFrames {
    fn new(n: usize) -> Self {
        Self {
            remaining: n,
            cancelled: false,
        }
    }
}

impl FrameScheduler for CountedFrames {
    fn next_frame(&mut self) -> Option<Instant> {
        if self.cancelled || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Instant::now())
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Four quarter-spectrum plateaus at -80, -60, -40 and -20 dB.
fn staircase() -> Vec<f32> {
    (0..FFT / 2)
        .map(|bin| -80.0 + 20.0 * (bin / 64) as f32)
        .collect()
}

fn linear_config(bars: usize) -> PipelineConfig {
    PipelineConfig {
        bar_count: bars,
        fft_size: FFT,
        strategy: BandStrategy::Linear,
        ..PipelineConfig::default()
    }
}

fn ready(
    analyser: ScriptedAnalyser,
    surface: RecordingSurface,
    config: PipelineConfig,
) -> Scheduler<ScriptedAnalyser, RecordingSurface> {
    let mut scheduler = Scheduler::new(surface, config).unwrap();
    let mut slot = Some(analyser);
    let mut acquire = move |_fft: usize| -> Result<ScriptedAnalyser> {
        slot.take()
            .ok_or_else(|| VisualizerError::CaptureFailed("already acquired".into()))
    };
    scheduler.initialize(&mut acquire).unwrap();
    scheduler
}

#[test]
fn acquisition_failure_leaves_scheduler_uninitialized() {
    let mut scheduler: Scheduler<ScriptedAnalyser, RecordingSurface> =
        Scheduler::new(RecordingSurface::default(), linear_config(4)).unwrap();
    let mut denied = |_fft: usize| -> Result<ScriptedAnalyser> {
        Err(VisualizerError::PermissionDenied("user said no".into()))
    };

    let err = scheduler.initialize(&mut denied).unwrap_err();
    assert!(err.is_acquisition_failure());
    assert_eq!(scheduler.state(), SchedulerState::Uninitialized);
    assert!(scheduler.start().is_err());
    assert!(scheduler.tick().is_err());
    assert!(scheduler.run(&mut CountedFrames::new(3)).is_err());
    assert!(scheduler.surface().frames.is_empty());
}

#[test]
fn tick_draws_one_bar_per_band() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        linear_config(4),
    );
    assert_eq!(scheduler.state(), SchedulerState::Ready);
    assert_eq!(scheduler.config().sample_rate, SR);

    let report = scheduler.tick().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert_eq!(report.bars_drawn, 4);
    assert_eq!(report.draw_failures, 0);

    let frame = &scheduler.surface().frames[0];
    assert_eq!(frame.len(), 4);
    for (i, bar) in frame.iter().enumerate() {
        assert_eq!(bar.index, i);
        assert_eq!(bar.total_bars, 4);
        assert!((0.0..=100.0).contains(&bar.height));
    }
    for pair in frame.windows(2) {
        assert!(pair[0].height < pair[1].height);
    }
    // top plateau is the loudest band: -20 dB, 80 dB above the floor
    assert_relative_eq!(frame[3].height, 100.0);
    // bottom band: 64 bins at -80 plus the boundary bin at -60
    let band0 = (64.0 * -80.0 - 60.0) / 65.0 + 100.0;
    assert_relative_eq!(frame[0].height, band0 / 80.0 * 100.0, max_relative = 1e-4);
}

#[test]
fn configuration_changes_apply_on_next_tick() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        linear_config(4),
    );
    scheduler.tick().unwrap();

    let controls = scheduler.controls();
    controls.set_bar_count(8).unwrap();
    controls.set_band_strategy(BandStrategy::StftLogged).unwrap();
    controls.set_target_amplitude(50.0).unwrap();
    assert_eq!(scheduler.config().bar_count, 4);

    scheduler.tick().unwrap();
    assert_eq!(scheduler.config().bar_count, 8);
    let surface = scheduler.surface();
    assert_eq!(surface.frames[1].len(), 8);
    assert_relative_eq!(surface.bands[1][0].start, 20.0, epsilon = 1e-4);
    assert!(surface.frames[1].iter().all(|b| b.height <= 50.0));
}

#[test]
fn invalid_settings_keep_previous_configuration() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        linear_config(4),
    );

    assert!(matches!(
        scheduler.set_bar_count(0),
        Err(VisualizerError::InvalidParameter(_))
    ));
    assert!(scheduler.set_target_amplitude(-1.0).is_err());
    assert!(
        scheduler
            .set_normalize_mode(NormalizeMode::Fixed { reference: 0.0 })
            .is_err()
    );
    assert_eq!(scheduler.config().bar_count, 4);
    assert_eq!(scheduler.config().target_amplitude, 100.0);

    // rejected controls are logged and skipped, not fatal
    scheduler.controls().send(Control::SetBarCount(0)).unwrap();
    let report = scheduler.tick().unwrap();
    assert_eq!(report.bars_drawn, 4);
}

#[test]
fn read_failure_does_not_stop_the_loop() {
    let spectrum = staircase();
    let analyser = ScriptedAnalyser::scripted(vec![
        Some(spectrum.clone()),
        None,
        None,
        Some(spectrum),
    ]);
    let mut scheduler = ready(analyser, RecordingSurface::default(), linear_config(4));

    let mut frames = CountedFrames::new(5);
    let count = scheduler.run(&mut frames).unwrap();
    assert_eq!(count, 5);
    assert_eq!(scheduler.surface().frames.len(), 3);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(frames.cancelled);
}

#[test]
fn draw_failure_is_reported_and_loop_continues() {
    let surface = RecordingSurface {
        fail_draws_in_frame: Some(0),
        ..RecordingSurface::default()
    };
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        surface,
        linear_config(4),
    );

    let first = scheduler.tick().unwrap();
    assert_eq!(first.draw_failures, 4);
    assert_eq!(first.bars_drawn, 0);

    let second = scheduler.tick().unwrap();
    assert_eq!(second.draw_failures, 0);
    assert_eq!(second.bars_drawn, 4);
}

#[test]
fn stop_control_ends_run_and_closes_controls() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        linear_config(4),
    );
    let controls = scheduler.controls();
    controls.resize(120, 40).unwrap();
    controls.stop().unwrap();

    let mut frames = CountedFrames::new(100);
    scheduler.run(&mut frames).unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(frames.cancelled);
    assert_eq!(frames.remaining, 99);
    assert!(scheduler.surface().frames.is_empty());
    assert_eq!(scheduler.surface().resizes, vec![(120, 40)]);
    assert!(matches!(
        controls.set_bar_count(8),
        Err(VisualizerError::InvalidState(_))
    ));
    assert!(scheduler.tick().is_err());
}

#[test]
fn silent_spectrum_draws_flat_bars() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(vec![f32::NEG_INFINITY; FFT / 2]),
        RecordingSurface::default(),
        PipelineConfig {
            strategy: BandStrategy::StftLogged,
            ..linear_config(64)
        },
    );
    scheduler.tick().unwrap();
    let frame = &scheduler.surface().frames[0];
    assert_eq!(frame.len(), 64);
    assert!(frame.iter().all(|b| b.height == 0.0));
}

#[test]
fn min_max_mode_spans_full_range() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        PipelineConfig {
            normalize_mode: NormalizeMode::MinMax,
            ..linear_config(4)
        },
    );
    scheduler.tick().unwrap();
    let frame = &scheduler.surface().frames[0];
    assert_eq!(frame[0].height, 0.0);
    assert_relative_eq!(frame[3].height, 100.0);
}

#[test]
fn floor_and_normalize_controls_apply_on_next_tick() {
    let mut scheduler = ready(
        ScriptedAnalyser::steady(staircase()),
        RecordingSurface::default(),
        linear_config(4),
    );
    scheduler.tick().unwrap();
    let before = scheduler.surface().frames[0].clone();
    assert!(before[0].height > 0.0);

    let controls = scheduler.controls();
    controls.set_db_floor(-60.0).unwrap();
    controls
        .set_normalize_mode(NormalizeMode::Fixed { reference: 60.0 })
        .unwrap();
    controls.set_energy_scale(EnergyScale::Power).unwrap();
    assert_eq!(scheduler.config().db_floor, -100.0);

    scheduler.tick().unwrap();
    assert_eq!(scheduler.config().db_floor, -60.0);
    assert_eq!(scheduler.config().energy_scale, EnergyScale::Power);
    let after = scheduler.surface().frames[1].clone();
    // bottom band sits below the new floor
    assert_eq!(after[0].height, 0.0);
    assert!(after[3].height < 100.0);
    assert_ne!(after[3].height, before[3].height);

    controls.set_db_floor(0.0).unwrap();
    controls.set_db_floor(f32::NAN).unwrap();
    scheduler.tick().unwrap();
    assert_eq!(scheduler.config().db_floor, -60.0);
    assert_eq!(scheduler.surface().frames[2], after);
}
