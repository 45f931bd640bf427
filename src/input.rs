//! Keyboard controls. Runs on its own thread and turns key presses into
//! [`Control`] requests for the render loop.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::MAX_BARS;
use crate::scheduler::{Control, ControlHandle};
use crate::types::{EnergyScale, NormalizeMode, PipelineConfig};

const BAR_STEP: usize = 4;
const AMPLITUDE_STEP: f32 = 10.0;
const MIN_AMPLITUDE: f32 = 10.0;
const MAX_AMPLITUDE: f32 = 200.0;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks the values the keys adjust, so relative keys (`+`, `↑`) can be
/// sent as absolute settings.
#[derive(Clone, Debug)]
pub struct KeyMap {
    config: PipelineConfig,
}

impl KeyMap {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Maps a key press to the request it stands for, if any.
    pub fn handle(&mut self, key: KeyEvent) -> Option<Control> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let cfg = &mut self.config;
        let control = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Control::Stop,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Control::Stop,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                cfg.bar_count = (cfg.bar_count + BAR_STEP).min(MAX_BARS);
                Control::SetBarCount(cfg.bar_count)
            }
            KeyCode::Char('-') => {
                cfg.bar_count = cfg.bar_count.saturating_sub(BAR_STEP).max(1);
                Control::SetBarCount(cfg.bar_count)
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                cfg.strategy = cfg.strategy.next();
                Control::SetBandStrategy(cfg.strategy)
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                cfg.normalize_mode = match cfg.normalize_mode {
                    NormalizeMode::MaxRelative => NormalizeMode::MinMax,
                    NormalizeMode::MinMax => NormalizeMode::Fixed {
                        reference: -cfg.db_floor,
                    },
                    NormalizeMode::Fixed { .. } => NormalizeMode::MaxRelative,
                };
                Control::SetNormalizeMode(cfg.normalize_mode)
            }
            KeyCode::Char('p') | KeyCode::Char('P') => {
                cfg.energy_scale = match cfg.energy_scale {
                    EnergyScale::Decibel => EnergyScale::Power,
                    EnergyScale::Power => EnergyScale::Decibel,
                };
                Control::SetEnergyScale(cfg.energy_scale)
            }
            KeyCode::Up => {
                cfg.target_amplitude = (cfg.target_amplitude + AMPLITUDE_STEP).min(MAX_AMPLITUDE);
                Control::SetTargetAmplitude(cfg.target_amplitude)
            }
            KeyCode::Down => {
                cfg.target_amplitude = (cfg.target_amplitude - AMPLITUDE_STEP).max(MIN_AMPLITUDE);
                Control::SetTargetAmplitude(cfg.target_amplitude)
            }
            _ => return None,
        };
        Some(control)
    }
}

/// Background thread polling terminal events.
pub struct KeyListener {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyListener {
    /// Starts listening. The thread also forwards terminal resizes, and ends
    /// on its own once the render loop stops accepting controls.
    pub fn spawn(controls: ControlHandle, config: PipelineConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = thread::spawn(move || {
            let mut keys = KeyMap::new(config);
            while !flag.load(Ordering::Relaxed) {
                let control = match next_event() {
                    Ok(Some(Event::Key(key))) => keys.handle(key),
                    Ok(Some(Event::Resize(w, h))) => Some(Control::Resize(w, h)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("terminal event error: {e}");
                        None
                    }
                };
                if let Some(control) = control {
                    debug!("key control: {control:?}");
                    if controls.send(control).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_event() -> std::io::Result<Option<Event>> {
    if event::poll(POLL_INTERVAL)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
