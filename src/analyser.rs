//! Frequency analyser: turns the latest block of captured samples into a
//! dB magnitude per FFT bin, on demand.

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, trace};
use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::config::{validate_fft_size, validate_smoothing};
use crate::error::{Result, VisualizerError};

/// A source of spectrum snapshots.
///
/// `read_current_spectrum` overwrites the caller's buffer in place. The
/// contents are only meaningful until the next call.
pub trait Analyser {
    fn sample_rate(&self) -> f32;

    fn fft_size(&self) -> usize;

    /// Number of bins written per read.
    fn bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    fn source_name(&self) -> String {
        String::from("analyser")
    }

    fn read_current_spectrum(&mut self, buffer: &mut [f32]) -> Result<()>;
}

/// Acquires an audio stream and wraps it in an analyser.
pub trait AudioAcquirer {
    type Analyser: Analyser;

    fn acquire(&mut self, fft_size: usize) -> Result<Self::Analyser>;
}

impl<F, A> AudioAcquirer for F
where
    F: FnMut(usize) -> Result<A>,
    A: Analyser,
{
    type Analyser = A;

    fn acquire(&mut self, fft_size: usize) -> Result<A> {
        self(fft_size)
    }
}

/// Magnitudes are floored here before conversion, i.e. -200 dB.
const MIN_MAGNITUDE: f32 = 1e-10;

/// Windowed real FFT over the most recent `fft_size` mono samples, smoothed
/// over time and reported in dB.
pub struct FftAnalyser {
    rx_frames: Receiver<Vec<f32>>,
    sample_rate: f32,
    fft_size: usize,
    smoothing: f32,
    r2c: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    disconnected: bool,
}

impl FftAnalyser {
    pub fn new(
        rx_frames: Receiver<Vec<f32>>,
        sample_rate: f32,
        fft_size: usize,
        smoothing: f32,
    ) -> Result<Self> {
        validate_fft_size(fft_size)?;
        validate_smoothing(smoothing)?;
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(VisualizerError::AnalyserUnavailable(format!(
                "invalid sample rate {sample_rate}"
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let input = r2c.make_input_vec();
        let output = r2c.make_output_vec();
        let scratch = r2c.make_scratch_vec();
        debug!("planned {fft_size}-point FFT at {sample_rate} Hz");

        Ok(Self {
            rx_frames,
            sample_rate,
            fft_size,
            smoothing,
            r2c,
            window: hann(fft_size),
            history: vec![0.0; fft_size],
            input,
            output,
            scratch,
            smoothed: vec![0.0; fft_size / 2],
            disconnected: false,
        })
    }

    /// Appends mono samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.len() >= self.fft_size {
            self.history
                .copy_from_slice(&samples[samples.len() - self.fft_size..]);
            return;
        }
        self.history.drain(0..samples.len());
        self.history.extend_from_slice(samples);
    }

    fn drain_frames(&mut self) {
        loop {
            match self.rx_frames.try_recv() {
                Ok(chunk) => self.push_samples(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        debug!("capture channel closed");
                    }
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}

impl Analyser for FftAnalyser {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn read_current_spectrum(&mut self, buffer: &mut [f32]) -> Result<()> {
        if buffer.len() != self.bin_count() {
            return Err(VisualizerError::SpectrumRead(format!(
                "buffer holds {} bins, analyser produces {}",
                buffer.len(),
                self.bin_count()
            )));
        }

        self.drain_frames();
        if self.disconnected {
            return Err(VisualizerError::SpectrumRead(
                "capture stream is no longer delivering samples".into(),
            ));
        }

        for ((dst, &s), &w) in self.input.iter_mut().zip(&self.history).zip(&self.window) {
            *dst = s * w;
        }
        self.r2c
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|e| VisualizerError::SpectrumRead(e.to_string()))?;

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for ((dst, smooth), c) in buffer
            .iter_mut()
            .zip(self.smoothed.iter_mut())
            .zip(&self.output)
        {
            let magnitude = c.norm() * scale;
            *smooth = tau * *smooth + (1.0 - tau) * magnitude;
            *dst = 20.0 * smooth.max(MIN_MAGNITUDE).log10();
        }
        trace!("spectrum read: {} bins", buffer.len());
        Ok(())
    }
}

/// Periodic Hann window.
pub fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = i as f32;
            0.5 - 0.5 * ((2.0 * std::f32::consts::PI * x) / n as f32).cos()
        })
        .collect()
}
