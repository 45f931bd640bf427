use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, FromSample, InputCallbackInfo,
    PlayStreamError, Sample, SampleFormat, SizedSample, Stream, StreamConfig, StreamError,
};
use crossbeam_channel::Sender;
use log::{error, info};
use std::time::Duration;

use crate::analyser::{Analyser, AudioAcquirer, FftAnalyser};
use crate::config::CaptureSource;
use crate::error::{Result, VisualizerError};

/// Captured chunks queued between the audio callback and the analyser.
const FRAME_QUEUE: usize = 64;

/// Opens the default cpal device and feeds its samples into an [`FftAnalyser`].
pub struct CpalAcquirer {
    source: CaptureSource,
    smoothing: f32,
}

impl CpalAcquirer {
    pub fn new(source: CaptureSource, smoothing: f32) -> Self {
        Self { source, smoothing }
    }
}

impl AudioAcquirer for CpalAcquirer {
    type Analyser = CaptureAnalyser;

    fn acquire(&mut self, fft_size: usize) -> Result<CaptureAnalyser> {
        let host = cpal::default_host();
        let (device, supported) = match self.source {
            CaptureSource::Input => {
                let device = host.default_input_device().ok_or_else(|| {
                    VisualizerError::CapabilityUnsupported("no default input device".into())
                })?;
                let cfg = device.default_input_config().map_err(config_error)?;
                (device, cfg)
            }
            CaptureSource::Loopback => {
                let device = host.default_output_device().ok_or_else(|| {
                    VisualizerError::CapabilityUnsupported("no default output device".into())
                })?;
                let cfg = device.default_output_config().map_err(config_error)?;
                (device, cfg)
            }
        };

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());
        let cfg = supported.config();
        let channels = cfg.channels as usize;
        let sample_rate = cfg.sample_rate.0 as f32;

        let (tx_frames, rx_frames) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_QUEUE);
        let analyser = FftAnalyser::new(rx_frames, sample_rate, fft_size, self.smoothing)
            .map_err(|e| VisualizerError::AnalyserUnavailable(e.to_string()))?;
        let stream =
            create_audio_stream(&device, supported.sample_format(), &cfg, channels, tx_frames)?;

        info!(
            "capturing from '{device_name}' ({:?}): {sample_rate} Hz, {channels} channel(s)",
            self.source
        );
        Ok(CaptureAnalyser {
            _stream: stream,
            analyser,
            device_name,
        })
    }
}

/// An [`FftAnalyser`] that owns the live capture stream feeding it.
pub struct CaptureAnalyser {
    _stream: Stream,
    analyser: FftAnalyser,
    device_name: String,
}

impl Analyser for CaptureAnalyser {
    fn sample_rate(&self) -> f32 {
        self.analyser.sample_rate()
    }

    fn fft_size(&self) -> usize {
        self.analyser.fft_size()
    }

    fn source_name(&self) -> String {
        self.device_name.clone()
    }

    fn read_current_spectrum(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.analyser.read_current_spectrum(buffer)
    }
}

pub fn build_capture_stream<T>(
    device: &Device,
    cfg: &StreamConfig,
    channels: usize,
    tx_frames: Sender<Vec<f32>>,
) -> Result<Stream>
where
    T: Sample + Send + 'static + SizedSample + std::fmt::Debug,
    f32: FromSample<<T as Sample>::Float>,
{
    let err_callback = |err: StreamError| error!("an error occurred on stream: {}", err);

    let input_callback = move |data: &[T], _info: &InputCallbackInfo| {
        let mono_chunk = downmix(data, channels);
        if !mono_chunk.is_empty() {
            // drop the chunk rather than block the audio thread
            let _ = tx_frames.try_send(mono_chunk);
        }
    };

    let latency = Some(Duration::from_millis(20));
    let stream = device
        .build_input_stream(cfg, input_callback, err_callback, latency)
        .map_err(build_error)?;
    stream.play().map_err(play_error)?;
    Ok(stream)
}

/// Averages interleaved frames down to one channel.
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<<T as Sample>::Float>,
{
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame
                .iter()
                .map(|s| f32::from_sample(s.to_float_sample()))
                .sum();
            sum / frame.len() as f32
        })
        .collect()
}

pub fn create_audio_stream(
    device: &Device,
    sample_format: SampleFormat,
    cfg: &StreamConfig,
    channels: usize,
    tx_frames: Sender<Vec<f32>>,
) -> Result<Stream> {
    match sample_format {
        SampleFormat::F32 => build_capture_stream::<f32>(device, cfg, channels, tx_frames),
        SampleFormat::I16 => build_capture_stream::<i16>(device, cfg, channels, tx_frames),
        SampleFormat::U16 => build_capture_stream::<u16>(device, cfg, channels, tx_frames),
        SampleFormat::I32 => build_capture_stream::<i32>(device, cfg, channels, tx_frames),
        other => Err(VisualizerError::CapabilityUnsupported(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn backend_error(description: &str) -> VisualizerError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        VisualizerError::PermissionDenied(description.to_string())
    } else {
        VisualizerError::CaptureFailed(description.to_string())
    }
}

fn config_error(err: DefaultStreamConfigError) -> VisualizerError {
    match err {
        DefaultStreamConfigError::StreamTypeNotSupported => {
            VisualizerError::CapabilityUnsupported(err.to_string())
        }
        DefaultStreamConfigError::BackendSpecific { err } => backend_error(&err.description),
        other => VisualizerError::CaptureFailed(other.to_string()),
    }
}

fn build_error(err: BuildStreamError) -> VisualizerError {
    match err {
        BuildStreamError::StreamConfigNotSupported => {
            VisualizerError::CapabilityUnsupported(err.to_string())
        }
        BuildStreamError::BackendSpecific { err } => backend_error(&err.description),
        other => VisualizerError::CaptureFailed(other.to_string()),
    }
}

fn play_error(err: PlayStreamError) -> VisualizerError {
    match err {
        PlayStreamError::BackendSpecific { err } => backend_error(&err.description),
        other => VisualizerError::CaptureFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
        let mono = [0.25f32, -0.25];
        assert_eq!(downmix(&mono, 1), vec![0.25, -0.25]);
    }

    #[test]
    fn downmix_converts_integer_samples() {
        let data = [i16::MAX, i16::MAX];
        let out = downmix(&data, 2);
        assert!((out[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn backend_errors_are_classified() {
        assert!(matches!(
            backend_error("Access denied by the user"),
            VisualizerError::PermissionDenied(_)
        ));
        assert!(matches!(
            backend_error("device unplugged"),
            VisualizerError::CaptureFailed(_)
        ));
    }
}
