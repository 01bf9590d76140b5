//! Microphone recorder using CPAL for cross-platform audio input
//!
//! The cpal stream lives on a dedicated audio thread for the duration of one
//! recording; the recorder itself only holds the shared sample buffer and the
//! thread's command channel.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capture::{AudioRecorder, CaptureEvent, CaptureEventSender};
use crate::error::{Error, Result};
use crate::types::AudioClip;

const THREAD_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioCaptureConfig {
    /// Preferred sample rate in Hz (default: 16000 for speech)
    pub sample_rate: u32,
    /// Preferred number of input channels; output is always downmixed to mono
    pub channels: u16,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// State of the audio capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
}

enum AudioCommand {
    Stop,
}

/// Records the default input device and hands over a WAV clip on stop
pub struct MicrophoneRecorder {
    config: AudioCaptureConfig,
    acquired: bool,
    state: Arc<Mutex<CaptureState>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: Arc<AtomicU32>,
    command_sender: Option<Sender<AudioCommand>>,
    thread_handle: Option<JoinHandle<()>>,
    events: Option<CaptureEventSender>,
}

/// Read-only view of the live buffer for level meters
#[derive(Clone)]
pub struct AudioLevelMeter {
    buffer: Arc<Mutex<Vec<f32>>>,
    state: Arc<Mutex<CaptureState>>,
    sample_rate: Arc<AtomicU32>,
}

impl MicrophoneRecorder {
    pub fn new() -> Self {
        Self::with_config(AudioCaptureConfig::default())
    }

    pub fn with_config(config: AudioCaptureConfig) -> Self {
        let sample_rate = Arc::new(AtomicU32::new(config.sample_rate));
        Self {
            config,
            acquired: false,
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
            command_sender: None,
            thread_handle: None,
            events: None,
        }
    }

    /// Get current capture state
    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    /// A meter that keeps working while the recorder is owned by a session
    pub fn level_meter(&self) -> AudioLevelMeter {
        AudioLevelMeter {
            buffer: Arc::clone(&self.buffer),
            state: Arc::clone(&self.state),
            sample_rate: Arc::clone(&self.sample_rate),
        }
    }

    fn join_audio_thread(&mut self) {
        if let Some(sender) = self.command_sender.take() {
            let _ = sender.send(AudioCommand::Stop);
        }
        // joining drops the cpal stream, releasing the device
        if let Some(handle) = self.thread_handle.take()
            && handle.join().is_err()
        {
            error!("Audio thread panicked");
        }
    }

    fn finish_clip(&self) -> Result<AudioClip> {
        let samples = std::mem::take(&mut *self.buffer.lock());
        if samples.is_empty() {
            return Ok(AudioClip::wav(Vec::new()));
        }
        let wav = encode_wav(&samples, self.sample_rate.load(Ordering::Relaxed))?;
        Ok(AudioClip::wav(wav))
    }
}

impl Default for MicrophoneRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioRecorder for MicrophoneRecorder {
    async fn acquire(&mut self) -> Result<()> {
        let (device, _, _, _) = open_input(&self.config)?;
        // note: device.name() is deprecated in cpal 0.17+, but works
        #[allow(deprecated)]
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using input device: {}", device_name);
        self.acquired = true;
        Ok(())
    }

    fn start(&mut self, events: CaptureEventSender) -> Result<()> {
        if *self.state.lock() == CaptureState::Recording {
            return Ok(());
        }
        if !self.acquired {
            return Err(Error::DeviceAccess("Microphone not acquired".to_string()));
        }

        self.buffer.lock().clear();

        let (cmd_tx, cmd_rx) = channel::<AudioCommand>();
        let (ready_tx, ready_rx) = channel::<Result<u32>>();

        let config = self.config.clone();
        let buffer = Arc::clone(&self.buffer);
        let state = Arc::clone(&self.state);

        let handle = thread::Builder::new()
            .name("pronounce-audio".to_string())
            .spawn(move || {
                if let Err(e) = run_audio_capture(&config, buffer, state, &ready_tx, cmd_rx) {
                    error!("Audio capture error: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        self.command_sender = Some(cmd_tx);
        self.thread_handle = Some(handle);

        let ready = match ready_rx.recv_timeout(THREAD_READY_TIMEOUT) {
            Ok(ready) => ready,
            Err(_) => Err(Error::DeviceAccess(
                "Audio thread failed to initialize within timeout".to_string(),
            )),
        };

        match ready {
            Ok(sample_rate) => {
                self.sample_rate.store(sample_rate, Ordering::Relaxed);
                self.events = Some(events);
                *self.state.lock() = CaptureState::Recording;
                info!(sample_rate, "Audio capture started");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = CaptureState::Idle;
                self.join_audio_thread();
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        *self.state.lock() = CaptureState::Idle;
        self.join_audio_thread();
        self.acquired = false;

        let Some(events) = self.events.take() else {
            self.buffer.lock().clear();
            return Ok(());
        };

        let clip = self.finish_clip()?;
        info!("Audio capture stopped, {} bytes captured", clip.data.len());

        if events.send(CaptureEvent::AudioReady(clip)).is_err() {
            warn!("Session stopped listening before audio was delivered");
        }
        Ok(())
    }
}

impl Drop for MicrophoneRecorder {
    fn drop(&mut self) {
        *self.state.lock() = CaptureState::Idle;
        self.join_audio_thread();
    }
}

impl AudioLevelMeter {
    /// RMS level of the last 50ms of audio, between 0.0 and 1.0
    pub fn current_level(&self) -> f32 {
        if *self.state.lock() != CaptureState::Recording {
            return 0.0;
        }

        let buffer = self.buffer.lock();
        if buffer.is_empty() {
            return 0.0;
        }

        let samples_per_50ms = (self.sample_rate.load(Ordering::Relaxed) as usize / 20).max(1);
        let start_idx = buffer.len().saturating_sub(samples_per_50ms);
        let recent_samples = &buffer[start_idx..];

        let sum_squares: f32 = recent_samples.iter().map(|&s| s * s).sum();
        let rms = (sum_squares / recent_samples.len() as f32).sqrt();

        // speech is quiet; scale up for the meter
        (rms * 3.0).min(1.0)
    }
}

/// Open the default input device and pick a stream format for it
fn open_input(config: &AudioCaptureConfig) -> Result<(Device, StreamConfig, u16, SampleFormat)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceAccess("No input device available".to_string()))?;

    let supported_configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceAccess(format!("Failed to get supported configs: {e}")))?
        .collect();

    let (supported_config, input_channels, sample_format) =
        select_supported_config(&supported_configs, config.sample_rate, config.channels)
            .ok_or_else(|| Error::DeviceAccess("No supported input config found".to_string()))?;

    Ok((
        device,
        supported_config.config(),
        input_channels,
        sample_format,
    ))
}

fn run_audio_capture(
    config: &AudioCaptureConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    state: Arc<Mutex<CaptureState>>,
    ready_tx: &Sender<Result<u32>>,
    cmd_rx: Receiver<AudioCommand>,
) -> Result<()> {
    let (device, stream_config, input_channels, sample_format) = open_input(config)?;
    let sample_rate = stream_config.sample_rate;

    debug!(
        "Stream config: {:?} (input channels: {}, format: {:?})",
        stream_config, input_channels, sample_format
    );

    // the callback only buffers while the recorder is in Recording, which is set
    // after the ready signal; flip it here so the first frames aren't lost
    *state.lock() = CaptureState::Recording;

    let err_fn = |err| error!("Audio stream error: {}", err);
    let channels = input_channels as usize;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::U32 => build_stream::<u32>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::F64 => build_stream::<f64>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, channels, buffer, state, err_fn),
        SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, channels, buffer, state, err_fn),
        other => Err(Error::Audio(format!("Unsupported sample format: {other:?}"))),
    }?;

    stream
        .play()
        .map_err(|e| Error::DeviceAccess(format!("Failed to start stream: {e}")))?;

    let _ = ready_tx.send(Ok(sample_rate));

    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(AudioCommand::Stop) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    Ok(())
}

fn build_stream<T>(
    device: &Device,
    stream_config: &StreamConfig,
    channels: usize,
    buffer: Arc<Mutex<Vec<f32>>>,
    state: Arc<Mutex<CaptureState>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream>
where
    T: Sample + SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if *state.lock() != CaptureState::Recording {
                    return;
                }

                if channels == 1 {
                    buffer
                        .lock()
                        .extend(data.iter().map(|sample| sample.to_sample::<f32>()));
                } else {
                    let mut buf = buffer.lock();
                    for frame in data.chunks_exact(channels) {
                        let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                        buf.push(sum / channels as f32);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::DeviceAccess(format!("Failed to build stream: {e}")))
}

/// Encode mono f32 samples as a 16-bit PCM WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(format!("Failed to start WAV: {e}")))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * 32767.0) as i16)
                .map_err(|e| Error::Audio(format!("Failed to write WAV: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(format!("Failed to finish WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}

fn select_supported_config(
    ranges: &[cpal::SupportedStreamConfigRange],
    preferred_rate: u32,
    preferred_channels: u16,
) -> Option<(cpal::SupportedStreamConfig, u16, SampleFormat)> {
    let preferred_formats = [
        SampleFormat::F32,
        SampleFormat::I16,
        SampleFormat::U16,
        SampleFormat::I32,
        SampleFormat::U32,
        SampleFormat::F64,
        SampleFormat::I8,
        SampleFormat::U8,
    ];

    for format in preferred_formats {
        let mut candidates: Vec<_> = ranges
            .iter()
            .copied()
            .filter(|range| {
                range.sample_format() == format && range.channels() == preferred_channels
            })
            .collect();

        if candidates.is_empty() {
            candidates = ranges
                .iter()
                .copied()
                .filter(|range| range.sample_format() == format)
                .collect();
        }

        let Some(best) = candidates
            .into_iter()
            .min_by_key(|range| sample_rate_distance(*range, preferred_rate))
        else {
            continue;
        };

        let sample_rate = preferred_rate.clamp(best.min_sample_rate(), best.max_sample_rate());
        return Some((best.with_sample_rate(sample_rate), best.channels(), format));
    }

    None
}

fn sample_rate_distance(range: cpal::SupportedStreamConfigRange, preferred_rate: u32) -> u32 {
    let min_rate = range.min_sample_rate();
    let max_rate = range.max_sample_rate();
    if preferred_rate < min_rate {
        min_rate - preferred_rate
    } else {
        preferred_rate.saturating_sub(max_rate)
    }
}
