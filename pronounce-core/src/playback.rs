//! Playback of synthesized speech

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Extra time after the last sample so the device drains its buffer
const DRAIN_MARGIN: Duration = Duration::from_millis(150);

/// Somewhere mono f32 audio can be played
///
/// `play` blocks until playback finishes.
pub trait AudioSink: Send + Sync {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Decode 16-bit little-endian PCM into f32 samples; a trailing odd byte is dropped
pub fn decode_pcm16(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Linear resampling between device and source rates
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Plays through the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerSink;

impl AudioSink for SpeakerSink {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No output device available".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("Failed to get output config: {e}")))?;

        let device_rate = supported.sample_rate();
        let channels = supported.channels() as usize;
        let samples = Arc::new(resample(samples, sample_rate, device_rate));
        let config = supported.config();

        debug!(
            device_rate,
            channels,
            frames = samples.len(),
            "Playing synthesized speech"
        );

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, channels, &samples),
            SampleFormat::I16 => build_output::<i16>(&device, &config, channels, &samples),
            SampleFormat::U16 => build_output::<u16>(&device, &config, channels, &samples),
            SampleFormat::I32 => build_output::<i32>(&device, &config, channels, &samples),
            other => Err(Error::Audio(format!("Unsupported output format: {other:?}"))),
        }?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("Failed to start playback: {e}")))?;

        let millis = samples.len() as u64 * 1000 / u64::from(device_rate.max(1));
        std::thread::sleep(Duration::from_millis(millis) + DRAIN_MARGIN);
        drop(stream);
        Ok(())
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    samples: &Arc<Vec<f32>>,
) -> Result<cpal::Stream>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let samples = Arc::clone(samples);
    let cursor = AtomicUsize::new(0);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels.max(1)) {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let value = samples.get(idx).copied().unwrap_or(0.0);
                    let sample = T::from_sample(value);
                    for ch in frame.iter_mut() {
                        *ch = sample;
                    }
                }
            },
            |err| error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| Error::Audio(format!("Failed to build output stream: {e}")))
}
