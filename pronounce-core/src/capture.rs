//! Capture capabilities the practice session drives
//!
//! Both the recorder and the speech stream report through one tagged event channel,
//! so the session can be exercised with scripted fakes instead of hardware.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::AudioClip;

/// Something the capture primitives report while (or right after) recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Provisional recognition text; never part of the transcript
    Interim(String),
    /// A batch of newly finalized transcript segments, in emission order
    Final(Vec<String>),
    /// The encoded utterance, delivered once after the recorder stops
    AudioReady(AudioClip),
}

pub type CaptureEventSender = mpsc::UnboundedSender<CaptureEvent>;
pub type CaptureEventReceiver = mpsc::UnboundedReceiver<CaptureEvent>;

/// Create a capture event channel
pub fn capture_channel() -> (CaptureEventSender, CaptureEventReceiver) {
    mpsc::unbounded_channel()
}

/// Microphone recording capability
#[async_trait]
pub trait AudioRecorder: Send {
    /// Acquire the input device; fails with `Error::DeviceAccess` when denied or absent
    async fn acquire(&mut self) -> Result<()>;

    /// Begin buffering audio. The finished clip is sent as `AudioReady` after `stop`
    fn start(&mut self, events: CaptureEventSender) -> Result<()>;

    /// Stop buffering and release the device
    fn stop(&mut self) -> Result<()>;
}

/// Streaming speech-to-text capability
pub trait SpeechStream: Send {
    /// Whether the platform offers live transcription at all
    fn is_supported(&self) -> bool;

    /// Begin emitting `Interim` / `Final` events
    fn start(&mut self, events: CaptureEventSender) -> Result<()>;

    fn stop(&mut self);
}

/// Running transcript built from finalized segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTranscript {
    text: String,
}

impl LiveTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of finalized segments
    pub fn push_final<S: AsRef<str>>(&mut self, segments: &[S]) {
        let batch = segments
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if batch.is_empty() {
            return;
        }

        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(&batch);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
