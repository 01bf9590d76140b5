//! Speech synthesis provider trait and types

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Voice;

/// Request for a spoken rendition of a word or phrase
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
        }
    }
}

/// Raw 16-bit little-endian PCM returned by the synthesizer
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SynthesizedSpeech {
    pub fn duration_ms(&self) -> u64 {
        let frames = self.pcm.len() as u64 / (2 * u64::from(self.channels.max(1)));
        frames * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Trait for speech synthesis providers
#[async_trait]
pub trait SpeechSynthesisProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Synthesize the requested text
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesizedSpeech>;

    /// Check if the provider is configured and ready
    fn is_configured(&self) -> bool;
}
