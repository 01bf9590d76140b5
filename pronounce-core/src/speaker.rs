//! Fire-and-forget pronunciation playback

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::playback::{AudioSink, decode_pcm16};
use crate::providers::{SpeechRequest, SpeechSynthesisProvider};
use crate::types::Voice;

/// Speaks words and corrections aloud, independently of any session
#[derive(Clone)]
pub struct SpeechPlayer {
    synthesizer: Arc<dyn SpeechSynthesisProvider>,
    sink: Arc<dyn AudioSink>,
}

impl SpeechPlayer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesisProvider>, sink: Arc<dyn AudioSink>) -> Self {
        Self { synthesizer, sink }
    }

    /// Synthesize and play `text` on `runtime`. Failures are logged, never returned
    pub fn speak(&self, runtime: &Handle, text: &str, voice: Voice) -> Option<JoinHandle<()>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let request = SpeechRequest::new(text, voice);
        let player = self.clone();
        Some(runtime.spawn(async move { player.speak_now(request).await }))
    }

    async fn speak_now(&self, request: SpeechRequest) {
        if !self.synthesizer.is_configured() {
            warn!("{} speech is not configured, skipping playback", self.synthesizer.name());
            return;
        }

        let text = request.text.clone();
        let speech = match self.synthesizer.synthesize(request).await {
            Ok(speech) => speech,
            Err(e) => {
                warn!("TTS Error: {}", e);
                return;
            }
        };

        let samples = decode_pcm16(&speech.pcm);
        debug!(
            text = %text,
            duration_ms = speech.duration_ms(),
            "Speech synthesized"
        );

        let sink = Arc::clone(&self.sink);
        let sample_rate = speech.sample_rate;
        match tokio::task::spawn_blocking(move || sink.play(&samples, sample_rate)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Playback failed: {}", e),
            Err(e) => warn!("Playback task failed: {}", e),
        }
    }
}
