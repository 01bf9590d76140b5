//! Live transcription fed by the host platform's recognizer
//!
//! The engine does no speech recognition of its own. The host app runs the
//! platform recognizer and pushes each result through a [`TranscriptFeed`];
//! while a session is recording, those results land on its capture channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::capture::{CaptureEvent, CaptureEventSender, SpeechStream};
use crate::error::Result;

#[derive(Default)]
struct FeedState {
    supported: AtomicBool,
    events: Mutex<Option<CaptureEventSender>>,
}

/// Speech stream whose results come from the host
pub struct HostSpeechStream {
    shared: Arc<FeedState>,
}

/// Handle the host uses to report recognizer results
#[derive(Clone)]
pub struct TranscriptFeed {
    shared: Arc<FeedState>,
}

impl HostSpeechStream {
    pub fn new(supported: bool) -> Self {
        let shared = Arc::new(FeedState::default());
        shared.supported.store(supported, Ordering::Relaxed);
        Self { shared }
    }

    pub fn feed(&self) -> TranscriptFeed {
        TranscriptFeed {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SpeechStream for HostSpeechStream {
    fn is_supported(&self) -> bool {
        self.shared.supported.load(Ordering::Relaxed)
    }

    fn start(&mut self, events: CaptureEventSender) -> Result<()> {
        *self.shared.events.lock() = Some(events);
        debug!("Host speech stream attached");
        Ok(())
    }

    fn stop(&mut self) {
        if self.shared.events.lock().take().is_some() {
            debug!("Host speech stream detached");
        }
    }
}

impl TranscriptFeed {
    /// Whether the host has a recognizer available
    pub fn set_supported(&self, supported: bool) {
        self.shared.supported.store(supported, Ordering::Relaxed);
    }

    pub fn is_listening(&self) -> bool {
        self.shared.events.lock().is_some()
    }

    /// Forward one recognizer result. Returns false when no session is listening
    pub fn push(&self, text: &str, is_final: bool) -> bool {
        let guard = self.shared.events.lock();
        let Some(events) = guard.as_ref() else {
            trace!("Dropping transcript outside of a recording");
            return false;
        };

        let event = if is_final {
            CaptureEvent::Final(vec![text.to_string()])
        } else {
            CaptureEvent::Interim(text.to_string())
        };
        events.send(event).is_ok()
    }
}
