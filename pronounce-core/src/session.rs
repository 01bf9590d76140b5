//! Practice session controller
//!
//! Drives one utterance at a time through Idle → Recording → Analyzing → Result.
//! Capture primitives report through a single [`CaptureEvent`] channel; the
//! controller owns the live transcript, hands the finished clip to the analyzer
//! and folds a successful result into the [`Ledger`].
//!
//! Every state change is published as a [`SessionSnapshot`] on a watch channel,
//! which is what the presentation layer renders from.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::capture::{
    AudioRecorder, CaptureEvent, CaptureEventReceiver, LiveTranscript, SpeechStream,
    capture_channel,
};
use crate::config::DEFAULT_ANALYSIS_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerUpdate};
use crate::providers::{AnalysisProvider, AnalysisRequest};
use crate::types::{AnalysisResult, AudioClip, SessionId, SessionState};

/// How long to wait for the recorder's clip after stop
const AUDIO_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// What the presentation layer sees of the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub transcript: String,
    pub error: Option<String>,
    pub result: Option<Arc<AnalysisResult>>,
    pub update: Option<LedgerUpdate>,
}

/// A session that reached the Result state
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub result: Arc<AnalysisResult>,
    pub update: LedgerUpdate,
}

/// The practice session state machine
pub struct PracticeSession {
    recorder: Box<dyn AudioRecorder>,
    speech: Box<dyn SpeechStream>,
    analyzer: Arc<dyn AnalysisProvider>,
    ledger: Arc<Ledger>,
    analysis_timeout: Duration,

    state: SessionState,
    session_id: Option<SessionId>,
    transcript: LiveTranscript,
    events: Option<CaptureEventReceiver>,
    pending_audio: Option<AudioClip>,
    result: Option<Arc<AnalysisResult>>,
    update: Option<LedgerUpdate>,
    error: Option<String>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl PracticeSession {
    pub fn new(
        recorder: Box<dyn AudioRecorder>,
        speech: Box<dyn SpeechStream>,
        analyzer: Arc<dyn AnalysisProvider>,
        ledger: Arc<Ledger>,
    ) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            recorder,
            speech,
            analyzer,
            ledger,
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            state: SessionState::Idle,
            session_id: None,
            transcript: LiveTranscript::new(),
            events: None,
            pending_audio: None,
            result: None,
            update: None,
            error: None,
            snapshots,
        }
    }

    /// Bound the remote analysis call
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Swap the analyzer; takes effect on the next stop
    pub fn set_analyzer(&mut self, analyzer: Arc<dyn AnalysisProvider>) {
        info!("Analysis provider set to {}", analyzer.name());
        self.analyzer = analyzer;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        self.transcript.as_str()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_deref()
    }

    pub fn last_update(&self) -> Option<&LedgerUpdate> {
        self.update.as_ref()
    }

    /// User-facing message from the last failed action
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Receive a snapshot every time the session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.session_id,
            transcript: self.transcript.as_str().to_string(),
            error: self.error.clone(),
            result: self.result.clone(),
            update: self.update.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(session_id = ?self.session_id, from = ?self.state, to = ?state, "Session transition");
        self.state = state;
        self.publish();
    }

    /// Begin a new recording (Idle → Recording, or Result → Recording)
    pub async fn start(&mut self) -> Result<()> {
        if !self.state.can_start() {
            return Err(Error::InvalidTransition {
                action: "start",
                state: self.state,
            });
        }

        self.release_capture();

        if let Err(e) = self.recorder.acquire().await {
            return Err(self.reject_start(e));
        }

        if !self.speech.is_supported() {
            self.release_recorder();
            return Err(self.reject_start(Error::UnsupportedCapability(
                "no live transcription available on this platform".to_string(),
            )));
        }

        let (events_tx, events_rx) = capture_channel();

        if let Err(e) = self.speech.start(events_tx.clone()) {
            self.release_recorder();
            return Err(self.reject_start(e));
        }

        if let Err(e) = self.recorder.start(events_tx) {
            self.speech.stop();
            self.release_recorder();
            return Err(self.reject_start(e));
        }

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.events = Some(events_rx);
        self.pending_audio = None;
        self.transcript.clear();
        self.result = None;
        self.update = None;
        self.error = None;
        self.set_state(SessionState::Recording);

        info!(%session_id, "Practice session started");
        Ok(())
    }

    /// Start over from a finished result
    pub async fn retry(&mut self) -> Result<()> {
        if self.state != SessionState::Result {
            return Err(Error::InvalidTransition {
                action: "retry",
                state: self.state,
            });
        }
        self.start().await
    }

    /// Apply whatever the capture primitives have emitted so far
    pub fn poll_events(&mut self) -> &str {
        if self.state != SessionState::Recording {
            return self.transcript.as_str();
        }

        let mut drained = Vec::new();
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                drained.push(event);
            }
        }

        if !drained.is_empty() {
            let before = self.transcript.clone();
            for event in drained {
                self.absorb(event);
            }
            if self.transcript != before {
                self.publish();
            }
        }

        self.transcript.as_str()
    }

    fn absorb(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Interim(text) => trace!("Interim transcript: {}", text),
            CaptureEvent::Final(segments) => self.transcript.push_final(&segments),
            CaptureEvent::AudioReady(clip) => self.pending_audio = Some(clip),
        }
    }

    /// Stop recording, analyze the utterance and update the ledger
    ///
    /// Recording → Analyzing, then Analyzing → Result on success or
    /// Analyzing → Idle on any failure.
    pub async fn stop(&mut self) -> Result<SessionOutcome> {
        if self.state != SessionState::Recording {
            return Err(Error::InvalidTransition {
                action: "stop",
                state: self.state,
            });
        }

        // detach the recognizer first so its last finals land before the drain
        self.speech.stop();
        self.poll_events();
        let mut events = self.events.take();

        let stopped = self.recorder.stop();
        self.set_state(SessionState::Analyzing);

        if let Err(e) = stopped {
            return Err(self.fail(e));
        }

        let audio = match self.pending_audio.take() {
            Some(clip) => clip,
            None => match events.as_mut() {
                Some(events) => match await_audio(events).await {
                    Ok(clip) => clip,
                    Err(e) => return Err(self.fail(e)),
                },
                None => {
                    return Err(self.fail(Error::Audio("capture was not running".to_string())));
                }
            },
        };
        drop(events);

        if audio.is_empty() {
            return Err(self.fail(Error::Audio("no audio captured".to_string())));
        }

        info!(
            session_id = ?self.session_id,
            audio_bytes = audio.data.len(),
            transcript = %self.transcript.as_str(),
            "Analyzing utterance"
        );

        let request = AnalysisRequest::new(audio, self.transcript.as_str());
        let analyzed =
            match tokio::time::timeout(self.analysis_timeout, self.analyzer.analyze(request)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::ServiceUnavailable(format!(
                    "analysis timed out after {:?}",
                    self.analysis_timeout
                ))),
            };

        match analyzed {
            Ok(result) => Ok(self.complete(result)),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn complete(&mut self, result: AnalysisResult) -> SessionOutcome {
        let update = self.ledger.record(&result);
        let result = Arc::new(result);

        info!(
            session_id = ?self.session_id,
            score = result.overall_score,
            xp = update.stats.xp,
            unlocked = ?update.unlocked,
            "Practice session completed"
        );

        self.result = Some(Arc::clone(&result));
        self.update = Some(update.clone());
        self.set_state(SessionState::Result);

        SessionOutcome { result, update }
    }

    /// Analyzing → Idle, discarding the utterance
    fn fail(&mut self, err: Error) -> Error {
        error!(session_id = ?self.session_id, "Practice session failed: {}", err);
        self.transcript.clear();
        self.pending_audio = None;
        self.result = None;
        self.update = None;
        self.error = Some(err.user_message().to_string());
        self.set_state(SessionState::Idle);
        err
    }

    /// A start attempt failed; the state is left as it was
    fn reject_start(&mut self, err: Error) -> Error {
        warn!("Could not start practice session: {}", err);
        self.error = Some(err.user_message().to_string());
        self.publish();
        err
    }

    fn release_recorder(&mut self) {
        if let Err(e) = self.recorder.stop() {
            debug!("Recorder release failed: {}", e);
        }
    }

    /// Make sure no capture pipeline from an earlier session is still running
    fn release_capture(&mut self) {
        if self.events.take().is_some() {
            self.speech.stop();
            self.release_recorder();
        }
    }
}

impl Drop for PracticeSession {
    fn drop(&mut self) {
        if self.state == SessionState::Recording {
            self.speech.stop();
            self.release_recorder();
        }
    }
}

/// Wait for the recorder's one-shot clip, skipping transcript events that arrive after stop
async fn await_audio(events: &mut CaptureEventReceiver) -> Result<AudioClip> {
    let wait = async {
        loop {
            match events.recv().await {
                Some(CaptureEvent::AudioReady(clip)) => return Ok(clip),
                Some(other) => trace!("Ignoring capture event after stop: {:?}", other),
                None => {
                    return Err(Error::Audio(
                        "capture ended without delivering audio".to_string(),
                    ));
                }
            }
        }
    };

    tokio::time::timeout(AUDIO_READY_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| Err(Error::Audio("timed out waiting for audio".to_string())))
}
