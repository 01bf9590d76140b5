//! Integration tests for the practice session state machine
//!
//! The recorder and analyzer are scripted fakes; live transcription goes
//! through the real host-fed speech stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use pronounce::capture::{AudioRecorder, CaptureEvent, CaptureEventSender, SpeechStream};
use pronounce::catalog::BadgeId;
use pronounce::error::{Error, Result};
use pronounce::ledger::{Ledger, LedgerStore};
use pronounce::providers::{AnalysisProvider, AnalysisRequest, parse_analysis};
use pronounce::session::PracticeSession;
use pronounce::speech_input::{HostSpeechStream, TranscriptFeed};
use pronounce::storage::Storage;
use pronounce::types::{AudioClip, SessionState, UserStats};

const PERFECT: &str = r#"{
    "overallScore": 85,
    "transcription": "hello world",
    "words": [
        {"text": "hello", "status": "correct"},
        {"text": "world", "status": "mispronounced", "phonetic": "/wɜːld/"}
    ],
    "grammarErrors": [],
    "summary": "Tuyệt vời!"
}"#;

const MISSING_SCORE: &str = r#"{
    "transcription": "hello world",
    "words": [],
    "grammarErrors": [],
    "summary": "ok"
}"#;

// ============ Fakes ============

#[derive(Clone, Default)]
struct RecorderScript {
    deny_access: bool,
    audio: Option<Vec<u8>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

struct FakeRecorder {
    script: RecorderScript,
    events: Option<CaptureEventSender>,
}

impl FakeRecorder {
    fn new(script: RecorderScript) -> Self {
        Self {
            script,
            events: None,
        }
    }
}

#[async_trait]
impl AudioRecorder for FakeRecorder {
    async fn acquire(&mut self) -> Result<()> {
        self.script.calls.lock().push("acquire");
        if self.script.deny_access {
            return Err(Error::DeviceAccess("permission denied".into()));
        }
        Ok(())
    }

    fn start(&mut self, events: CaptureEventSender) -> Result<()> {
        self.script.calls.lock().push("start");
        self.events = Some(events);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.script.calls.lock().push("stop");
        if let Some(events) = self.events.take()
            && let Some(audio) = self.script.audio.clone()
        {
            let _ = events.send(CaptureEvent::AudioReady(AudioClip::wav(audio)));
        }
        Ok(())
    }
}

enum Reply {
    Payload(&'static str),
    Unavailable,
    Hang,
    Gated(Mutex<Option<oneshot::Receiver<()>>>),
}

struct FakeAnalyzer {
    reply: Reply,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalyzer {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AnalysisProvider for FakeAnalyzer {
    fn name(&self) -> &'static str {
        "Fake"
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<pronounce::AnalysisResult> {
        self.requests.lock().push(request);
        match &self.reply {
            Reply::Payload(payload) => parse_analysis(payload),
            Reply::Unavailable => Err(Error::ServiceUnavailable("503".into())),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Reply::Gated(gate) => {
                let gate = gate.lock().take();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                parse_analysis(PERFECT)
            }
        }
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Recognizer that finalizes its pending words when stopped
struct FlushOnStopSpeech {
    pending: &'static str,
    events: Option<CaptureEventSender>,
}

impl SpeechStream for FlushOnStopSpeech {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(&mut self, events: CaptureEventSender) -> Result<()> {
        self.events = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.send(CaptureEvent::Final(vec![self.pending.to_string()]));
        }
    }
}

struct Harness {
    session: PracticeSession,
    feed: TranscriptFeed,
    ledger: Arc<Ledger>,
    storage: Arc<Storage>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

fn harness_with(script: RecorderScript, analyzer: Arc<FakeAnalyzer>, speech_supported: bool) -> Harness {
    let storage = Arc::new(Storage::in_memory().unwrap());
    let ledger = Arc::new(Ledger::load(storage.clone()));
    let speech = HostSpeechStream::new(speech_supported);
    let feed = speech.feed();
    let calls = Arc::clone(&script.calls);

    let session = PracticeSession::new(
        Box::new(FakeRecorder::new(script)),
        Box::new(speech),
        analyzer,
        Arc::clone(&ledger),
    );

    Harness {
        session,
        feed,
        ledger,
        storage,
        calls,
    }
}

fn harness(analyzer: Arc<FakeAnalyzer>) -> Harness {
    let script = RecorderScript {
        audio: Some(b"RIFF....WAVE".to_vec()),
        ..Default::default()
    };
    harness_with(script, analyzer, true)
}

// ============ Happy Path ============

#[tokio::test]
async fn test_full_session_updates_ledger() {
    let analyzer = FakeAnalyzer::new(Reply::Payload(PERFECT));
    let mut h = harness(analyzer.clone());

    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);

    assert!(h.feed.push("hel", false));
    assert!(h.feed.push("hello ", true));
    assert!(h.feed.push("wor", false));
    assert!(h.feed.push("world ", true));
    assert_eq!(h.session.poll_events(), "hello world");

    let outcome = h.session.stop().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Result);
    assert_eq!(outcome.result.overall_score, 85);
    assert_eq!(outcome.update.stats.xp, 85);
    assert_eq!(
        outcome.update.unlocked,
        vec![BadgeId::FirstStep, BadgeId::Perfect80, BadgeId::GrammarGod]
    );

    // the analyzer got the clip and the frozen transcript
    let requests = analyzer.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transcript_hint, "hello world");
    assert_eq!(requests[0].audio.mime_type, "audio/wav");

    // persisted immediately
    let persisted = h.storage.load();
    assert_eq!(persisted, h.ledger.stats());
    assert_eq!(persisted.total_practices, 1);

    assert_eq!(*h.calls.lock(), vec!["acquire", "start", "stop"]);
}

#[tokio::test]
async fn test_transcript_frozen_at_stop() {
    let mut h = harness(FakeAnalyzer::new(Reply::Payload(PERFECT)));

    h.session.start().await.unwrap();
    // queued but not yet polled: still part of the recording
    h.feed.push("I think", true);

    h.session.stop().await.unwrap();
    assert_eq!(h.session.transcript(), "I think");

    assert!(!h.feed.push("too late", true));
    assert_eq!(h.session.poll_events(), "I think");
}

#[tokio::test]
async fn test_final_flushed_on_stop_is_kept() {
    let analyzer = FakeAnalyzer::new(Reply::Payload(PERFECT));
    let script = RecorderScript {
        audio: Some(b"RIFF....WAVE".to_vec()),
        ..Default::default()
    };
    let storage = Arc::new(Storage::in_memory().unwrap());
    let mut session = PracticeSession::new(
        Box::new(FakeRecorder::new(script)),
        Box::new(FlushOnStopSpeech {
            pending: "world",
            events: None,
        }),
        analyzer.clone(),
        Arc::new(Ledger::load(storage)),
    );

    session.start().await.unwrap();
    session.stop().await.unwrap();

    assert_eq!(session.transcript(), "world");
    assert_eq!(analyzer.requests.lock()[0].transcript_hint, "world");
}

#[tokio::test]
async fn test_retry_from_result() {
    let mut h = harness(FakeAnalyzer::new(Reply::Payload(PERFECT)));

    h.session.start().await.unwrap();
    h.feed.push("hello", true);
    h.session.stop().await.unwrap();
    assert!(h.session.result().is_some());

    h.session.retry().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    assert!(h.session.result().is_none());
    assert!(h.session.transcript().is_empty());
    assert!(h.feed.is_listening());
}

#[tokio::test]
async fn test_three_sessions_unlock_streak() {
    let mut h = harness(FakeAnalyzer::new(Reply::Payload(PERFECT)));

    for _ in 0..3 {
        h.session.start().await.unwrap();
        h.session.stop().await.unwrap();
    }

    let stats = h.ledger.stats();
    assert_eq!(stats.total_practices, 3);
    assert_eq!(stats.xp, 255);
    assert_eq!(stats.level, 3);
    assert!(stats.has_badge(BadgeId::Streak3));
}

// ============ Failures ============

#[tokio::test]
async fn test_missing_score_returns_to_idle() {
    let mut h = harness(FakeAnalyzer::new(Reply::Payload(MISSING_SCORE)));

    h.session.start().await.unwrap();
    h.feed.push("hello world", true);
    h.session.poll_events();

    let err = h.session.stop().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));

    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(
        h.session.error(),
        Some("AI đang bận một chút, bạn thử lại nhé! 🙏")
    );
    assert!(h.session.result().is_none());
    assert!(h.session.transcript().is_empty());

    // ledger untouched in memory and on disk
    assert_eq!(h.ledger.stats(), UserStats::default());
    assert_eq!(h.storage.load(), UserStats::default());
}

#[tokio::test]
async fn test_service_unavailable_returns_to_idle() {
    let mut h = harness(FakeAnalyzer::new(Reply::Unavailable));

    h.session.start().await.unwrap();
    let err = h.session.stop().await.unwrap_err();

    assert!(matches!(err, Error::ServiceUnavailable(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.ledger.stats().total_practices, 0);

    // a fresh start is allowed after the failure
    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    assert!(h.session.error().is_none());
}

#[tokio::test]
async fn test_analysis_timeout() {
    let h = harness(FakeAnalyzer::new(Reply::Hang));
    let mut session = h.session.with_analysis_timeout(Duration::from_millis(50));

    session.start().await.unwrap();
    let err = session.stop().await.unwrap_err();

    assert!(matches!(err, Error::ServiceUnavailable(_)));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_device_access_denied_stays_idle() {
    let script = RecorderScript {
        deny_access: true,
        ..Default::default()
    };
    let analyzer = FakeAnalyzer::new(Reply::Payload(PERFECT));
    let mut h = harness_with(script, analyzer.clone(), true);

    let err = h.session.start().await.unwrap_err();
    assert!(matches!(err, Error::DeviceAccess(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(
        h.session.error(),
        Some("Không thể truy cập Microphone. Vui lòng kiểm tra quyền cài đặt!")
    );
    assert!(!h.feed.is_listening());
    assert!(analyzer.requests.lock().is_empty());
}

#[tokio::test]
async fn test_unsupported_transcription_stays_idle() {
    let mut h = harness_with(
        RecorderScript::default(),
        FakeAnalyzer::new(Reply::Payload(PERFECT)),
        false,
    );

    let err = h.session.start().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapability(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.error().is_some());

    // the microphone was released again
    assert_eq!(*h.calls.lock(), vec!["acquire", "stop"]);
}

#[tokio::test]
async fn test_no_audio_delivered_fails_to_idle() {
    let analyzer = FakeAnalyzer::new(Reply::Payload(PERFECT));
    let mut h = harness_with(RecorderScript::default(), analyzer.clone(), true);

    h.session.start().await.unwrap();
    let err = h.session.stop().await.unwrap_err();

    assert!(matches!(err, Error::Audio(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(analyzer.requests.lock().is_empty());
}

#[tokio::test]
async fn test_empty_audio_fails_to_idle() {
    let script = RecorderScript {
        audio: Some(Vec::new()),
        ..Default::default()
    };
    let analyzer = FakeAnalyzer::new(Reply::Payload(PERFECT));
    let mut h = harness_with(script, analyzer.clone(), true);

    h.session.start().await.unwrap();
    assert!(matches!(h.session.stop().await, Err(Error::Audio(_))));
    assert!(analyzer.requests.lock().is_empty());
}

// ============ Transitions ============

#[tokio::test]
async fn test_invalid_transitions_change_nothing() {
    let mut h = harness(FakeAnalyzer::new(Reply::Payload(PERFECT)));

    assert!(matches!(
        h.session.stop().await,
        Err(Error::InvalidTransition {
            action: "stop",
            state: SessionState::Idle
        })
    ));
    assert!(matches!(
        h.session.retry().await,
        Err(Error::InvalidTransition { action: "retry", .. })
    ));
    assert_eq!(h.session.state(), SessionState::Idle);

    h.session.start().await.unwrap();
    h.feed.push("hello", true);
    h.session.poll_events();

    assert!(matches!(
        h.session.start().await,
        Err(Error::InvalidTransition {
            action: "start",
            state: SessionState::Recording
        })
    ));
    assert_eq!(h.session.state(), SessionState::Recording);
    assert_eq!(h.session.transcript(), "hello");

    // only one acquire: the rejected start never touched the recorder
    assert_eq!(*h.calls.lock(), vec!["acquire", "start"]);
}

#[tokio::test]
async fn test_snapshots_show_analyzing_while_waiting() {
    let (release, gate) = oneshot::channel();
    let mut h = harness(FakeAnalyzer::new(Reply::Gated(Mutex::new(Some(gate)))));

    let mut snapshots = h.session.subscribe();
    h.session.start().await.unwrap();
    h.feed.push("hello", true);

    let session = Arc::new(tokio::sync::Mutex::new(h.session));
    let stopping = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.lock().await.stop().await })
    };

    let analyzing = snapshots
        .wait_for(|s| s.state == SessionState::Analyzing)
        .await
        .unwrap()
        .clone();
    assert_eq!(analyzing.transcript, "hello");
    assert!(analyzing.result.is_none());

    release.send(()).unwrap();
    let outcome = stopping.await.unwrap().unwrap();
    assert_eq!(outcome.result.overall_score, 85);

    let done = snapshots.borrow().clone();
    assert_eq!(done.state, SessionState::Result);
    assert_eq!(done.result.as_deref(), Some(outcome.result.as_ref()));
    assert!(done.update.is_some());
}
