//! FFI layer for host app integration
//!
//! Provides C-compatible functions that can be called from Swift or Kotlin.
//! Uses opaque pointers and C strings for cross-language compatibility.
//! Structured data crosses the boundary as JSON.

// FFI functions necessarily work with raw pointers - this is expected behavior
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioLevelMeter, MicrophoneRecorder};
use crate::config::PracticeConfig;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::playback::SpeakerSink;
use crate::presentation::{ResultView, ScreenView, StatsView};
use crate::session::{PracticeSession, SessionOutcome, SessionSnapshot};
use crate::speaker::SpeechPlayer;
use crate::speech_input::{HostSpeechStream, TranscriptFeed};
use crate::storage::{Storage, default_db_path};
use crate::types::{SessionState, Voice};

/// Opaque handle to the practice engine
pub struct PronounceHandle {
    runtime: Runtime,
    storage: Arc<Storage>,
    ledger: Arc<Ledger>,
    session: Arc<tokio::sync::Mutex<PracticeSession>>,
    snapshots: watch::Receiver<SessionSnapshot>,
    feed: TranscriptFeed,
    level_meter: AudioLevelMeter,
    speaker: Mutex<SpeechPlayer>,
    word_voice: Mutex<Voice>,
    last_error: Mutex<Option<String>>,
}

/// Result callback type for async operations
pub type ResultCallback = extern "C" fn(success: bool, result: *const c_char, context: *mut c_void);

/// Host context pointer handed back to the callback untouched
struct CallbackContext(*mut c_void);

// SAFETY: the engine never dereferences the pointer; the host owns its thread affinity
unsafe impl Send for CallbackContext {}

fn set_last_error(handle: &PronounceHandle, message: impl Into<String>) {
    *handle.last_error.lock() = Some(message.into());
}

fn clear_last_error(handle: &PronounceHandle) {
    *handle.last_error.lock() = None;
}

fn to_c_string(value: String) -> *mut c_char {
    match CString::new(value) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn to_json_c_string<T: Serialize>(handle: &PronounceHandle, value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_string(json),
        Err(e) => {
            error!("Failed to serialize JSON: {}", e);
            set_last_error(handle, format!("Failed to serialize JSON: {e}"));
            ptr::null_mut()
        }
    }
}

fn read_c_str<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(value) }.to_str().ok()
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn build_speaker(config: &PracticeConfig) -> SpeechPlayer {
    SpeechPlayer::new(Arc::new(config.speech_provider()), Arc::new(SpeakerSink))
}

/// Fold a session failure into `last_error`, using the user-facing copy
fn record_failure(handle: &PronounceHandle, err: &Error) {
    let message = match err {
        Error::InvalidTransition { .. } => err.to_string(),
        _ => err.user_message().to_string(),
    };
    set_last_error(handle, message);
}

/// Apply queued transcript events without waiting on a busy session
fn refresh_transcript(handle: &PronounceHandle) {
    if let Ok(mut session) = handle.session.try_lock() {
        session.poll_events();
    }
}

fn outcome_json(ledger: &Ledger, outcome: &SessionOutcome, word_voice: Voice) -> Result<String> {
    let view = ResultView::build(
        &outcome.result,
        &ledger.stats(),
        Some(&outcome.update),
        word_voice,
    );
    Ok(serde_json::to_string(&view)?)
}

// ============ Lifecycle ============

/// Initialize the practice engine
/// Returns an opaque handle that must be passed to all other functions
/// Returns null on failure
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_init(db_path: *const c_char) -> *mut PronounceHandle {
    init_logging();

    let db_path = if db_path.is_null() {
        default_db_path()
    } else {
        match read_c_str(db_path) {
            Some(s) => PathBuf::from(s),
            None => return ptr::null_mut(),
        }
    };

    // ensure parent directory exists
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        error!("Failed to create data directory: {}", e);
        return ptr::null_mut();
    }

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create async runtime: {}", e);
            return ptr::null_mut();
        }
    };

    let storage = match Storage::open(&db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open storage: {}", e);
            return ptr::null_mut();
        }
    };

    let config = PracticeConfig::load(&storage);
    let ledger = Arc::new(Ledger::load(storage.clone()));

    let speech = HostSpeechStream::new(false);
    let feed = speech.feed();

    let recorder = MicrophoneRecorder::new();
    let level_meter = recorder.level_meter();

    let session = PracticeSession::new(
        Box::new(recorder),
        Box::new(speech),
        Arc::new(config.analysis_provider()),
        Arc::clone(&ledger),
    )
    .with_analysis_timeout(config.analysis_timeout);
    let snapshots = session.subscribe();

    let handle = PronounceHandle {
        runtime,
        storage,
        ledger,
        session: Arc::new(tokio::sync::Mutex::new(session)),
        snapshots,
        feed,
        level_meter,
        speaker: Mutex::new(build_speaker(&config)),
        word_voice: Mutex::new(config.default_voice),
        last_error: Mutex::new(None),
    };

    info!("Pronounce engine initialized");

    Box::into_raw(Box::new(handle))
}

/// Destroy the engine and free resources
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_destroy(handle: *mut PronounceHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
        debug!("Pronounce engine destroyed");
    }
}

// ============ Configuration ============

/// Persist the Gemini API key and rebuild both providers
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_set_api_key(handle: *mut PronounceHandle, api_key: *const c_char) -> bool {
    let handle = unsafe { &*handle };

    let Some(api_key) = read_c_str(api_key) else {
        set_last_error(handle, "Invalid API key string");
        return false;
    };

    if let Err(e) = PracticeConfig::save_api_key(&handle.storage, api_key) {
        error!("Failed to save API key: {}", e);
        set_last_error(handle, format!("Failed to save API key: {e}"));
        return false;
    }

    let config = PracticeConfig::load(&handle.storage);
    *handle.speaker.lock() = build_speaker(&config);
    *handle.word_voice.lock() = config.default_voice;

    let analyzer = Arc::new(config.analysis_provider());
    match handle.session.try_lock() {
        Ok(mut session) => session.set_analyzer(analyzer),
        Err(_) => {
            // a stop is awaiting analysis; swap once it releases the session
            let session = Arc::clone(&handle.session);
            handle.runtime.spawn(async move {
                session.lock().await.set_analyzer(analyzer);
            });
        }
    }

    clear_last_error(handle);
    true
}

/// Tell the engine whether the host has a speech recognizer
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_set_speech_supported(handle: *mut PronounceHandle, supported: bool) {
    let handle = unsafe { &*handle };
    handle.feed.set_supported(supported);
}

// ============ Session ============

fn run_start(handle: &PronounceHandle, retry: bool) -> bool {
    let Ok(mut session) = handle.session.try_lock() else {
        // a stop is still analyzing
        let err = Error::InvalidTransition {
            action: if retry { "retry" } else { "start" },
            state: SessionState::Analyzing,
        };
        warn!("{}", err);
        record_failure(handle, &err);
        return false;
    };

    let started = handle.runtime.block_on(async {
        if retry {
            session.retry().await
        } else {
            session.start().await
        }
    });

    match started {
        Ok(()) => {
            clear_last_error(handle);
            true
        }
        Err(e) => {
            record_failure(handle, &e);
            false
        }
    }
}

/// Begin recording a new utterance
/// Returns true on success
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_start(handle: *mut PronounceHandle) -> bool {
    let handle = unsafe { &*handle };
    run_start(handle, false)
}

/// Start over from a result
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_retry(handle: *mut PronounceHandle) -> bool {
    let handle = unsafe { &*handle };
    run_start(handle, true)
}

/// Report one result from the host's speech recognizer
/// Returns false when no recording is listening
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_push_transcript(
    handle: *mut PronounceHandle,
    text: *const c_char,
    is_final: bool,
) -> bool {
    let handle = unsafe { &*handle };

    let Some(text) = read_c_str(text) else {
        return false;
    };

    let accepted = handle.feed.push(text, is_final);
    if accepted && is_final {
        refresh_transcript(handle);
    }
    accepted
}

/// Stop recording and analyze the utterance in the background
///
/// The callback receives the result screen as JSON on success, or the
/// user-facing error message on failure. Poll `pronounce_state` to follow progress.
/// The callback runs on a plain thread, so it may call back into the engine.
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_stop(
    handle: *mut PronounceHandle,
    callback: ResultCallback,
    context: *mut c_void,
) {
    let handle = unsafe { &*handle };

    let session = Arc::clone(&handle.session);
    let ledger = Arc::clone(&handle.ledger);
    let word_voice = *handle.word_voice.lock();
    let context = CallbackContext(context);

    handle.runtime.spawn(async move {
        let stopped = session.lock().await.stop().await;

        let (success, message) = match stopped {
            Ok(outcome) => match outcome_json(&ledger, &outcome, word_voice) {
                Ok(json) => (true, json),
                Err(e) => {
                    error!("Failed to serialize result: {}", e);
                    (false, e.to_string())
                }
            },
            Err(e @ Error::InvalidTransition { .. }) => (false, e.to_string()),
            Err(e) => (false, e.user_message().to_string()),
        };

        // off the runtime: the host may start the next session from here
        let delivered = std::thread::Builder::new()
            .name("pronounce-callback".into())
            .spawn(move || {
                let context = context;
                let message = CString::new(message).unwrap_or_default();
                callback(success, message.as_ptr(), context.0);
            });
        if let Err(e) = delivered {
            error!("Failed to spawn callback thread: {}", e);
        }
    });
}

/// Current session state: 0 idle, 1 recording, 2 analyzing, 3 result
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_state(handle: *mut PronounceHandle) -> u8 {
    let handle = unsafe { &*handle };
    handle.snapshots.borrow().state.code()
}

/// Render model for the current screen as JSON
/// Caller must free the returned string with pronounce_free_string
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_get_screen_json(handle: *mut PronounceHandle) -> *mut c_char {
    let handle = unsafe { &*handle };
    refresh_transcript(handle);

    let snapshot = handle.snapshots.borrow().clone();
    let word_voice = *handle.word_voice.lock();
    let view = ScreenView::build(&snapshot, &handle.ledger.stats(), word_voice);
    to_json_c_string(handle, &view)
}

/// Ledger, progress and badge shelf as JSON
/// Caller must free the returned string with pronounce_free_string
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_get_stats_json(handle: *mut PronounceHandle) -> *mut c_char {
    let handle = unsafe { &*handle };
    let view = StatsView::build(&handle.ledger.stats());
    to_json_c_string(handle, &view)
}

/// Microphone input level between 0.0 and 1.0; 0.0 unless recording
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_get_audio_level(handle: *mut PronounceHandle) -> f32 {
    let handle = unsafe { &*handle };
    handle.level_meter.current_level()
}

// ============ Playback ============

/// Speak a word (voice 0, Kore) or a correction (voice 1, Puck)
/// Returns true if playback was queued; failures after that are only logged
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_speak(handle: *mut PronounceHandle, text: *const c_char, voice: u8) -> bool {
    let handle = unsafe { &*handle };

    let Some(text) = read_c_str(text) else {
        return false;
    };

    let speaker = handle.speaker.lock().clone();
    speaker
        .speak(handle.runtime.handle(), text, Voice::from_code(voice))
        .is_some()
}

// ============ Utilities ============

/// Get the last error message
/// Returns null if no error
/// Caller must free the returned string with pronounce_free_string
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_get_last_error(handle: *mut PronounceHandle) -> *mut c_char {
    let handle = unsafe { &*handle };
    match handle.last_error.lock().clone() {
        Some(message) => to_c_string(message),
        None => ptr::null_mut(),
    }
}

/// Free a string returned by pronounce functions
#[unsafe(no_mangle)]
pub extern "C" fn pronounce_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}
