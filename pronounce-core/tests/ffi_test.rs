//! Integration tests for the FFI layer
//!
//! These tests verify the C-compatible functions that host apps call.
//! They stay away from the microphone and the network: lifecycle, state
//! reporting, JSON marshalling and error handling only.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::mpsc;
use std::time::Duration;

use pronounce::ffi::*;
use tempfile::TempDir;

// ============ Helper Functions ============

fn c_str(s: &str) -> CString {
    CString::new(s).expect("CString creation failed")
}

fn from_c_str_and_free(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        let result = unsafe { CStr::from_ptr(ptr).to_str().ok().map(String::from) };
        pronounce_free_string(ptr);
        result
    }
}

fn init_in(dir: &TempDir) -> *mut PronounceHandle {
    let path = c_str(dir.path().join("pronounce.db").to_str().unwrap());
    let handle = pronounce_init(path.as_ptr());
    assert!(!handle.is_null(), "pronounce_init should not return null");
    handle
}

extern "C" fn forward_result(success: bool, result: *const c_char, context: *mut c_void) {
    let sender = unsafe { &*(context as *const mpsc::Sender<(bool, String)>) };
    let message = unsafe { CStr::from_ptr(result) }
        .to_string_lossy()
        .into_owned();
    let _ = sender.send((success, message));
}

/// Host context for a callback that starts the next session itself
struct RestartContext {
    handle: *mut PronounceHandle,
    sender: mpsc::Sender<(bool, bool)>,
}

extern "C" fn restart_from_callback(success: bool, _result: *const c_char, context: *mut c_void) {
    let context = unsafe { &*(context as *const RestartContext) };
    let started = pronounce_start(context.handle);
    let _ = context.sender.send((success, started));
}

// ============ Handle Lifecycle Tests ============

#[test]
fn test_init_and_destroy() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);
    pronounce_destroy(handle);

    // destroying null is a no-op
    pronounce_destroy(ptr::null_mut());
}

#[test]
fn test_initial_state_and_stats() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    assert_eq!(pronounce_state(handle), 0);
    assert!(from_c_str_and_free(pronounce_get_last_error(handle)).is_none());

    let stats = from_c_str_and_free(pronounce_get_stats_json(handle)).unwrap();
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats["stats"]["xp"], 0);
    assert_eq!(stats["stats"]["level"], 1);
    assert_eq!(stats["progress"]["title"], "Beginner");
    assert_eq!(stats["badges"].as_array().unwrap().len(), 4);

    let screen = from_c_str_and_free(pronounce_get_screen_json(handle)).unwrap();
    let screen: serde_json::Value = serde_json::from_str(&screen).unwrap();
    assert_eq!(screen["state"], "idle");
    assert_eq!(screen["screen"]["kind"], "idle");

    pronounce_destroy(handle);
}

// ============ Session Tests ============

#[test]
fn test_transcript_ignored_while_idle() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    let text = c_str("hello");
    assert!(!pronounce_push_transcript(handle, text.as_ptr(), true));
    assert!(!pronounce_push_transcript(handle, ptr::null(), true));

    pronounce_destroy(handle);
}

#[test]
fn test_retry_from_idle_rejected() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    assert!(!pronounce_retry(handle));
    assert_eq!(pronounce_state(handle), 0);
    let error = from_c_str_and_free(pronounce_get_last_error(handle)).unwrap();
    assert!(error.contains("retry"));

    pronounce_destroy(handle);
}

#[test]
fn test_stop_from_idle_reports_through_callback() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    let (tx, rx) = mpsc::channel::<(bool, String)>();
    pronounce_stop(
        handle,
        forward_result,
        &tx as *const mpsc::Sender<(bool, String)> as *mut c_void,
    );

    let (success, message) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!success);
    assert!(message.contains("stop"));
    assert_eq!(pronounce_state(handle), 0);

    pronounce_destroy(handle);
}

#[test]
fn test_start_from_stop_callback() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);
    // start fails fast without a recognizer, whatever the microphone does
    pronounce_set_speech_supported(handle, false);

    let (tx, rx) = mpsc::channel::<(bool, bool)>();
    let context = RestartContext { handle, sender: tx };
    pronounce_stop(
        handle,
        restart_from_callback,
        &context as *const RestartContext as *mut c_void,
    );

    let (stopped, started) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!stopped);
    assert!(!started);
    assert_eq!(pronounce_state(handle), 0);

    pronounce_destroy(handle);
}

#[test]
fn test_audio_level_zero_while_idle() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    assert_eq!(pronounce_get_audio_level(handle), 0.0);

    pronounce_destroy(handle);
}

// ============ Configuration Tests ============

#[test]
fn test_api_key_persists() {
    let dir = TempDir::new().unwrap();

    let handle = init_in(&dir);
    let key = c_str("test-key");
    assert!(pronounce_set_api_key(handle, key.as_ptr()));
    assert!(!pronounce_set_api_key(handle, ptr::null()));
    pronounce_destroy(handle);

    let storage = pronounce::Storage::open(dir.path().join("pronounce.db")).unwrap();
    assert_eq!(
        storage
            .get_setting(pronounce::storage::SETTING_GEMINI_API_KEY)
            .unwrap()
            .as_deref(),
        Some("test-key")
    );
}

#[test]
fn test_session_free_right_after_api_key() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    for _ in 0..20 {
        let key = c_str("test-key");
        assert!(pronounce_set_api_key(handle, key.as_ptr()));
        // the session is Idle, never reported as busy analyzing
        assert!(!pronounce_retry(handle));
        let error = from_c_str_and_free(pronounce_get_last_error(handle)).unwrap();
        assert!(error.contains("Idle"), "unexpected error: {error}");
    }

    pronounce_destroy(handle);
}

#[test]
fn test_speak_rejects_empty_text() {
    let dir = TempDir::new().unwrap();
    let handle = init_in(&dir);

    let blank = c_str("   ");
    assert!(!pronounce_speak(handle, blank.as_ptr(), 0));
    assert!(!pronounce_speak(handle, ptr::null(), 1));

    pronounce_destroy(handle);
}

// ============ Utility Tests ============

#[test]
fn test_free_null_string() {
    // should not panic
    pronounce_free_string(ptr::null_mut());
}
