//! Pronounce Core - English pronunciation practice engine
//!
//! Records one spoken utterance at a time, has a remote model score its
//! pronunciation and grammar, and keeps a gamified progress ledger (XP,
//! levels, badges) across sessions.

pub mod audio;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ffi;
pub mod ledger;
pub mod playback;
pub mod presentation;
pub mod providers;
pub mod session;
pub mod speaker;
pub mod speech_input;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

// Export FFI functions at crate root for header generation
pub use ffi::*;

/// Re-export the main engine components for convenience
pub use audio::{AudioLevelMeter, MicrophoneRecorder};
pub use capture::{AudioRecorder, CaptureEvent, LiveTranscript, SpeechStream};
pub use catalog::{BADGES, Badge, BadgeId, LEVELS, Level};
pub use config::PracticeConfig;
pub use ledger::{Ledger, LedgerStore, LedgerUpdate, apply_analysis};
pub use playback::AudioSink;
pub use presentation::{ResultView, ScreenView, StatsView};
pub use providers::{AnalysisProvider, SpeechSynthesisProvider};
pub use session::{PracticeSession, SessionOutcome, SessionSnapshot};
pub use speaker::SpeechPlayer;
pub use speech_input::{HostSpeechStream, TranscriptFeed};
pub use storage::Storage;
