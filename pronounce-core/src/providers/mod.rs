//! Provider abstraction layer for pronunciation analysis and speech synthesis
//!
//! Both capabilities are served by the same remote model family today (Gemini),
//! but the session and playback code only see the traits.
mod analysis;
mod gemini;
mod speech;

pub use analysis::{AnalysisProvider, AnalysisRequest, parse_analysis};
pub use gemini::{
    DEFAULT_ANALYSIS_MODEL, DEFAULT_FEEDBACK_LANGUAGE, DEFAULT_SPEECH_MODEL,
    GeminiAnalysisProvider, GeminiSpeechProvider, TTS_SAMPLE_RATE,
};
pub use speech::{SpeechRequest, SpeechSynthesisProvider, SynthesizedSpeech};
