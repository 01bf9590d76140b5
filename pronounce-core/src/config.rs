//! Engine configuration persisted in the settings table

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::providers::{
    DEFAULT_ANALYSIS_MODEL, DEFAULT_FEEDBACK_LANGUAGE, DEFAULT_SPEECH_MODEL,
    GeminiAnalysisProvider, GeminiSpeechProvider,
};
use crate::storage::{
    SETTING_ANALYSIS_MODEL, SETTING_ANALYSIS_TIMEOUT_SECS, SETTING_DEFAULT_VOICE,
    SETTING_FEEDBACK_LANGUAGE, SETTING_GEMINI_API_KEY, SETTING_SPEECH_MODEL, Storage,
};
use crate::types::Voice;

/// Upper bound on one analysis round trip when nothing is configured
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeConfig {
    pub api_key: Option<String>,
    pub analysis_model: String,
    pub speech_model: String,
    pub feedback_language: String,
    pub analysis_timeout: Duration,
    pub default_voice: Voice,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            feedback_language: DEFAULT_FEEDBACK_LANGUAGE.to_string(),
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            default_voice: Voice::default(),
        }
    }
}

impl PracticeConfig {
    /// Load from storage, keeping defaults for anything missing or unparseable
    pub fn load(storage: &Storage) -> Self {
        let setting = |key: &str| {
            storage
                .get_setting(key)
                .ok()
                .flatten()
                .filter(|v| !v.trim().is_empty())
        };

        let mut config = Self {
            api_key: setting(SETTING_GEMINI_API_KEY),
            ..Self::default()
        };

        if let Some(model) = setting(SETTING_ANALYSIS_MODEL) {
            config.analysis_model = model;
        }
        if let Some(model) = setting(SETTING_SPEECH_MODEL) {
            config.speech_model = model;
        }
        if let Some(language) = setting(SETTING_FEEDBACK_LANGUAGE) {
            config.feedback_language = language;
        }
        if let Some(raw) = setting(SETTING_ANALYSIS_TIMEOUT_SECS) {
            match parse_timeout(&raw) {
                Ok(timeout) => config.analysis_timeout = timeout,
                Err(e) => warn!("{}", e),
            }
        }
        if let Some(raw) = setting(SETTING_DEFAULT_VOICE) {
            match Voice::from_name(&raw) {
                Some(voice) => config.default_voice = voice,
                None => warn!("Unknown voice in settings: {}", raw),
            }
        }

        info!("Loading persisted config:");
        info!(
            "  Gemini key: {}",
            if config.api_key.is_some() { "SET" } else { "NONE" }
        );
        info!("  Analysis model: {}", config.analysis_model);
        info!("  Feedback language: {}", config.feedback_language);
        info!("  Analysis timeout: {:?}", config.analysis_timeout);

        config
    }

    /// Persist the API key
    pub fn save_api_key(storage: &Storage, api_key: &str) -> Result<()> {
        storage.set_setting(SETTING_GEMINI_API_KEY, api_key.trim())
    }

    pub fn analysis_provider(&self) -> GeminiAnalysisProvider {
        GeminiAnalysisProvider::new(self.api_key.clone())
            .with_model(&self.analysis_model)
            .with_feedback_language(&self.feedback_language)
            .with_timeout(self.analysis_timeout)
    }

    pub fn speech_provider(&self) -> GeminiSpeechProvider {
        GeminiSpeechProvider::new(self.api_key.clone()).with_model(&self.speech_model)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "analysis_timeout_secs must be a positive integer, got {raw:?}"
        ))),
    }
}
