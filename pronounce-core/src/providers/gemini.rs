//! Gemini provider implementations for pronunciation analysis and speech synthesis

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::types::AnalysisResult;

use super::analysis::parse_analysis;
use super::{
    AnalysisProvider, AnalysisRequest, SpeechRequest, SpeechSynthesisProvider, SynthesizedSpeech,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_FEEDBACK_LANGUAGE: &str = "Vietnamese";

/// Sample rate of the PCM the TTS model returns
pub const TTS_SAMPLE_RATE: u32 = 24_000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

fn env_api_key(api_key: Option<String>) -> Option<String> {
    api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Gemini pronunciation analyzer (native API with inline audio and a response schema)
pub struct GeminiAnalysisProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    feedback_language: String,
}

impl GeminiAnalysisProvider {
    /// Create a new provider (API key loaded from environment if not provided)
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: env_api_key(api_key),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            feedback_language: DEFAULT_FEEDBACK_LANGUAGE.to_string(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bound the whole request, including reading the response body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Point at a proxy or alternate deployment
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Language for feedback and grammar explanations
    pub fn with_feedback_language(mut self, language: impl Into<String>) -> Self {
        self.feedback_language = language.into();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::ProviderNotConfigured("Gemini API key not set".to_string()))
    }

    fn build_prompt(&self, transcript_hint: &str) -> String {
        format!(
            "Task: Analyze this English spoken audio for pronunciation and grammar.\n\
             User's Speech Transcript (Reference): \"{transcript_hint}\"\n\n\
             1. Calculate an accuracy score (0-100).\n\
             2. Identify specific mispronounced words. Compare audio to the standard English pronunciation.\n\
             3. Check for grammar, word choice, or naturalness errors.\n\
             4. Provide short, encouraging feedback in {language} (summary).\n\
             5. For each grammar error, provide a clear explanation in {language}.\n\n\
             Return the result strictly as JSON matching the response schema.",
            language = self.feedback_language,
        )
    }
}

/// Response schema mirroring [`AnalysisResult`]
fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overallScore": { "type": "NUMBER" },
            "transcription": { "type": "STRING" },
            "words": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING" },
                        "status": { "type": "STRING", "enum": ["correct", "mispronounced"] },
                        "phonetic": { "type": "STRING" }
                    },
                    "required": ["text", "status"]
                }
            },
            "grammarErrors": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "phrase": { "type": "STRING" },
                        "explanation": { "type": "STRING" },
                        "correction": { "type": "STRING" },
                        "examples": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["phrase", "explanation", "correction", "examples"]
                }
            },
            "summary": { "type": "STRING" }
        },
        "required": ["overallScore", "transcription", "words", "grammarErrors", "summary"]
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<GeminiSpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiSpeechConfig {
    voice_config: GeminiVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiVoiceConfig {
    prebuilt_voice_config: GeminiPrebuiltVoice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPrebuiltVoice {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
struct GeminiGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    text: Option<String>,
    inline_data: Option<GeminiInlineData>,
}

impl GeminiGenerateContentResponse {
    fn into_parts(self) -> impl Iterator<Item = GeminiPartResponse> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
    }

    fn first_text(self) -> Option<String> {
        self.into_parts().find_map(|p| p.text)
    }

    fn first_inline_data(self) -> Option<GeminiInlineData> {
        self.into_parts().find_map(|p| p.inline_data)
    }
}

/// POST a generateContent request and decode the envelope
async fn generate_content(
    client: &Client,
    base_url: &str,
    model: &str,
    api_key: &str,
    request: &GeminiGenerateContentRequest,
) -> Result<GeminiGenerateContentResponse> {
    let url = format!("{}/models/{}:generateContent", base_url, model);
    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .header("Content-Type", "application/json")
        .json(request)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::ServiceUnavailable("Gemini request timed out".to_string())
            } else {
                Error::ServiceUnavailable(format!("Gemini request failed: {e}"))
            }
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!("Gemini API error: {} - {}", status, error_text);
        return Err(Error::ServiceUnavailable(format!(
            "Gemini API error: {} - {}",
            status, error_text
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::ServiceUnavailable(format!("Failed to read Gemini response: {e}")))?;

    serde_json::from_str(&body).map_err(|e| Error::MalformedResponse(e.to_string()))
}

#[async_trait]
impl AnalysisProvider for GeminiAnalysisProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let api_key = self.api_key()?;

        let parts = vec![
            GeminiPart::Text {
                text: self.build_prompt(&request.transcript_hint),
            },
            GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: request.audio.mime_type.clone(),
                    data: STANDARD.encode(&request.audio.data),
                },
            },
        ];

        let generate_request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent { parts }],
            generation_config: Some(GeminiGenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(analysis_schema()),
                ..Default::default()
            }),
        };

        debug!(
            audio_bytes = request.audio.data.len(),
            hint_chars = request.transcript_hint.len(),
            "Sending analysis request to Gemini"
        );

        let response = generate_content(
            &self.client,
            &self.base_url,
            &self.model,
            api_key,
            &generate_request,
        )
        .await?;

        let text = response
            .first_text()
            .ok_or_else(|| Error::MalformedResponse("No analysis returned".to_string()))?;

        parse_analysis(&text)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Gemini text-to-speech provider
pub struct GeminiSpeechProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiSpeechProvider {
    /// Create a new provider (API key loaded from environment if not provided)
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: env_api_key(api_key),
            model: DEFAULT_SPEECH_MODEL.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::ProviderNotConfigured("Gemini API key not set".to_string()))
    }
}

#[async_trait]
impl SpeechSynthesisProvider for GeminiSpeechProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesizedSpeech> {
        let api_key = self.api_key()?;

        let generate_request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart::Text {
                    text: format!("Say clearly: {}", request.text),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(GeminiSpeechConfig {
                    voice_config: GeminiVoiceConfig {
                        prebuilt_voice_config: GeminiPrebuiltVoice {
                            voice_name: request.voice.as_str().to_string(),
                        },
                    },
                }),
                ..Default::default()
            }),
        };

        debug!(voice = request.voice.as_str(), "Sending speech request to Gemini");

        let response = generate_content(
            &self.client,
            &self.base_url,
            &self.model,
            api_key,
            &generate_request,
        )
        .await?;

        let inline = response
            .first_inline_data()
            .ok_or_else(|| Error::MalformedResponse("No audio returned".to_string()))?;

        let pcm = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| Error::MalformedResponse(format!("Invalid audio payload: {e}")))?;

        Ok(SynthesizedSpeech {
            pcm,
            sample_rate: TTS_SAMPLE_RATE,
            channels: 1,
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
