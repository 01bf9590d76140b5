//! Pronunciation analysis provider trait and response validation

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{AnalysisResult, AnalyzedWord, AudioClip, GrammarError, WordStatus};

/// Request for scoring one utterance
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Encoded utterance
    pub audio: AudioClip,
    /// Live transcript captured while recording; a reference, not ground truth
    pub transcript_hint: String,
}

impl AnalysisRequest {
    pub fn new(audio: AudioClip, transcript_hint: impl Into<String>) -> Self {
        Self {
            audio,
            transcript_hint: transcript_hint.into(),
        }
    }
}

/// Trait for pronunciation analysis providers
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Score the utterance
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult>;

    /// Check if the provider is configured and ready
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    overall_score: f64,
    transcription: String,
    words: Vec<RawWord>,
    grammar_errors: Vec<RawGrammarError>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    summary_vi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWord {
    text: String,
    status: WordStatus,
    #[serde(default)]
    phonetic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGrammarError {
    phrase: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default, rename = "explanationVi")]
    explanation_vi: Option<String>,
    correction: String,
    examples: Vec<String>,
}

/// Parse and validate the analyzer's JSON payload
pub fn parse_analysis(payload: &str) -> Result<AnalysisResult> {
    let body = strip_code_fence(payload);
    let raw: RawAnalysis =
        serde_json::from_str(body).map_err(|e| Error::MalformedResponse(e.to_string()))?;

    if !raw.overall_score.is_finite() || !(0.0..=100.0).contains(&raw.overall_score) {
        return Err(Error::MalformedResponse(format!(
            "overallScore out of range: {}",
            raw.overall_score
        )));
    }

    let grammar_errors = raw
        .grammar_errors
        .into_iter()
        .map(|e| {
            Ok(GrammarError {
                explanation: either_field("explanation", e.explanation, e.explanation_vi)?,
                phrase: e.phrase,
                correction: e.correction,
                examples: e.examples,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(AnalysisResult {
        overall_score: raw.overall_score.round() as u32,
        transcription: raw.transcription,
        words: raw
            .words
            .into_iter()
            .map(|w| AnalyzedWord {
                text: w.text,
                status: w.status,
                phonetic: w.phonetic.filter(|p| !p.trim().is_empty()),
            })
            .collect(),
        grammar_errors,
        summary: either_field("summary", raw.summary, raw.summary_vi)?,
    })
}

/// Feedback fields come plain or with a `Vi` suffix; the plain key wins
fn either_field(name: &str, plain: Option<String>, localized: Option<String>) -> Result<String> {
    plain
        .or(localized)
        .ok_or_else(|| Error::MalformedResponse(format!("missing field `{name}`")))
}

/// Models occasionally wrap JSON output in a markdown fence
fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "overallScore": 85,
        "transcription": "I goes to school",
        "words": [
            {"text": "I", "status": "correct"},
            {"text": "goes", "status": "mispronounced", "phonetic": "/ɡoʊz/"},
            {"text": "to", "status": "correct", "phonetic": ""}
        ],
        "grammarErrors": [
            {
                "phrase": "I goes",
                "explanationVi": "Chủ ngữ 'I' đi với 'go'.",
                "correction": "I go",
                "examples": ["I go to work every day."]
            }
        ],
        "summaryVi": "Rất tốt!"
    }"#;

    #[test]
    fn test_parse_valid_payload() {
        let result = parse_analysis(VALID).unwrap();
        assert_eq!(result.overall_score, 85);
        assert_eq!(result.words.len(), 3);
        assert_eq!(result.words[1].status, WordStatus::Mispronounced);
        assert_eq!(result.words[1].phonetic.as_deref(), Some("/ɡoʊz/"));
        assert_eq!(result.words[2].phonetic, None);
        assert_eq!(result.grammar_errors[0].correction, "I go");
        assert_eq!(result.summary, "Rất tốt!");
    }

    #[test]
    fn test_missing_score_is_malformed() {
        let payload = r#"{"transcription": "", "words": [], "grammarErrors": [], "summary": ""}"#;
        let err = parse_analysis(payload).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_wrong_types_are_malformed() {
        let payload = r#"{"overallScore": "high", "transcription": "", "words": [], "grammarErrors": [], "summary": ""}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(Error::MalformedResponse(_))
        ));

        let payload = r#"{"overallScore": 50, "transcription": "", "words": [{"text": "hi", "status": "mumbled"}], "grammarErrors": [], "summary": ""}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_score_out_of_range_is_malformed() {
        let payload = r#"{"overallScore": 140, "transcription": "", "words": [], "grammarErrors": [], "summary": ""}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_fractional_score_rounds() {
        let payload = r#"{"overallScore": 79.6, "transcription": "", "words": [], "grammarErrors": [], "summary": ""}"#;
        assert_eq!(parse_analysis(payload).unwrap().overall_score, 80);
    }

    #[test]
    fn test_plain_and_localized_keys_together() {
        let payload = r#"{
            "overallScore": 70,
            "transcription": "I goes",
            "words": [],
            "grammarErrors": [{
                "phrase": "I goes",
                "explanation": "Use 'go' after 'I'.",
                "explanationVi": "Chủ ngữ 'I' đi với 'go'.",
                "correction": "I go",
                "examples": []
            }],
            "summary": "Good job!",
            "summaryVi": "Rất tốt!"
        }"#;
        let result = parse_analysis(payload).unwrap();
        assert_eq!(result.summary, "Good job!");
        assert_eq!(result.grammar_errors[0].explanation, "Use 'go' after 'I'.");
    }

    #[test]
    fn test_missing_summary_is_malformed() {
        let payload = r#"{"overallScore": 50, "transcription": "", "words": [], "grammarErrors": []}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(Error::MalformedResponse(_))
        ));

        let payload = r#"{"overallScore": 50, "transcription": "", "words": [], "grammarErrors": [{"phrase": "a", "correction": "b", "examples": []}], "summary": ""}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_fenced_payload() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(parse_analysis(&fenced).unwrap().overall_score, 85);
    }
}
