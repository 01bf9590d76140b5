//! Core types used throughout Pronounce

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::catalog::BadgeId;

/// Unique identifier for a practice session
pub type SessionId = Uuid;

/// Audio data as raw bytes
pub type AudioData = Vec<u8>;

/// An encoded utterance handed over by the capture primitive when it stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: AudioData,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(data: AudioData, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// WAV-encoded clip
    pub fn wav(data: AudioData) -> Self {
        Self::new(data, "audio/wav")
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Where the practice session currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Analyzing,
    Result,
}

impl SessionState {
    /// Whether a new recording may begin from this state
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Result)
    }

    /// Numeric code used across the FFI boundary
    pub fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Recording => 1,
            Self::Analyzing => 2,
            Self::Result => 3,
        }
    }
}

/// How a single word was pronounced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordStatus {
    Correct,
    Mispronounced,
}

/// One word of the utterance as judged by the analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedWord {
    pub text: String,
    pub status: WordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
}

impl AnalyzedWord {
    pub fn is_mispronounced(&self) -> bool {
        self.status == WordStatus::Mispronounced
    }
}

/// A grammar, word-choice or naturalness problem in the utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarError {
    pub phrase: String,
    pub explanation: String,
    pub correction: String,
    pub examples: Vec<String>,
}

/// Scoring payload returned by the analyzer for one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Accuracy score, 0-100
    pub overall_score: u32,
    pub transcription: String,
    pub words: Vec<AnalyzedWord>,
    pub grammar_errors: Vec<GrammarError>,
    pub summary: String,
}

impl AnalysisResult {
    pub fn mispronounced_words(&self) -> impl Iterator<Item = &AnalyzedWord> {
        self.words.iter().filter(|w| w.is_mispronounced())
    }

    /// True when any grammar error phrase contains the word (case-insensitive)
    pub fn word_in_grammar_error(&self, word: &str) -> bool {
        let needle = word.to_lowercase();
        self.grammar_errors
            .iter()
            .any(|err| err.phrase.to_lowercase().contains(&needle))
    }
}

/// Cumulative learner progress, persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub xp: u32,
    pub level: u32,
    pub total_practices: u32,
    #[serde(deserialize_with = "deserialize_badges")]
    pub badges: BTreeSet<BadgeId>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            total_practices: 0,
            badges: BTreeSet::new(),
        }
    }
}

impl UserStats {
    pub fn has_badge(&self, id: BadgeId) -> bool {
        self.badges.contains(&id)
    }
}

/// Accepts plain ids as well as full badge objects, dropping ids this build doesn't know
fn deserialize_badges<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<BadgeId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PersistedBadge {
        Id(String),
        Entry { id: String },
    }

    let raw: Vec<PersistedBadge> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|badge| {
            let id = match badge {
                PersistedBadge::Id(id) | PersistedBadge::Entry { id } => id,
            };
            BadgeId::from_id(&id)
        })
        .collect())
}

/// Prebuilt voice used for synthesized pronunciation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Kore,
    Puck,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kore => "Kore",
            Self::Puck => "Puck",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "kore" => Some(Self::Kore),
            "puck" => Some(Self::Puck),
            _ => None,
        }
    }

    /// Numeric code used across the FFI boundary (0 = Kore, 1 = Puck)
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Puck,
            _ => Self::Kore,
        }
    }
}
