//! Render models for the host UI
//!
//! Everything here is derived from a [`SessionSnapshot`] and the current
//! [`UserStats`]; nothing is stored. Hosts receive these as JSON.

use serde::Serialize;

use crate::catalog::{BADGES, XP_PER_LEVEL, tier_for_xp, xp_into_level};
use crate::ledger::{LedgerUpdate, PERFECT_SCORE_THRESHOLD};
use crate::session::SessionSnapshot;
use crate::types::{AnalysisResult, SessionState, UserStats, Voice};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub title: &'static str,
    pub level: u32,
    pub xp: u32,
    pub xp_into_level: u32,
    pub xp_per_level: u32,
    pub total_practices: u32,
}

impl ProgressView {
    pub fn from_stats(stats: &UserStats) -> Self {
        Self {
            title: tier_for_xp(stats.xp).name,
            level: stats.level,
            xp: stats.xp,
            xp_into_level: xp_into_level(stats.xp),
            xp_per_level: XP_PER_LEVEL,
            total_practices: stats.total_practices,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeView {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub requirement: &'static str,
    pub unlocked: bool,
}

/// Every catalog badge in catalog order
pub fn badge_shelf(stats: &UserStats) -> Vec<BadgeView> {
    BADGES
        .iter()
        .map(|badge| BadgeView {
            id: badge.id.as_str(),
            name: badge.name,
            icon: badge.icon,
            color: badge.color,
            requirement: badge.requirement,
            unlocked: stats.has_badge(badge.id),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordView {
    pub text: String,
    pub phonetic: Option<String>,
    pub mispronounced: bool,
    pub in_grammar_error: bool,
    /// Tapping plays the word back
    pub speakable: bool,
    pub voice: Voice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarCard {
    pub phrase: String,
    pub correction: String,
    pub explanation: String,
    pub examples: Vec<String>,
    pub voice: Voice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub score: u32,
    pub celebrate: bool,
    pub summary: String,
    pub transcription: String,
    pub words: Vec<WordView>,
    pub grammar: Vec<GrammarCard>,
    pub progress: ProgressView,
    pub badges: Vec<BadgeView>,
    pub update: Option<LedgerUpdate>,
}

impl ResultView {
    /// Words play back in `word_voice`; corrections always use Puck
    pub fn build(
        result: &AnalysisResult,
        stats: &UserStats,
        update: Option<&LedgerUpdate>,
        word_voice: Voice,
    ) -> Self {
        let words = result
            .words
            .iter()
            .map(|word| {
                let mispronounced = word.is_mispronounced();
                WordView {
                    text: word.text.clone(),
                    phonetic: word.phonetic.clone(),
                    mispronounced,
                    in_grammar_error: result.word_in_grammar_error(&word.text),
                    speakable: mispronounced,
                    voice: word_voice,
                }
            })
            .collect();

        let grammar = result
            .grammar_errors
            .iter()
            .map(|err| GrammarCard {
                phrase: err.phrase.clone(),
                correction: err.correction.clone(),
                explanation: err.explanation.clone(),
                examples: err.examples.clone(),
                voice: Voice::Puck,
            })
            .collect();

        Self {
            score: result.overall_score,
            celebrate: result.overall_score >= PERFECT_SCORE_THRESHOLD,
            summary: result.summary.clone(),
            transcription: result.transcription.clone(),
            words,
            grammar,
            progress: ProgressView::from_stats(stats),
            badges: badge_shelf(stats),
            update: update.cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Screen {
    Idle { progress: ProgressView },
    Recording { transcript: String },
    Analyzing { transcript: String },
    Result(Box<ResultView>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenView {
    pub state: SessionState,
    pub screen: Screen,
    pub error: Option<String>,
}

impl ScreenView {
    pub fn build(snapshot: &SessionSnapshot, stats: &UserStats, word_voice: Voice) -> Self {
        let screen = match (snapshot.state, snapshot.result.as_deref()) {
            (SessionState::Recording, _) => Screen::Recording {
                transcript: snapshot.transcript.clone(),
            },
            (SessionState::Analyzing, _) => Screen::Analyzing {
                transcript: snapshot.transcript.clone(),
            },
            (SessionState::Result, Some(result)) => Screen::Result(Box::new(ResultView::build(
                result,
                stats,
                snapshot.update.as_ref(),
                word_voice,
            ))),
            _ => Screen::Idle {
                progress: ProgressView::from_stats(stats),
            },
        };

        Self {
            state: snapshot.state,
            screen,
            error: snapshot.error.clone(),
        }
    }
}

/// Ledger summary for the header and badge shelf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub stats: UserStats,
    pub progress: ProgressView,
    pub badges: Vec<BadgeView>,
}

impl StatsView {
    pub fn build(stats: &UserStats) -> Self {
        Self {
            stats: stats.clone(),
            progress: ProgressView::from_stats(stats),
            badges: badge_shelf(stats),
        }
    }
}
