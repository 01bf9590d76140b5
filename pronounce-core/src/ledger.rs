//! Gamification ledger: XP, levels, practice count and badges
//!
//! All mutation goes through [`apply_analysis`], a pure function over the current
//! stats and one analysis result. [`Ledger`] owns the process-wide copy and writes
//! every update through a [`LedgerStore`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{BadgeId, level_for_xp};
use crate::error::Result;
use crate::storage::{LEDGER_KEY, Storage};
use crate::types::{AnalysisResult, UserStats};

/// Score at or above which `perfect_80` unlocks
pub const PERFECT_SCORE_THRESHOLD: u32 = 80;

/// Practice count at which `streak_3` unlocks
pub const STREAK_PRACTICES: u32 = 3;

/// Outcome of folding one analysis into the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpdate {
    pub stats: UserStats,
    pub xp_gained: u32,
    pub leveled_up: bool,
    /// Badges added by this update, in catalog order
    pub unlocked: Vec<BadgeId>,
}

/// Fold one completed analysis into the stats
pub fn apply_analysis(stats: &UserStats, result: &AnalysisResult) -> LedgerUpdate {
    let xp = stats.xp.saturating_add(result.overall_score);
    let level = level_for_xp(xp);
    let total_practices = stats.total_practices.saturating_add(1);

    let earned = [
        (BadgeId::FirstStep, total_practices == 1),
        (
            BadgeId::Perfect80,
            result.overall_score >= PERFECT_SCORE_THRESHOLD,
        ),
        (BadgeId::Streak3, total_practices >= STREAK_PRACTICES),
        (BadgeId::GrammarGod, result.grammar_errors.is_empty()),
    ];

    let mut badges = stats.badges.clone();
    let mut unlocked = Vec::new();
    for (id, condition) in earned {
        if condition && badges.insert(id) {
            unlocked.push(id);
        }
    }

    LedgerUpdate {
        stats: UserStats {
            xp,
            level,
            total_practices,
            badges,
        },
        xp_gained: result.overall_score,
        leveled_up: level > stats.level,
        unlocked,
    }
}

/// Durable slot holding the ledger record
pub trait LedgerStore: Send + Sync {
    /// Load the record, falling back to zero stats when absent or unreadable
    fn load(&self) -> UserStats;

    /// Overwrite the whole record
    fn save(&self, stats: &UserStats) -> Result<()>;
}

impl LedgerStore for Storage {
    fn load(&self) -> UserStats {
        let raw = match self.get_setting(LEDGER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return UserStats::default(),
            Err(e) => {
                warn!("Failed to read ledger, starting fresh: {}", e);
                return UserStats::default();
            }
        };

        match serde_json::from_str::<UserStats>(&raw) {
            Ok(mut stats) => {
                stats.level = level_for_xp(stats.xp);
                stats
            }
            Err(e) => {
                warn!("Ignoring unreadable ledger record: {}", e);
                UserStats::default()
            }
        }
    }

    fn save(&self, stats: &UserStats) -> Result<()> {
        let json = serde_json::to_string(stats)?;
        self.set_setting(LEDGER_KEY, &json)
    }
}

/// Process-wide learner progress
pub struct Ledger {
    stats: RwLock<UserStats>,
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    /// Load the persisted record once
    pub fn load(store: Arc<dyn LedgerStore>) -> Self {
        let stats = store.load();
        info!(
            xp = stats.xp,
            level = stats.level,
            practices = stats.total_practices,
            "Ledger loaded"
        );
        Self {
            stats: RwLock::new(stats),
            store,
        }
    }

    /// Snapshot of the current stats
    pub fn stats(&self) -> UserStats {
        self.stats.read().clone()
    }

    /// Apply a completed analysis and persist the new record
    pub fn record(&self, result: &AnalysisResult) -> LedgerUpdate {
        let update = {
            let mut stats = self.stats.write();
            let update = apply_analysis(&stats, result);
            *stats = update.stats.clone();
            update
        };

        if let Err(e) = self.store.save(&update.stats) {
            error!("Failed to persist ledger: {}", e);
        }

        debug!(
            xp = update.stats.xp,
            level = update.stats.level,
            unlocked = ?update.unlocked,
            "Ledger updated"
        );
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GrammarError;

    fn result(score: u32, grammar_errors: usize) -> AnalysisResult {
        AnalysisResult {
            overall_score: score,
            transcription: "hello world".to_string(),
            words: vec![],
            grammar_errors: (0..grammar_errors)
                .map(|i| GrammarError {
                    phrase: format!("phrase {i}"),
                    explanation: String::new(),
                    correction: String::new(),
                    examples: vec![],
                })
                .collect(),
            summary: String::new(),
        }
    }

    #[test]
    fn test_first_practice_high_score() {
        let update = apply_analysis(&UserStats::default(), &result(85, 0));

        assert_eq!(update.stats.xp, 85);
        assert_eq!(update.stats.level, 1);
        assert_eq!(update.stats.total_practices, 1);
        assert_eq!(
            update.unlocked,
            vec![BadgeId::FirstStep, BadgeId::Perfect80, BadgeId::GrammarGod]
        );
        assert!(!update.leveled_up);
    }

    #[test]
    fn test_third_practice_unlocks_streak_and_levels_up() {
        let first = apply_analysis(&UserStats::default(), &result(85, 0));
        let second = apply_analysis(&first.stats, &result(10, 2));
        let third = apply_analysis(&second.stats, &result(10, 1));

        assert_eq!(third.stats.total_practices, 3);
        assert_eq!(third.stats.xp, 105);
        assert_eq!(third.stats.level, 2);
        assert!(third.leveled_up);
        assert_eq!(third.unlocked, vec![BadgeId::Streak3]);
        assert!(third.stats.has_badge(BadgeId::FirstStep));
    }

    #[test]
    fn test_first_step_not_awarded_late() {
        let stats = UserStats {
            xp: 40,
            level: 1,
            total_practices: 1,
            badges: Default::default(),
        };
        let update = apply_analysis(&stats, &result(20, 1));
        assert!(!update.stats.has_badge(BadgeId::FirstStep));
    }

    #[test]
    fn test_existing_badges_not_reported_again() {
        let first = apply_analysis(&UserStats::default(), &result(90, 0));
        let second = apply_analysis(&first.stats, &result(95, 0));
        assert!(second.unlocked.is_empty());
        assert_eq!(second.stats.badges, first.stats.badges);
    }

    #[test]
    fn test_ledger_record_persists() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let ledger = Ledger::load(storage.clone());

        ledger.record(&result(50, 0));

        let reloaded = storage.load();
        assert_eq!(reloaded, ledger.stats());
        assert_eq!(reloaded.xp, 50);
    }

    #[test]
    fn test_load_rederives_level() {
        let storage = Storage::in_memory().unwrap();
        storage
            .set_setting(
                LEDGER_KEY,
                r#"{"xp":250,"level":1,"totalPractices":4,"badges":[]}"#,
            )
            .unwrap();
        assert_eq!(storage.load().level, 3);
    }

    #[test]
    fn test_load_unreadable_record() {
        let storage = Storage::in_memory().unwrap();
        storage.set_setting(LEDGER_KEY, "not json").unwrap();
        assert_eq!(storage.load(), UserStats::default());
    }
}
