//! Fixed badge and level catalogs

use serde::{Deserialize, Serialize};

/// XP needed to advance one level
pub const XP_PER_LEVEL: u32 = 100;

/// Identifier of an unlockable badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BadgeId {
    #[serde(rename = "first_step")]
    FirstStep,
    #[serde(rename = "perfect_80")]
    Perfect80,
    #[serde(rename = "streak_3")]
    Streak3,
    #[serde(rename = "grammar_god")]
    GrammarGod,
}

impl BadgeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstStep => "first_step",
            Self::Perfect80 => "perfect_80",
            Self::Streak3 => "streak_3",
            Self::GrammarGod => "grammar_god",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        BADGES.iter().map(|b| b.id).find(|b| b.as_str() == id)
    }

    /// Catalog entry for this badge
    pub fn badge(&self) -> &'static Badge {
        BADGES
            .iter()
            .find(|b| b.id == *self)
            .unwrap_or(&BADGES[0])
    }
}

/// A badge definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: BadgeId,
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub requirement: &'static str,
}

pub const BADGES: [Badge; 4] = [
    Badge {
        id: BadgeId::FirstStep,
        name: "First Step",
        icon: "🌱",
        color: "green",
        requirement: "Complete your first practice.",
    },
    Badge {
        id: BadgeId::Perfect80,
        name: "Elite Speaker",
        icon: "💎",
        color: "blue",
        requirement: "Get a score of 80% or higher.",
    },
    Badge {
        id: BadgeId::Streak3,
        name: "Consistency",
        icon: "🔥",
        color: "orange",
        requirement: "Practice 3 times in a row.",
    },
    Badge {
        id: BadgeId::GrammarGod,
        name: "Grammar Pro",
        icon: "📚",
        color: "purple",
        requirement: "Complete analysis with zero grammar errors.",
    },
];

/// A display tier; the authoritative level number comes from [`level_for_xp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub name: &'static str,
    pub min_xp: u32,
}

pub const LEVELS: [Level; 4] = [
    Level {
        name: "Beginner",
        min_xp: 0,
    },
    Level {
        name: "Improver",
        min_xp: 100,
    },
    Level {
        name: "Confident Speaker",
        min_xp: 300,
    },
    Level {
        name: "Fluent Master",
        min_xp: 700,
    },
];

/// Level number for an XP total
pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// Highest display tier whose threshold the XP total has reached
pub fn tier_for_xp(xp: u32) -> &'static Level {
    LEVELS
        .iter()
        .rev()
        .find(|level| xp >= level.min_xp)
        .unwrap_or(&LEVELS[0])
}

/// XP earned inside the current level
pub fn xp_into_level(xp: u32) -> u32 {
    xp % XP_PER_LEVEL
}
