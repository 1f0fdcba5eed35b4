//! Canonical affection scale, level bands and stage labels.
//!
//! All thresholds live here. Points are clamped to
//! `[MIN_AFFECTION, MAX_AFFECTION]` before they are ever persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BondError;

// ============================================================================
// Thresholds
// ============================================================================

pub const MIN_AFFECTION: i64 = -100;
pub const MAX_AFFECTION: i64 = 5000;

/// At or below this the relationship is BROKEN.
pub const BROKEN_THRESHOLD: i64 = -10;

/// Upper edge of the rescue band `(BROKEN_THRESHOLD, RESCUE_THRESHOLD]`.
pub const RESCUE_THRESHOLD: i64 = -5;

/// Points needed to unlock the private-messaging surface.
pub const PHONE_UNLOCK_THRESHOLD: i64 = 101;

/// Inclusive ceilings of levels 0..=3, ascending. Level 4 takes everything above.
const LEVEL_CEILINGS: [i64; 4] = [10, 100, 1000, 3000];

const LEVEL_NAMES: [&str; 5] = ["STRANGER", "ACQUAINTANCE", "CRUSH", "DATING", "COMMITTED"];
const LEVEL_EMOJIS: [&str; 5] = ["🙂", "😊", "🤝", "💖", "💍"];
const BROKEN_EMOJI: &str = "💔";

// ============================================================================
// Intimacy level
// ============================================================================

/// Discrete level 0..=4 derived from affection points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct IntimacyLevel(u8);

impl IntimacyLevel {
    pub const MAX: IntimacyLevel = IntimacyLevel(4);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX.0).then_some(IntimacyLevel(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        LEVEL_NAMES[self.0 as usize]
    }

    pub fn emoji(&self) -> &'static str {
        LEVEL_EMOJIS[self.0 as usize]
    }
}

impl TryFrom<u8> for IntimacyLevel {
    type Error = BondError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        IntimacyLevel::new(value)
            .ok_or_else(|| BondError::validation("intimacy_level", format!("{value} is outside 0..=4")))
    }
}

impl From<IntimacyLevel> for u8 {
    fn from(level: IntimacyLevel) -> u8 {
        level.0
    }
}

impl fmt::Display for IntimacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

// ============================================================================
// Stage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Stranger,
    Acquaintance,
    Crush,
    Dating,
    Committed,
    /// Failure classification, entered through `BROKEN_THRESHOLD` rather than the level table.
    Broken,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Stranger,
        Stage::Acquaintance,
        Stage::Crush,
        Stage::Dating,
        Stage::Committed,
        Stage::Broken,
    ];

    pub fn from_level(level: IntimacyLevel) -> Self {
        match level.value() {
            0 => Stage::Stranger,
            1 => Stage::Acquaintance,
            2 => Stage::Crush,
            3 => Stage::Dating,
            _ => Stage::Committed,
        }
    }

    /// Stage a given point value resolves to, BROKEN included.
    pub fn for_points(points: i64) -> Self {
        if is_broken(points) {
            Stage::Broken
        } else {
            Stage::from_level(level_for(points))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Stranger => "STRANGER",
            Stage::Acquaintance => "ACQUAINTANCE",
            Stage::Crush => "CRUSH",
            Stage::Dating => "DATING",
            Stage::Committed => "COMMITTED",
            Stage::Broken => "BROKEN",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Stage::Broken => BROKEN_EMOJI,
            Stage::Stranger => LEVEL_EMOJIS[0],
            Stage::Acquaintance => LEVEL_EMOJIS[1],
            Stage::Crush => LEVEL_EMOJIS[2],
            Stage::Dating => LEVEL_EMOJIS[3],
            Stage::Committed => LEVEL_EMOJIS[4],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = BondError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| BondError::validation("stage", format!("unknown stage {s:?}")))
    }
}

// ============================================================================
// Resolvers
// ============================================================================

/// Level for a point value. Monotonic non-decreasing in `points`.
pub fn level_for(points: i64) -> IntimacyLevel {
    let idx = LEVEL_CEILINGS
        .iter()
        .position(|ceiling| points <= *ceiling)
        .unwrap_or(LEVEL_CEILINGS.len());
    IntimacyLevel(idx as u8)
}

pub fn is_broken(points: i64) -> bool {
    points <= BROKEN_THRESHOLD
}

/// True inside the rescue band. Whether a rescue is actually *triggered*
/// also depends on the persisted latch; see `transition::detect`.
pub fn is_rescue_band(points: i64) -> bool {
    points <= RESCUE_THRESHOLD && points > BROKEN_THRESHOLD
}

pub fn clamp_points(points: i64) -> i64 {
    points.clamp(MIN_AFFECTION, MAX_AFFECTION)
}

pub fn phone_unlock_reached(points: i64) -> bool {
    points >= PHONE_UNLOCK_THRESHOLD
}
