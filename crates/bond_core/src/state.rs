//! Persisted relationship state and its audit trail.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{require_id, BondError};
use crate::levels::{clamp_points, level_for, IntimacyLevel, Stage};
use crate::sentiment::Sentiment;
use crate::transition::Snapshot;

/// Momentum a force-set stage starts from.
pub const PRESET_MOMENTUM_BASELINE: f64 = 0.3;

/// Wall-clock time at the precision the store persists (milliseconds).
pub fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ============================================================================
// Pair key
// ============================================================================

/// Composite key: exactly one relationship row exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub subject_id: String,
    pub counterpart_id: String,
}

impl PairKey {
    pub fn new(subject_id: impl Into<String>, counterpart_id: impl Into<String>) -> Result<Self, BondError> {
        let subject_id = subject_id.into();
        let counterpart_id = counterpart_id.into();
        require_id("subject_id", &subject_id)?;
        require_id("counterpart_id", &counterpart_id)?;
        Ok(Self {
            subject_id,
            counterpart_id,
        })
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.subject_id, self.counterpart_id)
    }
}

// ============================================================================
// Relationship state
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipState {
    pub id: Uuid,
    pub subject_id: String,
    pub counterpart_id: String,

    /// Signed cumulative score in `[MIN_AFFECTION, MAX_AFFECTION]`.
    pub affection_points: i64,
    /// Always `level_for(affection_points)`, except after a debug `SetStage`.
    pub intimacy_level: IntimacyLevel,
    pub stage: Stage,

    /// One-way latch, cleared only by an explicit relationship reset.
    pub phone_unlocked: bool,
    /// One-way latch for the rescue prompt.
    pub rescue_triggered: bool,

    // Decay/momentum accumulators. Persisted and reset, not yet read by any rule.
    pub trust_debt: f64,
    pub emotional_momentum: f64,
    pub apology_count: i64,

    pub message_count: i64,
    pub last_active_at: DateTime<Utc>,
    /// Unix seconds of the last stage change, 0 if never.
    pub last_stage_change_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipState {
    /// Zeroed state for a pair seen for the first time.
    pub fn new(key: &PairKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: key.subject_id.clone(),
            counterpart_id: key.counterpart_id.clone(),
            affection_points: 0,
            intimacy_level: IntimacyLevel::default(),
            stage: Stage::Stranger,
            phone_unlocked: false,
            rescue_triggered: false,
            trust_debt: 0.0,
            emotional_momentum: 0.0,
            apology_count: 0,
            message_count: 0,
            last_active_at: now,
            last_stage_change_at: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey {
            subject_id: self.subject_id.clone(),
            counterpart_id: self.counterpart_id.clone(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(self)
    }

    pub fn is_level_consistent(&self) -> bool {
        self.intimacy_level == level_for(self.affection_points)
    }

    /// Clamp and store points, keeping the level in step.
    pub fn set_points(&mut self, points: i64) {
        self.affection_points = clamp_points(points);
        self.intimacy_level = level_for(self.affection_points);
    }

    /// Force a stage preset and restart the accumulators from their baselines.
    pub fn apply_preset(&mut self, preset: StagePreset) {
        self.set_points(preset.points);
        self.stage = preset.stage;
        self.last_stage_change_at = 0;
        self.trust_debt = 0.0;
        self.emotional_momentum = PRESET_MOMENTUM_BASELINE;
        self.apology_count = 0;
    }

    /// Back to a fresh STRANGER, keeping identity and timestamps of creation.
    pub fn reset_relationship(&mut self) {
        self.set_points(0);
        self.stage = Stage::Stranger;
        self.message_count = 0;
        self.last_stage_change_at = 0;
        self.trust_debt = 0.0;
        self.emotional_momentum = 0.0;
        self.apology_count = 0;
        self.phone_unlocked = false;
        self.rescue_triggered = false;
    }
}

// ============================================================================
// Stage presets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePreset {
    pub stage: Stage,
    pub points: i64,
}

impl StagePreset {
    /// Documented point value for each reachable stage. BROKEN has no preset.
    pub fn for_stage(stage: Stage) -> Option<Self> {
        let points = match stage {
            Stage::Stranger => 5,
            Stage::Acquaintance => 50,
            Stage::Crush => 500,
            Stage::Dating => 2000,
            Stage::Committed => 4000,
            Stage::Broken => return None,
        };
        Some(Self { stage, points })
    }

    pub fn parse(name: &str) -> Result<Self, BondError> {
        let stage: Stage = name
            .parse()
            .map_err(|_| BondError::validation("target", format!("unknown preset {name:?}")))?;
        Self::for_stage(stage)
            .ok_or_else(|| BondError::validation("target", format!("no preset for {stage}")))
    }
}

// ============================================================================
// History
// ============================================================================

/// Append-only audit record of one sentiment-driven update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// 0 until the sink assigns one.
    pub id: i64,
    pub relationship_id: Uuid,
    pub points_delta: i64,
    pub sentiment: Sentiment,
    pub old_level: IntimacyLevel,
    pub new_level: IntimacyLevel,
    pub message_content: Option<String>,
    pub created_at: DateTime<Utc>,
}
