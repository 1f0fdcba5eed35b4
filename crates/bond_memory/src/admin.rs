//! Direct manipulation of relationship rows for testing and ops.
//!
//! Goes through the same `atomic_update` as the sentiment path, so overrides
//! and live updates of one pair serialize against each other. Every action
//! keeps `intimacy_level == level_for(affection_points)` except [`AdminAction::SetStage`],
//! which writes the stage as given and leaves points and level alone. Use it to
//! put a row into a state the normal path could never produce.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bond_core::{
    current_time, mutator, BondError, IntimacyLevel, PairKey, RelationshipState, RelationshipStore, Stage,
    StagePreset,
};

/// Multiplier applied to a raw `ApplyImpact` magnitude.
pub const IMPACT_SCALE: i64 = 3;

/// Hours back-dated by `SimulateTimeGap` when the caller gives none.
pub const DEFAULT_TIME_GAP_HOURS: u32 = 24;

/// Longest back-dating accepted: ten years.
pub const MAX_TIME_GAP_HOURS: u32 = 24 * 365 * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    /// Invariant-breaking: stage only, points and level untouched.
    SetStage(Stage),
    SetAffection(i64),
    ApplyImpact(i64),
    JumpTo(StagePreset),
    ResetRelationshipOnly,
    SimulateTimeGap { hours: u32 },
}

/// Loose request parameters, as sent to the dev endpoint or the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminParams {
    pub stage: Option<String>,
    pub affection: Option<i64>,
    pub impact: Option<i64>,
    pub target: Option<String>,
    pub hours: Option<u32>,
}

impl AdminAction {
    /// Resolve an action name plus its parameters. Missing parameters take the
    /// documented defaults; unknown names are rejected.
    pub fn from_request(action: &str, params: &AdminParams) -> Result<Self, BondError> {
        match action.trim() {
            "setStage" => {
                let stage = match params.stage.as_deref() {
                    Some(name) => name.parse()?,
                    None => Stage::Stranger,
                };
                Ok(AdminAction::SetStage(stage))
            }
            "setAffection" => Ok(AdminAction::SetAffection(params.affection.unwrap_or(0))),
            "applyImpact" => Ok(AdminAction::ApplyImpact(params.impact.unwrap_or(0))),
            "jumpTo" => {
                let target = params.target.as_deref().unwrap_or("STRANGER");
                Ok(AdminAction::JumpTo(StagePreset::parse(target)?))
            }
            "resetRelationshipOnly" => Ok(AdminAction::ResetRelationshipOnly),
            "simulateTimeGap" => {
                let hours = params.hours.unwrap_or(DEFAULT_TIME_GAP_HOURS);
                check_time_gap(hours)?;
                Ok(AdminAction::SimulateTimeGap { hours })
            }
            "" => Err(BondError::validation("action", "is required")),
            other => Err(BondError::validation("action", format!("unknown action {other:?}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminAction::SetStage(_) => "setStage",
            AdminAction::SetAffection(_) => "setAffection",
            AdminAction::ApplyImpact(_) => "applyImpact",
            AdminAction::JumpTo(_) => "jumpTo",
            AdminAction::ResetRelationshipOnly => "resetRelationshipOnly",
            AdminAction::SimulateTimeGap { .. } => "simulateTimeGap",
        }
    }

    fn apply(self, state: &mut RelationshipState, now: DateTime<Utc>) -> Result<(), BondError> {
        match self {
            AdminAction::SetStage(stage) => {
                state.stage = stage;
            }
            AdminAction::SetAffection(points) => {
                state.set_points(points);
            }
            AdminAction::ApplyImpact(impact) => {
                let scaled = impact.saturating_mul(IMPACT_SCALE);
                state.set_points(state.affection_points.saturating_add(scaled));
            }
            AdminAction::JumpTo(preset) => {
                state.apply_preset(preset);
            }
            AdminAction::ResetRelationshipOnly => {
                state.reset_relationship();
            }
            AdminAction::SimulateTimeGap { hours } => {
                check_time_gap(hours)?;
                state.last_active_at = Duration::try_hours(i64::from(hours))
                    .and_then(|gap| now.checked_sub_signed(gap))
                    .ok_or_else(|| BondError::validation("hours", format!("{hours} hours is out of range")))?;
                return Ok(());
            }
        }
        state.updated_at = now;
        Ok(())
    }
}

fn check_time_gap(hours: u32) -> Result<(), BondError> {
    if hours > MAX_TIME_GAP_HOURS {
        return Err(BondError::validation(
            "hours",
            format!("must be at most {MAX_TIME_GAP_HOURS} (got {hours})"),
        ));
    }
    Ok(())
}

/// Summary of the row after an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOutcome {
    pub action: String,
    pub affection_points: i64,
    pub intimacy_level: IntimacyLevel,
    pub stage: Stage,
    pub message_count: i64,
    pub phone_unlocked: bool,
    pub last_active_at: DateTime<Utc>,
}

pub struct AdministrativeOverride {
    store: Arc<dyn RelationshipStore>,
}

impl AdministrativeOverride {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, key: &PairKey, action: AdminAction) -> Result<AdminOutcome, BondError> {
        let now = current_time();
        let change = self
            .store
            .atomic_update(key, mutator(move |state| action.apply(state, now)))
            .await?;

        let after = change.after;
        tracing::info!(
            "Override {} on {}: points {} → {}, stage {} → {}",
            action.name(),
            key,
            change.before.affection_points,
            after.affection_points,
            change.before.stage,
            after.stage
        );
        if !after.is_level_consistent() {
            tracing::warn!(
                "Relationship {} left with level {} at {} points",
                key,
                after.intimacy_level.value(),
                after.affection_points
            );
        }

        Ok(AdminOutcome {
            action: action.name().to_string(),
            affection_points: after.affection_points,
            intimacy_level: after.intimacy_level,
            stage: after.stage,
            message_count: after.message_count,
            phone_unlocked: after.phone_unlocked,
            last_active_at: after.last_active_at,
        })
    }

    /// Debug only: breaks the level/stage relationship on purpose.
    pub async fn set_stage(&self, key: &PairKey, stage: Stage) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::SetStage(stage)).await
    }

    pub async fn set_affection(&self, key: &PairKey, points: i64) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::SetAffection(points)).await
    }

    pub async fn apply_impact(&self, key: &PairKey, impact: i64) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::ApplyImpact(impact)).await
    }

    pub async fn jump_to(&self, key: &PairKey, target: &str) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::JumpTo(StagePreset::parse(target)?)).await
    }

    pub async fn reset_relationship_only(&self, key: &PairKey) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::ResetRelationshipOnly).await
    }

    pub async fn simulate_time_gap(&self, key: &PairKey, hours: u32) -> Result<AdminOutcome, BondError> {
        self.apply(key, AdminAction::SimulateTimeGap { hours }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AdminParams {
        AdminParams::default()
    }

    #[test]
    fn test_from_request_defaults() {
        assert_eq!(
            AdminAction::from_request("setStage", &params()).unwrap(),
            AdminAction::SetStage(Stage::Stranger)
        );
        assert_eq!(
            AdminAction::from_request("setAffection", &params()).unwrap(),
            AdminAction::SetAffection(0)
        );
        assert_eq!(
            AdminAction::from_request("simulateTimeGap", &params()).unwrap(),
            AdminAction::SimulateTimeGap { hours: 24 }
        );
        match AdminAction::from_request("jumpTo", &params()).unwrap() {
            AdminAction::JumpTo(p) => assert_eq!(p.stage, Stage::Stranger),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_request_rejects_unknown_names() {
        let err = AdminAction::from_request("deleteEverything", &params()).unwrap_err();
        assert_eq!(err.field(), Some("action"));

        let bad_stage = AdminParams {
            stage: Some("SOULMATE".into()),
            ..params()
        };
        let err = AdminAction::from_request("setStage", &bad_stage).unwrap_err();
        assert_eq!(err.field(), Some("stage"));

        let bad_target = AdminParams {
            target: Some("BROKEN".into()),
            ..params()
        };
        let err = AdminAction::from_request("jumpTo", &bad_target).unwrap_err();
        assert_eq!(err.field(), Some("target"));
    }

    #[test]
    fn test_apply_impact_is_scaled_and_clamped() {
        let key = PairKey::new("u", "c").unwrap();
        let mut s = RelationshipState::new(&key, current_time());
        AdminAction::ApplyImpact(6).apply(&mut s, current_time()).unwrap();
        assert_eq!(s.affection_points, 18);
        assert_eq!(s.intimacy_level.value(), 1);

        AdminAction::ApplyImpact(i64::MIN).apply(&mut s, current_time()).unwrap();
        assert_eq!(s.affection_points, bond_core::MIN_AFFECTION);
        assert!(s.is_level_consistent());
    }

    #[test]
    fn test_set_affection_leaves_stage() {
        let key = PairKey::new("u", "c").unwrap();
        let mut s = RelationshipState::new(&key, current_time());
        AdminAction::SetAffection(2500).apply(&mut s, current_time()).unwrap();
        assert_eq!(s.intimacy_level.value(), 3);
        assert_eq!(s.stage, Stage::Stranger);
        assert!(s.is_level_consistent());
    }

    #[test]
    fn test_time_gap_touches_only_last_active() {
        let key = PairKey::new("u", "c").unwrap();
        let now = current_time();
        let mut s = RelationshipState::new(&key, now);
        let before = s.clone();
        AdminAction::SimulateTimeGap { hours: 48 }.apply(&mut s, now).unwrap();
        assert_eq!(s.last_active_at, now - Duration::hours(48));
        s.last_active_at = before.last_active_at;
        assert_eq!(s, before);
    }

    #[test]
    fn test_time_gap_out_of_range_is_rejected() {
        let huge = AdminParams {
            hours: Some(u32::MAX),
            ..params()
        };
        let err = AdminAction::from_request("simulateTimeGap", &huge).unwrap_err();
        assert_eq!(err.field(), Some("hours"));

        let edge = AdminParams {
            hours: Some(MAX_TIME_GAP_HOURS),
            ..params()
        };
        assert!(AdminAction::from_request("simulateTimeGap", &edge).is_ok());

        // Built directly, bypassing request parsing.
        let key = PairKey::new("u", "c").unwrap();
        let mut s = RelationshipState::new(&key, current_time());
        let before = s.clone();
        let err = AdminAction::SimulateTimeGap { hours: u32::MAX }
            .apply(&mut s, current_time())
            .unwrap_err();
        assert_eq!(err.field(), Some("hours"));
        assert_eq!(s, before);
    }
}
