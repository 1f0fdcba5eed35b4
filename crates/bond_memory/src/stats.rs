//! Read-side projection of a relationship, with the lazy phone latch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bond_core::levels::phone_unlock_reached;
use bond_core::{is_broken, mutator, BondError, IntimacyLevel, PairKey, RelationshipState, RelationshipStore, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipStats {
    pub exists: bool,
    pub affection_points: i64,
    pub intimacy_level: IntimacyLevel,
    pub level_name: String,
    pub level_emoji: String,
    pub stage: Stage,
    pub is_broken: bool,
    pub rescue_plan_triggered: bool,
    pub phone_unlocked: bool,
    pub phone_just_unlocked: bool,
    pub message_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RelationshipStats {
    /// What a never-seen pair looks like.
    pub fn missing() -> Self {
        let level = IntimacyLevel::default();
        Self {
            exists: false,
            affection_points: 0,
            intimacy_level: level,
            level_name: level.name().to_string(),
            level_emoji: level.emoji().to_string(),
            stage: Stage::Stranger,
            is_broken: false,
            rescue_plan_triggered: false,
            phone_unlocked: false,
            phone_just_unlocked: false,
            message_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    fn from_state(state: &RelationshipState, phone_just_unlocked: bool) -> Self {
        Self {
            exists: true,
            affection_points: state.affection_points,
            intimacy_level: state.intimacy_level,
            level_name: state.intimacy_level.name().to_string(),
            level_emoji: state.intimacy_level.emoji().to_string(),
            stage: state.stage,
            is_broken: is_broken(state.affection_points),
            rescue_plan_triggered: state.rescue_triggered,
            phone_unlocked: state.phone_unlocked,
            phone_just_unlocked,
            message_count: state.message_count,
            created_at: Some(state.created_at),
            updated_at: Some(state.updated_at),
        }
    }
}

pub struct StatsQuery {
    store: Arc<dyn RelationshipStore>,
}

impl StatsQuery {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self { store }
    }

    /// Current stats for a pair. Never creates a row.
    ///
    /// A row whose points crossed the unlock threshold without the latch being
    /// persisted (e.g. after an override) gets the latch written here, at most once.
    pub async fn get(&self, key: &PairKey) -> Result<RelationshipStats, BondError> {
        let Some(state) = self.store.find(key).await? else {
            tracing::debug!("No relationship for {}, returning defaults", key);
            return Ok(RelationshipStats::missing());
        };

        if state.phone_unlocked || !phone_unlock_reached(state.affection_points) {
            return Ok(RelationshipStats::from_state(&state, false));
        }

        // Re-check on the row read inside the transaction: a concurrent
        // update or stats call may have latched it already.
        let mut flipped = false;
        let flipped_slot = &mut flipped;
        let change = self
            .store
            .update_existing(
                key,
                mutator(move |row| {
                    if !row.phone_unlocked && phone_unlock_reached(row.affection_points) {
                        row.phone_unlocked = true;
                        *flipped_slot = true;
                    }
                    Ok(())
                }),
            )
            .await?;
        let Some(change) = change else {
            tracing::debug!("Relationship {} disappeared before the latch write", key);
            return Ok(RelationshipStats::missing());
        };

        if flipped {
            tracing::info!(
                "Phone unlocked for {} on read at {} points",
                key,
                change.after.affection_points
            );
        }
        Ok(RelationshipStats::from_state(&change.after, flipped))
    }
}
