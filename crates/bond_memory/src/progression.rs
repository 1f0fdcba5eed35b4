//! Affection progression - turns one classified turn into a persisted state change.
//!
//! Every update is a single read-modify-write inside the store's transaction:
//! the delta is drawn against the level *as read in that transaction*, and the
//! one-shot events are derived from the row before and after that same write.
//! Concurrent updates of one pair therefore serialize, and a crossing is
//! reported by exactly one caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bond_core::{
    current_time, detect, is_broken, mutator, points_delta, AuditSink, BondError, HistoryRecord,
    IntimacyLevel, PairKey, RandomSource, RelationshipState, RelationshipStore, Sentiment, Stage,
    ThreadRandom,
};
use chrono::{DateTime, Utc};

/// Default page size for history reads.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Outcome of one sentiment-driven update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub affection_points: i64,
    /// Drawn delta before clamping.
    pub points_delta: i64,
    pub intimacy_level: IntimacyLevel,
    pub level_name: String,
    pub stage: Stage,
    pub level_changed: bool,
    pub old_level: IntimacyLevel,
    pub is_broken: bool,
    pub rescue_plan_triggered: bool,
    pub phone_unlocked: bool,
    pub phone_just_unlocked: bool,
    pub message_count: i64,
}

pub struct AffectionUpdateService {
    store: Arc<dyn RelationshipStore>,
    audit: Option<Arc<dyn AuditSink>>,
    random: Arc<dyn RandomSource>,
    record_message_content: bool,
}

impl AffectionUpdateService {
    /// Service with the thread RNG and no audit trail.
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self {
            store,
            audit: None,
            random: Arc::new(ThreadRandom),
            record_message_content: true,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Whether audit records keep the raw message text.
    pub fn record_message_content(mut self, enabled: bool) -> Self {
        self.record_message_content = enabled;
        self
    }

    /// Apply one classified turn to the pair's relationship.
    pub async fn update(
        &self,
        key: &PairKey,
        sentiment: Sentiment,
        message: Option<&str>,
    ) -> Result<UpdateResult, BondError> {
        let now = current_time();
        let random = self.random.as_ref();
        let mut drawn = 0i64;
        let drawn_slot = &mut drawn;

        let change = self
            .store
            .atomic_update(
                key,
                mutator(move |state| {
                    let delta = points_delta(sentiment, state.intimacy_level, random);
                    *drawn_slot = delta;
                    apply_turn(state, delta, now);
                    Ok(())
                }),
            )
            .await?;

        let before = &change.before;
        let after = &change.after;
        let transition = detect(&before.snapshot(), &after.snapshot());

        if change.created {
            tracing::debug!("First contact for {}, relationship {} created", key, after.id);
        }
        if transition.level_changed {
            tracing::info!(
                "Level changed for {}: {} → {} (points {} → {})",
                key,
                before.intimacy_level,
                after.intimacy_level,
                before.affection_points,
                after.affection_points
            );
        }
        if transition.phone_just_unlocked {
            tracing::info!("Phone unlocked for {} at {} points", key, after.affection_points);
        }
        if transition.rescue_just_triggered {
            tracing::info!("Rescue plan triggered for {} at {} points", key, after.affection_points);
        }
        if after.stage == Stage::Broken && before.stage != Stage::Broken {
            tracing::warn!("Relationship {} is BROKEN ({} points)", key, after.affection_points);
        }
        tracing::debug!(
            "Affection update {} sentiment={} delta={:+} points={} level={} stage={}",
            key,
            sentiment,
            drawn,
            after.affection_points,
            after.intimacy_level.value(),
            after.stage
        );

        self.record_history(before, after, sentiment, drawn, message, now).await;

        Ok(UpdateResult {
            affection_points: after.affection_points,
            points_delta: drawn,
            intimacy_level: after.intimacy_level,
            level_name: after.intimacy_level.name().to_string(),
            stage: after.stage,
            level_changed: transition.level_changed,
            old_level: before.intimacy_level,
            is_broken: is_broken(after.affection_points),
            rescue_plan_triggered: transition.rescue_just_triggered,
            phone_unlocked: after.phone_unlocked,
            phone_just_unlocked: transition.phone_just_unlocked,
            message_count: after.message_count,
        })
    }

    /// Audit trail for a pair, newest first. Empty when the pair was never seen.
    pub async fn history(&self, key: &PairKey, limit: u32) -> Result<Vec<HistoryRecord>, BondError> {
        let Some(audit) = &self.audit else {
            return Ok(Vec::new());
        };
        let Some(state) = self.store.find(key).await? else {
            return Ok(Vec::new());
        };
        audit
            .recent(state.id, limit)
            .await
            .map_err(|e| BondError::StoreTransactionFailed(format!("read history for {key}: {e:#}")))
    }

    /// Best effort: a failed append is logged and never fails the update.
    async fn record_history(
        &self,
        before: &RelationshipState,
        after: &RelationshipState,
        sentiment: Sentiment,
        delta: i64,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let record = HistoryRecord {
            id: 0,
            relationship_id: after.id,
            points_delta: delta,
            sentiment,
            old_level: before.intimacy_level,
            new_level: after.intimacy_level,
            message_content: message
                .filter(|_| self.record_message_content)
                .map(str::to_string),
            created_at: now,
        };
        if let Err(e) = audit.append(&record).await {
            tracing::warn!("Failed to append affection history for relationship {}: {:#}", after.id, e);
        }
    }
}

/// Pure state step for one turn. Latches are only ever set here, never cleared.
pub(crate) fn apply_turn(state: &mut RelationshipState, delta: i64, now: DateTime<Utc>) {
    let before = state.snapshot();
    let old_stage = state.stage;

    state.set_points(state.affection_points.saturating_add(delta));
    state.stage = if is_broken(state.affection_points) {
        Stage::Broken
    } else {
        Stage::from_level(state.intimacy_level)
    };

    let transition = detect(&before, &state.snapshot());
    if transition.rescue_just_triggered {
        state.rescue_triggered = true;
    }
    if transition.phone_just_unlocked {
        state.phone_unlocked = true;
    }

    state.message_count += 1;
    state.last_active_at = now;
    state.updated_at = now;
    if state.stage != old_stage {
        state.last_stage_change_at = now.timestamp();
    }
}
