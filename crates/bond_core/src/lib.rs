pub mod config;
pub mod delta;
pub mod error;
pub mod levels;
pub mod sentiment;
pub mod state;
pub mod transition;

pub use config::BondConfig;
pub use delta::{points_delta, points_range, FixedDraw, PointsRange, RandomSource, SeededRandom, ThreadRandom};
pub use error::BondError;
pub use levels::{
    is_broken, is_rescue_band, level_for, IntimacyLevel, Stage, BROKEN_THRESHOLD, MAX_AFFECTION,
    MIN_AFFECTION, PHONE_UNLOCK_THRESHOLD, RESCUE_THRESHOLD,
};
pub use sentiment::Sentiment;
pub use state::{current_time, HistoryRecord, PairKey, RelationshipState, StagePreset};
pub use transition::{detect, Snapshot, Transition};

use async_trait::async_trait;

/// Mutation applied to the freshly read row inside the store's transaction.
/// Returning an error aborts the transaction with nothing written.
pub type Mutator<'a> = Box<dyn FnOnce(&mut RelationshipState) -> Result<(), BondError> + Send + 'a>;

/// Box a closure as a [`Mutator`].
pub fn mutator<'a, F>(f: F) -> Mutator<'a>
where
    F: FnOnce(&mut RelationshipState) -> Result<(), BondError> + Send + 'a,
{
    Box::new(f)
}

/// Row as read inside a transaction and as written by it.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub before: RelationshipState,
    pub after: RelationshipState,
    /// The row did not exist before this transaction.
    pub created: bool,
}

/// Persistent relationship rows keyed by `(subject_id, counterpart_id)`.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Read without creating.
    async fn find(&self, key: &PairKey) -> Result<Option<RelationshipState>, BondError>;

    /// Idempotent under concurrent first contact.
    async fn get_or_create(&self, key: &PairKey) -> Result<RelationshipState, BondError>;

    /// Get-or-create, run `mutator` on the row and write it back, all in one
    /// transaction. Concurrent calls for the same pair are serialized.
    async fn atomic_update(&self, key: &PairKey, mutator: Mutator<'_>) -> Result<StateChange, BondError>;

    /// Like `atomic_update`, but never creates: `None` when the pair has no row,
    /// with nothing written.
    async fn update_existing(&self, key: &PairKey, mutator: Mutator<'_>)
        -> Result<Option<StateChange>, BondError>;
}

/// Append-only audit trail. Append failures are the caller's to swallow.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Store a record, returning the id it was assigned.
    async fn append(&self, record: &HistoryRecord) -> anyhow::Result<i64>;

    /// Most recent records for one relationship, newest first.
    async fn recent(&self, relationship_id: uuid::Uuid, limit: u32) -> anyhow::Result<Vec<HistoryRecord>>;
}
