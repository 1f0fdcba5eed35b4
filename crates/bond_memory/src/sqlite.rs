use anyhow::{Context, Result};
use async_trait::async_trait;
use bond_core::config::StoreConfig;
use bond_core::{
    current_time, AuditSink, BondError, HistoryRecord, IntimacyLevel, Mutator, PairKey,
    RelationshipState, RelationshipStore, Sentiment, Stage, StateChange,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const RELATIONSHIP_COLUMNS: &str = "id, subject_id, counterpart_id, affection_points, intimacy_level, stage, \
     phone_unlocked, rescue_triggered, trust_debt, emotional_momentum, apology_count, \
     message_count, last_active_at, last_stage_change_at, created_at, updated_at";

/// SQLite-backed relationship rows plus the affection audit trail.
#[derive(Clone)]
pub struct SqliteBondStore {
    pool: Pool<Sqlite>,
}

impl SqliteBondStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let config = StoreConfig {
            db_path: db_path.as_ref().display().to_string(),
            ..StoreConfig::default()
        };
        Self::with_config(&config).await
    }

    pub async fn with_config(config: &StoreConfig) -> Result<Self> {
        let in_memory = config.db_path == ":memory:";
        let options = (if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .context("Failed to build in-memory SQLite options")?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.db_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        })
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        // Each connection to `:memory:` is its own database: keep exactly one, forever.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database at {}", config.db_path))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!("Relationship store ready at {}", config.db_path);
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relationships (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                counterpart_id TEXT NOT NULL,
                affection_points INTEGER NOT NULL DEFAULT 0,
                intimacy_level INTEGER NOT NULL DEFAULT 0,
                stage TEXT NOT NULL DEFAULT 'STRANGER',
                phone_unlocked INTEGER NOT NULL DEFAULT 0,
                rescue_triggered INTEGER NOT NULL DEFAULT 0,
                trust_debt REAL NOT NULL DEFAULT 0,
                emotional_momentum REAL NOT NULL DEFAULT 0,
                apology_count INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                last_active_at INTEGER NOT NULL,
                last_stage_change_at INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (subject_id, counterpart_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create relationships table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS affection_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                relationship_id TEXT NOT NULL,
                points_delta INTEGER NOT NULL,
                sentiment TEXT NOT NULL,
                old_level INTEGER NOT NULL,
                new_level INTEGER NOT NULL,
                message_content TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY(relationship_id) REFERENCES relationships(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create affection_history table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_affection_history_relationship ON affection_history(relationship_id, id)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create affection_history index")?;

        Ok(())
    }

    /// Number of relationship rows, across all pairs.
    pub async fn count_relationships(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM relationships")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count relationships")?;
        Ok(row.get("n"))
    }

    /// Close the pool. Subsequent calls fail with `StoreUnavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RelationshipStore for SqliteBondStore {
    async fn find(&self, key: &PairKey) -> Result<Option<RelationshipState>, BondError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_error("acquire connection", e))?;
        fetch_row(&mut conn, key).await
    }

    async fn get_or_create(&self, key: &PairKey) -> Result<RelationshipState, BondError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        let created = insert_if_absent(&mut tx, &RelationshipState::new(key, current_time())).await?;
        let state = fetch_row(&mut tx, key)
            .await?
            .ok_or_else(|| BondError::StoreTransactionFailed(format!("row for {key} vanished after insert")))?;

        tx.commit().await.map_err(|e| store_error("commit get_or_create", e))?;
        if created {
            tracing::debug!("Created relationship {} for {}", state.id, key);
        }
        Ok(state)
    }

    async fn atomic_update(&self, key: &PairKey, mutator: Mutator<'_>) -> Result<StateChange, BondError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        // The first statement writes, so SQLite hands this transaction the write
        // lock before the row is read. Concurrent updates of a pair queue here.
        let created = insert_if_absent(&mut tx, &RelationshipState::new(key, current_time())).await?;
        let before = fetch_row(&mut tx, key)
            .await?
            .ok_or_else(|| BondError::StoreTransactionFailed(format!("row for {key} vanished after insert")))?;

        let mut after = before.clone();
        // Dropping `tx` on error rolls back, including the insert above.
        mutator(&mut after)?;
        write_row(&mut tx, &after).await?;

        tx.commit().await.map_err(|e| store_error("commit atomic_update", e))?;
        Ok(StateChange {
            before,
            after,
            created,
        })
    }

    async fn update_existing(
        &self,
        key: &PairKey,
        mutator: Mutator<'_>,
    ) -> Result<Option<StateChange>, BondError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin transaction", e))?;

        // Touch the row first so the write lock is held before the read, as above.
        let touched = sqlx::query("UPDATE relationships SET id = id WHERE subject_id = ? AND counterpart_id = ?")
            .bind(&key.subject_id)
            .bind(&key.counterpart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("lock relationship", e))?;
        if touched.rows_affected() == 0 {
            tracing::debug!("No relationship for {}, nothing updated", key);
            return Ok(None);
        }

        let before = fetch_row(&mut tx, key)
            .await?
            .ok_or_else(|| BondError::StoreTransactionFailed(format!("row for {key} vanished under lock")))?;
        let mut after = before.clone();
        mutator(&mut after)?;
        write_row(&mut tx, &after).await?;

        tx.commit().await.map_err(|e| store_error("commit update_existing", e))?;
        Ok(Some(StateChange {
            before,
            after,
            created: false,
        }))
    }
}

#[async_trait]
impl AuditSink for SqliteBondStore {
    async fn append(&self, record: &HistoryRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO affection_history \
             (relationship_id, points_delta, sentiment, old_level, new_level, message_content, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.relationship_id.to_string())
        .bind(record.points_delta)
        .bind(record.sentiment.as_str())
        .bind(i64::from(record.old_level.value()))
        .bind(i64::from(record.new_level.value()))
        .bind(&record.message_content)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert affection history record")?;

        let id = result.last_insert_rowid();
        tracing::trace!("Affection history #{} recorded for {}", id, record.relationship_id);
        Ok(id)
    }

    async fn recent(&self, relationship_id: Uuid, limit: u32) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            "SELECT id, relationship_id, points_delta, sentiment, old_level, new_level, message_content, created_at \
             FROM affection_history WHERE relationship_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(relationship_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query affection history")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_history(&row)?);
        }
        Ok(records)
    }
}

// =============================================================================
// Row plumbing
// =============================================================================

async fn insert_if_absent(conn: &mut SqliteConnection, state: &RelationshipState) -> Result<bool, BondError> {
    let result = sqlx::query(&format!(
        "INSERT INTO relationships ({RELATIONSHIP_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(subject_id, counterpart_id) DO NOTHING"
    ))
    .bind(state.id.to_string())
    .bind(&state.subject_id)
    .bind(&state.counterpart_id)
    .bind(state.affection_points)
    .bind(i64::from(state.intimacy_level.value()))
    .bind(state.stage.as_str())
    .bind(state.phone_unlocked)
    .bind(state.rescue_triggered)
    .bind(state.trust_debt)
    .bind(state.emotional_momentum)
    .bind(state.apology_count)
    .bind(state.message_count)
    .bind(state.last_active_at.timestamp_millis())
    .bind(state.last_stage_change_at)
    .bind(state.created_at.timestamp_millis())
    .bind(state.updated_at.timestamp_millis())
    .execute(&mut *conn)
    .await
    .map_err(|e| store_error("insert relationship", e))?;

    Ok(result.rows_affected() == 1)
}

async fn fetch_row(conn: &mut SqliteConnection, key: &PairKey) -> Result<Option<RelationshipState>, BondError> {
    let row = sqlx::query(&format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE subject_id = ? AND counterpart_id = ?"
    ))
    .bind(&key.subject_id)
    .bind(&key.counterpart_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| store_error("select relationship", e))?;

    row.as_ref().map(row_to_state).transpose()
}

/// Writes every mutable column. Identity columns never change.
async fn write_row(conn: &mut SqliteConnection, state: &RelationshipState) -> Result<(), BondError> {
    let result = sqlx::query(
        "UPDATE relationships SET \
         affection_points = ?, intimacy_level = ?, stage = ?, phone_unlocked = ?, rescue_triggered = ?, \
         trust_debt = ?, emotional_momentum = ?, apology_count = ?, message_count = ?, \
         last_active_at = ?, last_stage_change_at = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(state.affection_points)
    .bind(i64::from(state.intimacy_level.value()))
    .bind(state.stage.as_str())
    .bind(state.phone_unlocked)
    .bind(state.rescue_triggered)
    .bind(state.trust_debt)
    .bind(state.emotional_momentum)
    .bind(state.apology_count)
    .bind(state.message_count)
    .bind(state.last_active_at.timestamp_millis())
    .bind(state.last_stage_change_at)
    .bind(state.updated_at.timestamp_millis())
    .bind(state.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| store_error("update relationship", e))?;

    if result.rows_affected() != 1 {
        return Err(BondError::StoreTransactionFailed(format!(
            "update of relationship {} touched {} rows",
            state.id,
            result.rows_affected()
        )));
    }
    Ok(())
}

fn row_to_state(row: &SqliteRow) -> Result<RelationshipState, BondError> {
    let id: String = row.get("id");
    let level: i64 = row.get("intimacy_level");
    let stage: String = row.get("stage");

    Ok(RelationshipState {
        id: Uuid::parse_str(&id).map_err(|e| corrupt("id", e))?,
        subject_id: row.get("subject_id"),
        counterpart_id: row.get("counterpart_id"),
        affection_points: row.get("affection_points"),
        intimacy_level: u8::try_from(level)
            .ok()
            .and_then(IntimacyLevel::new)
            .ok_or_else(|| corrupt("intimacy_level", level))?,
        stage: stage.parse::<Stage>().map_err(|e| corrupt("stage", e))?,
        phone_unlocked: row.get("phone_unlocked"),
        rescue_triggered: row.get("rescue_triggered"),
        trust_debt: row.get("trust_debt"),
        emotional_momentum: row.get("emotional_momentum"),
        apology_count: row.get("apology_count"),
        message_count: row.get("message_count"),
        last_active_at: from_millis("last_active_at", row.get("last_active_at"))?,
        last_stage_change_at: row.get("last_stage_change_at"),
        created_at: from_millis("created_at", row.get("created_at"))?,
        updated_at: from_millis("updated_at", row.get("updated_at"))?,
    })
}

fn row_to_history(row: &SqliteRow) -> Result<HistoryRecord> {
    let relationship_id: String = row.get("relationship_id");
    let sentiment: String = row.get("sentiment");
    let level = |column: &str| -> Result<IntimacyLevel> {
        let raw: i64 = row.get(column);
        u8::try_from(raw)
            .ok()
            .and_then(IntimacyLevel::new)
            .with_context(|| format!("Invalid {} {} in affection_history", column, raw))
    };

    Ok(HistoryRecord {
        id: row.get("id"),
        relationship_id: Uuid::parse_str(&relationship_id).context("Invalid relationship_id in affection_history")?,
        points_delta: row.get("points_delta"),
        sentiment: sentiment.parse::<Sentiment>()?,
        old_level: level("old_level")?,
        new_level: level("new_level")?,
        message_content: row.get("message_content"),
        created_at: from_millis("created_at", row.get("created_at"))?,
    })
}

fn from_millis(column: &'static str, millis: i64) -> Result<DateTime<Utc>, BondError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| corrupt(column, millis))
}

fn corrupt(column: &str, detail: impl std::fmt::Display) -> BondError {
    BondError::StoreTransactionFailed(format!("corrupt {column} in relationships row: {detail}"))
}

/// Connection-level failures are `StoreUnavailable`; everything else failed mid-transaction.
fn store_error(operation: &str, e: sqlx::Error) -> BondError {
    let message = format!("{operation}: {e}");
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => BondError::StoreUnavailable(message),
        _ => BondError::StoreTransactionFailed(message),
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use bond_core::mutator;

    fn key(counterpart: &str) -> PairKey {
        PairKey::new("user-1", counterpart).unwrap()
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        assert!(store.find(&key("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        let first = store.get_or_create(&key("c1")).await.unwrap();
        let second = store.get_or_create(&key("c1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first, second);
        assert_eq!(store.count_relationships().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_atomic_update_round_trips_every_field() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        let now = current_time();
        let change = store
            .atomic_update(
                &key("c1"),
                mutator(move |s| {
                    s.set_points(250);
                    s.stage = Stage::Crush;
                    s.phone_unlocked = true;
                    s.rescue_triggered = true;
                    s.trust_debt = 1.25;
                    s.emotional_momentum = -0.5;
                    s.apology_count = 2;
                    s.message_count = 9;
                    s.last_stage_change_at = 1_700_000_000;
                    s.updated_at = now;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert!(change.created);
        assert_eq!(change.before.affection_points, 0);
        let stored = store.find(&key("c1")).await.unwrap().unwrap();
        assert_eq!(stored, change.after);
    }

    #[tokio::test]
    async fn test_failed_mutator_rolls_back_creation() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        let err = store
            .atomic_update(
                &key("c1"),
                mutator(|_| Err(BondError::validation("stage", "rejected"))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("stage"));
        assert!(store.find(&key("c1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_existing_never_creates() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        let missing = store
            .update_existing(&key("c1"), mutator(|s| {
                s.phone_unlocked = true;
                Ok(())
            }))
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(store.count_relationships().await.unwrap(), 0);

        store.get_or_create(&key("c1")).await.unwrap();
        let change = store
            .update_existing(&key("c1"), mutator(|s| {
                s.phone_unlocked = true;
                Ok(())
            }))
            .await
            .unwrap()
            .unwrap();
        assert!(!change.created);
        assert!(!change.before.phone_unlocked);
        assert!(store.find(&key("c1")).await.unwrap().unwrap().phone_unlocked);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        store.close().await;
        let err = store.get_or_create(&key("c1")).await.unwrap_err();
        assert!(matches!(err, BondError::StoreUnavailable(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_history_append_and_recent() {
        let store = SqliteBondStore::new(":memory:").await.unwrap();
        let state = store.get_or_create(&key("c1")).await.unwrap();

        for delta in [3, 4, 5] {
            let record = HistoryRecord {
                id: 0,
                relationship_id: state.id,
                points_delta: delta,
                sentiment: Sentiment::Positive,
                old_level: IntimacyLevel::default(),
                new_level: IntimacyLevel::default(),
                message_content: Some(format!("msg {delta}")),
                created_at: current_time(),
            };
            assert!(store.append(&record).await.unwrap() > 0);
        }

        let recent = store.recent(state.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].points_delta, 5);
        assert_eq!(recent[1].points_delta, 4);
        assert_eq!(recent[0].message_content.as_deref(), Some("msg 5"));
    }
}
