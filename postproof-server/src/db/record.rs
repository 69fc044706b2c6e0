//! Postgres record store
//!
//! Lease acquisition and update application are each one conditional
//! `UPDATE`, so a writer whose lease expired can never overwrite a record.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postproof_core::{
    Backend, BlockRef, ContentFingerprint, HashAlgorithm, PostSnapshot, ProofError, RecordStore,
    RecordUpdate, Result, TimestampRecord, TimestampStatus,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, subject_id, content_ref, snapshot, backend, hash_algorithm, \
     content_hash, status, proof_blob, confirmed_at, block_height, block_hash, failure_reason, \
     created_at, updated_at";

fn store_err(e: sqlx::Error) -> ProofError {
    ProofError::Store(e.to_string())
}

/// Row type for database queries.
#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    subject_id: String,
    content_ref: String,
    snapshot: serde_json::Value,
    backend: String,
    hash_algorithm: String,
    content_hash: String,
    status: String,
    proof_blob: Option<Vec<u8>>,
    confirmed_at: Option<DateTime<Utc>>,
    block_height: Option<i64>,
    block_hash: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for TimestampRecord {
    type Error = ProofError;

    fn try_from(row: RecordRow) -> Result<Self> {
        let snapshot: PostSnapshot = serde_json::from_value(row.snapshot)
            .map_err(|e| ProofError::Store(format!("record {}: bad snapshot: {e}", row.id)))?;
        let algorithm: HashAlgorithm = row.hash_algorithm.parse()?;
        let block_ref = row
            .block_height
            .map(|height| {
                u64::try_from(height)
                    .map(|height| BlockRef {
                        height,
                        hash: row.block_hash.clone(),
                    })
                    .map_err(|_| ProofError::Store(format!("record {}: negative height", row.id)))
            })
            .transpose()?;

        Ok(Self {
            id: row.id,
            subject_id: row.subject_id,
            content_ref: row.content_ref,
            snapshot,
            backend: row.backend.parse::<Backend>()?,
            content_hash: ContentFingerprint::from_hex(algorithm, &row.content_hash)?,
            status: row.status.parse::<TimestampStatus>()?,
            proof_blob: row.proof_blob,
            confirmed_at: row.confirmed_at,
            block_ref,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Column values written by one [`RecordUpdate`]; `None` keeps the stored value.
#[derive(Debug, Default, PartialEq, Eq)]
struct UpdateColumns {
    status: &'static str,
    proof_blob: Option<Vec<u8>>,
    confirmed_at: Option<DateTime<Utc>>,
    block_height: Option<i64>,
    block_hash: Option<String>,
    failure_reason: Option<String>,
}

impl UpdateColumns {
    fn from_update(update: &RecordUpdate) -> Result<Self> {
        let status = update.next_status().as_str();
        Ok(match update {
            RecordUpdate::ProofExtended { proof_blob } => Self {
                status,
                proof_blob: Some(proof_blob.clone()),
                ..Default::default()
            },
            RecordUpdate::Confirmed {
                proof_blob,
                confirmation,
            } => Self {
                status,
                proof_blob: proof_blob.clone(),
                confirmed_at: Some(confirmation.confirmed_at),
                block_height: Some(height_column(confirmation.block_ref.height)?),
                block_hash: confirmation.block_ref.hash.clone(),
                ..Default::default()
            },
            RecordUpdate::Failed { reason } => Self {
                status,
                failure_reason: Some(reason.clone()),
                ..Default::default()
            },
        })
    }
}

fn height_column(height: u64) -> Result<i64> {
    i64::try_from(height).map_err(|_| ProofError::InvalidInput(format!("height {height} too large")))
}

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Connect to the database.
    ///
    /// Runs migrations automatically on connection.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(store_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ProofError::Store(format!("migration failed: {e}")))?;

        tracing::info!("Record store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a record store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cheap connectivity check for readiness.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM timestamp_records WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: &TimestampRecord) -> Result<()> {
        record.check_invariants()?;
        let snapshot = serde_json::to_value(&record.snapshot)
            .map_err(|e| ProofError::Serialization(e.to_string()))?;
        let block_height = record
            .block_ref
            .as_ref()
            .map(|b| height_column(b.height))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO timestamp_records (
                id, subject_id, content_ref, snapshot, backend, hash_algorithm,
                content_hash, status, proof_blob, confirmed_at, block_height,
                block_hash, failure_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.id)
        .bind(&record.subject_id)
        .bind(&record.content_ref)
        .bind(snapshot)
        .bind(record.backend.as_str())
        .bind(record.content_hash.algorithm.as_str())
        .bind(&record.content_hash.hash_hex)
        .bind(record.status.as_str())
        .bind(&record.proof_blob)
        .bind(record.confirmed_at)
        .bind(block_height)
        .bind(record.block_ref.as_ref().and_then(|b| b.hash.clone()))
        .bind(&record.failure_reason)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        tracing::debug!(record_id = %record.id, "Stored timestamp record");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TimestampRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM timestamp_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(TimestampRecord::try_from).transpose()
    }

    async fn latest_for_content_ref(&self, content_ref: &str) -> Result<Option<TimestampRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM timestamp_records \
             WHERE content_ref = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(content_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(TimestampRecord::try_from).transpose()
    }

    async fn list_pending(&self, backends: &[Backend]) -> Result<Vec<Uuid>> {
        let backends: Vec<&str> = backends.iter().map(Backend::as_str).collect();
        sqlx::query_scalar(
            r#"
            SELECT id FROM timestamp_records
            WHERE status = 'pending' AND backend = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&backends)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn try_acquire_lease(&self, id: Uuid, holder: Uuid, ttl: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE timestamp_records
            SET lease_holder = $2,
                lease_expires_at = NOW() + make_interval(secs => $3)
            WHERE id = $1
              AND (lease_holder IS NULL OR lease_holder = $2 OR lease_expires_at <= NOW())
            "#,
        )
        .bind(id)
        .bind(holder)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(ProofError::NotFound(id.to_string()))
        }
    }

    async fn release_lease(&self, id: Uuid, holder: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE timestamp_records
            SET lease_holder = NULL, lease_expires_at = NULL
            WHERE id = $1 AND lease_holder = $2
            "#,
        )
        .bind(id)
        .bind(holder)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn apply_update(&self, id: Uuid, holder: Uuid, update: &RecordUpdate) -> Result<bool> {
        let columns = UpdateColumns::from_update(update)?;
        let result = sqlx::query(
            r#"
            UPDATE timestamp_records
            SET status = $3,
                proof_blob = COALESCE($4, proof_blob),
                confirmed_at = COALESCE($5, confirmed_at),
                block_height = COALESCE($6, block_height),
                block_hash = COALESCE($7, block_hash),
                failure_reason = COALESCE($8, failure_reason),
                lease_holder = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND lease_holder = $2
              AND lease_expires_at > NOW()
            "#,
        )
        .bind(id)
        .bind(holder)
        .bind(columns.status)
        .bind(columns.proof_blob)
        .bind(columns.confirmed_at)
        .bind(columns.block_height)
        .bind(columns.block_hash)
        .bind(columns.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() > 0 {
            tracing::debug!(record_id = %id, status = columns.status, "Applied record update");
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(ProofError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postproof_core::{Confirmation, Engagement, PostContent};

    fn row() -> RecordRow {
        let snapshot = PostSnapshot::new(
            PostContent {
                post_id: "42".into(),
                author: "zoe".into(),
                text: "hello".into(),
                posted_at: None,
                media: vec![],
            },
            Engagement::default(),
        );
        let fp = snapshot.content.fingerprint().unwrap();
        RecordRow {
            id: Uuid::new_v4(),
            subject_id: "subject".into(),
            content_ref: "post:42".into(),
            snapshot: serde_json::to_value(&snapshot).unwrap(),
            backend: "calendar-bitcoin".into(),
            hash_algorithm: "sha256".into(),
            content_hash: fp.hash_hex,
            status: "confirmed".into(),
            proof_blob: Some(vec![1, 2, 3]),
            confirmed_at: Some(Utc::now()),
            block_height: Some(900_000),
            block_hash: Some("00ab".into()),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_into_record() {
        let record = TimestampRecord::try_from(row()).unwrap();
        assert_eq!(record.backend, Backend::CalendarBitcoin);
        assert_eq!(record.status, TimestampStatus::Confirmed);
        let block = record.block_ref.unwrap();
        assert_eq!(block.height, 900_000);
        assert_eq!(block.hash.as_deref(), Some("00ab"));
        assert_eq!(record.snapshot.content.text, "hello");
    }

    #[test]
    fn test_row_with_unknown_backend_is_rejected() {
        let mut bad = row();
        bad.backend = "ethereum".into();
        assert!(TimestampRecord::try_from(bad).is_err());
    }

    #[test]
    fn test_row_with_negative_height_is_rejected() {
        let mut bad = row();
        bad.block_height = Some(-1);
        assert!(matches!(
            TimestampRecord::try_from(bad),
            Err(ProofError::Store(_))
        ));
    }

    #[test]
    fn test_confirmed_update_columns() {
        let at = Utc::now();
        let columns = UpdateColumns::from_update(&RecordUpdate::Confirmed {
            proof_blob: None,
            confirmation: Confirmation {
                block_ref: BlockRef {
                    height: 900_000,
                    hash: None,
                },
                confirmed_at: at,
            },
        })
        .unwrap();
        assert_eq!(columns.status, "confirmed");
        assert_eq!(columns.proof_blob, None);
        assert_eq!(columns.confirmed_at, Some(at));
        assert_eq!(columns.block_height, Some(900_000));
    }

    #[test]
    fn test_failed_update_columns() {
        let columns = UpdateColumns::from_update(&RecordUpdate::Failed {
            reason: "tx failed".into(),
        })
        .unwrap();
        assert_eq!(columns.status, "failed");
        assert_eq!(columns.failure_reason.as_deref(), Some("tx failed"));
        assert!(columns.proof_blob.is_none());
    }
}
