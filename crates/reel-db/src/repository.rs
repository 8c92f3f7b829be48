use chrono::{DateTime, Utc};
use reel_core::error::AppError;
use reel_core::models::{Record, compute_hash};
use reel_core::traits::Sink;
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// A persisted record with its storage metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub canonical_url: String,
    pub record: Record,
    pub data_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record store in PostgreSQL.
///
/// Every instance is tagged with a run id, so the records of one crawl can
/// be told apart from earlier runs of the same URLs.
#[derive(Clone)]
pub struct RecordRepository {
    pool: Pool<Postgres>,
    run_id: Uuid,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Insert one record. Returns the generated row id.
    pub async fn insert(&self, record: &Record) -> Result<Uuid, AppError> {
        let data = serde_json::to_value(record)?;
        let data_hash = compute_hash(&data.to_string());

        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO records (run_id, canonical_url, record, data_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(self.run_id)
        .bind(record.canonical_url())
        .bind(&data)
        .bind(&data_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.0)
    }

    /// Insert or replace a blob.
    pub async fn upsert_blob(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO blobs (key, content_type, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET content_type = EXCLUDED.content_type,
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Most recently stored records across all URLs, newest first.
    pub async fn latest(&self, limit: usize) -> Result<Vec<StoredRecord>, AppError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, run_id, canonical_url, record, data_hash, created_at
            FROM records
            ORDER BY created_at DESC, id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Stored versions of one canonical URL, newest first.
    pub async fn history(&self, canonical_url: &str, limit: usize) -> Result<Vec<StoredRecord>, AppError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, run_id, canonical_url, record, data_hash, created_at
            FROM records
            WHERE canonical_url = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(canonical_url)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Records of this repository's run, in insertion order.
    pub async fn run_records(&self) -> Result<Vec<StoredRecord>, AppError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, run_id, canonical_url, record, data_hash, created_at
            FROM records
            WHERE run_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(self.run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_blob(&self, key: &str) -> Result<Option<StoredBlob>, AppError> {
        let row: Option<(String, String, Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT key, content_type, body, updated_at FROM blobs WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(|(key, content_type, body, updated_at)| StoredBlob {
            key,
            content_type,
            body,
            updated_at,
        }))
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    run_id: Uuid,
    canonical_url: String,
    record: serde_json::Value,
    data_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for StoredRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(StoredRecord {
            id: row.id,
            run_id: row.run_id,
            canonical_url: row.canonical_url,
            record: serde_json::from_value(row.record)?,
            data_hash: row.data_hash,
            created_at: row.created_at,
        })
    }
}

// -- Trait implementation --

impl Sink for RecordRepository {
    async fn append(&self, record: &Record) -> Result<(), AppError> {
        let id = self.insert(record).await?;
        tracing::debug!(%id, url = %record.canonical_url(), "Record stored");
        Ok(())
    }

    async fn put_blob(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), AppError> {
        self.upsert_blob(key, bytes, content_type).await
    }
}
