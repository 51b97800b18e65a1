use crate::domain::{LogRecord, StoredRecord};
use crate::port::{PortFuture, RecordStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

/// Width of the `source` and `application` columns.
const LABEL_COLUMN_WIDTH: usize = 100;

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS logs (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    level VARCHAR(10) NOT NULL,
    source VARCHAR(100) NOT NULL,
    application VARCHAR(100) NOT NULL,
    message TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const CREATE_INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_logs_level ON logs (level)",
];

const INSERT_RECORD: &str = r"
INSERT INTO logs (timestamp, level, source, application, message, metadata)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id, created_at";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// PostgreSQL store. Each batch is one transaction.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Build a lazily connecting pool; the first query opens the connection.
    pub fn connect_lazy(settings: &StoreSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect_lazy(&settings.database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `logs` table and its indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        for statement in CREATE_INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Log table schema verified");
        Ok(())
    }
}

/// Clip to the column width on a character boundary.
fn clip(value: &str) -> &str {
    match value.char_indices().nth(LABEL_COLUMN_WIDTH) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

impl RecordStore for PgRecordStore {
    fn insert_batch<'a>(
        &'a self,
        records: &'a [LogRecord],
    ) -> PortFuture<'a, Result<Vec<StoredRecord>, StoreError>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(Vec::new());
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let mut stored = Vec::with_capacity(records.len());

            // Returning early drops `tx`, which rolls the whole batch back.
            for (row, record) in records.iter().enumerate() {
                let inserted = sqlx::query(INSERT_RECORD)
                    .bind(record.timestamp)
                    .bind(record.level.as_str())
                    .bind(clip(&record.source))
                    .bind(clip(&record.application))
                    .bind(&record.message)
                    .bind(Json(&record.metadata))
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| StoreError::RowFailed {
                        row,
                        message: e.to_string(),
                    })?;

                let id: i64 = inserted.try_get("id")?;
                let created_at: DateTime<Utc> = inserted.try_get("created_at")?;
                stored.push(StoredRecord {
                    id,
                    created_at,
                    record: record.clone(),
                });
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
            debug!("Committed batch of {} records", stored.len());
            Ok(stored)
        })
    }
}
