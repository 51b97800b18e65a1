use super::PortFuture;
use crate::domain::{LogRecord, StoredRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Insert failed at row {row}: {message}")]
    RowFailed { row: usize, message: String },

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent store accepting one atomic multi-row insert per batch.
pub trait RecordStore: Send + Sync {
    /// Insert every record in one transaction.
    ///
    /// Either all rows are committed and returned with their assigned
    /// identity, or none are.
    fn insert_batch<'a>(
        &'a self,
        records: &'a [LogRecord],
    ) -> PortFuture<'a, Result<Vec<StoredRecord>, StoreError>>;
}
