//! Appends records to the durable stream.

use crate::domain::LogRecord;
use crate::port::{QueueError, StreamBroker, StreamInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Throughput is logged each time the appended total crosses a multiple of this.
const THROUGHPUT_LOG_EVERY: u64 = 1000;

pub struct QueueProducer {
    broker: Arc<dyn StreamBroker>,
    stream: String,
    messages_sent: AtomicU64,
}

impl QueueProducer {
    pub fn new(broker: Arc<dyn StreamBroker>, stream: impl Into<String>) -> Self {
        Self {
            broker,
            stream: stream.into(),
            messages_sent: AtomicU64::new(0),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Serialize and append one record. Returns the broker-assigned entry ID.
    ///
    /// An unreachable broker surfaces as a retryable `QueueError`.
    pub async fn enqueue(&self, record: &LogRecord) -> Result<String, QueueError> {
        let payload = serde_json::to_string(record)?;
        let id = self.broker.append(&self.stream, payload).await?;
        self.count_sent(1);
        debug!("Enqueued record {}", id);
        Ok(id)
    }

    /// Append all records in one pipelined submission. Returns how many were appended.
    pub async fn enqueue_batch(&self, records: &[LogRecord]) -> Result<usize, QueueError> {
        if records.is_empty() {
            return Ok(0);
        }
        let payloads = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let ids = self.broker.append_batch(&self.stream, payloads).await?;
        self.count_sent(ids.len() as u64);
        debug!("Enqueued batch of {} records", ids.len());
        Ok(ids.len())
    }

    /// Best-effort snapshot. A stream that does not exist yet reads as empty.
    pub async fn stream_info(&self) -> Result<StreamInfo, QueueError> {
        match self.broker.stream_info(&self.stream).await {
            Err(QueueError::StreamMissing(_)) => Ok(StreamInfo::default()),
            other => other,
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    fn count_sent(&self, n: u64) {
        let before = self.messages_sent.fetch_add(n, Ordering::Relaxed);
        let after = before + n;
        if after / THROUGHPUT_LOG_EVERY > before / THROUGHPUT_LOG_EVERY {
            info!(stream = %self.stream, total = after, "Producer throughput checkpoint");
        }
    }
}
