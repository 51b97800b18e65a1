//! Consumer-group reader that batches, persists, fans out and acknowledges.

use crate::domain::{LogRecord, StoredRecord};
use crate::port::{QueueError, ReadCursor, ReadRequest, RecordStore, StoreError, StreamBroker, StreamEntry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Consumer setup failed: {0}")]
    Setup(QueueError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Batch persistence failed: {0}")]
    Persist(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub stream: String,
    pub group: String,
    pub consumer_name: String,
    /// Pub/sub channel persisted records are republished on.
    pub channel: String,
    pub batch_size: usize,
    /// Batching window for blocking reads.
    pub block: Duration,
    pub idle_sleep: Duration,
    /// Pause after a broker or store failure.
    pub retry_backoff: Duration,
    /// Throughput is reported every this many batches.
    pub metrics_every: u64,
}

impl ConsumerSettings {
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            stream: "logs".to_string(),
            group: "log-processors".to_string(),
            consumer_name: consumer_name.into(),
            channel: "new_logs".to_string(),
            batch_size: 500,
            block: Duration::from_millis(2000),
            idle_sleep: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(1),
            metrics_every: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    Idle,
    Reading,
    Processing,
    Acknowledging,
    /// Terminal: the consumer group could not be set up.
    Dead,
}

#[derive(Debug, Default)]
struct ConsumerStats {
    processed: AtomicU64,
    batches: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub processed: u64,
    pub batches: u64,
    pub errors: u64,
}

/// Result of one pass through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Empty,
    Completed {
        persisted: usize,
        malformed: usize,
        acknowledged: u64,
    },
}

pub struct QueueConsumer {
    broker: Arc<dyn StreamBroker>,
    store: Arc<dyn RecordStore>,
    settings: ConsumerSettings,
    state: Mutex<ConsumerState>,
    stats: ConsumerStats,
    /// While set, reads drain this consumer's own pending entries before new ones.
    recovering: AtomicBool,
    started: Instant,
}

impl QueueConsumer {
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        store: Arc<dyn RecordStore>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            broker,
            store,
            settings,
            state: Mutex::new(ConsumerState::Idle),
            stats: ConsumerStats::default(),
            recovering: AtomicBool::new(true),
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.consumer_name
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            processed: self.stats.processed.load(Ordering::Relaxed),
            batches: self.stats.batches.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock() = state;
    }

    /// Create the consumer group. An existing group is fine; any other
    /// non-retryable failure moves the consumer to `Dead`.
    pub async fn setup(&self) -> Result<(), ConsumerError> {
        match self
            .broker
            .ensure_group(&self.settings.stream, &self.settings.group)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => Err(ConsumerError::Queue(e)),
            Err(e) => {
                self.set_state(ConsumerState::Dead);
                Err(ConsumerError::Setup(e))
            }
        }
    }

    /// Run one READING -> PROCESSING -> ACKNOWLEDGING cycle.
    ///
    /// On a persistence failure nothing is acknowledged and the consumer
    /// switches to recovering its pending entries, so the same batch is
    /// retried on the next call.
    pub async fn process_batch(&self) -> Result<BatchOutcome, ConsumerError> {
        let cursor = if self.recovering.load(Ordering::Acquire) {
            ReadCursor::Pending
        } else {
            ReadCursor::New
        };

        self.set_state(ConsumerState::Reading);
        let request = ReadRequest {
            stream: self.settings.stream.clone(),
            group: self.settings.group.clone(),
            consumer: self.settings.consumer_name.clone(),
            count: self.settings.batch_size,
            block: self.settings.block,
            cursor,
        };
        let entries = match self.broker.read_group(&request).await {
            Ok(entries) => entries,
            Err(e) => {
                self.set_state(ConsumerState::Idle);
                return Err(e.into());
            }
        };

        if entries.is_empty() {
            if cursor == ReadCursor::Pending {
                debug!("Consumer {} has no pending entries left", self.name());
                self.recovering.store(false, Ordering::Release);
            }
            self.set_state(ConsumerState::Idle);
            return Ok(BatchOutcome::Empty);
        }

        self.set_state(ConsumerState::Processing);
        let ids: Vec<String> = entries.iter().map(|entry| entry.id.clone()).collect();
        let (records, malformed) = self.decode_entries(&entries);

        let persisted = if records.is_empty() {
            0
        } else {
            let stored = match self.store.insert_batch(&records).await {
                Ok(stored) => stored,
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.recovering.store(true, Ordering::Release);
                    self.set_state(ConsumerState::Idle);
                    error!(
                        "Consumer {} failed to persist batch of {} records, leaving it unacknowledged: {}",
                        self.name(),
                        records.len(),
                        e
                    );
                    return Err(e.into());
                }
            };
            self.fan_out(&stored).await;
            stored.len()
        };

        self.set_state(ConsumerState::Acknowledging);
        let acknowledged = match self
            .broker
            .ack(&self.settings.stream, &self.settings.group, &ids)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                // Persisted but still pending: the next pass redelivers it.
                self.recovering.store(true, Ordering::Release);
                self.set_state(ConsumerState::Idle);
                return Err(e.into());
            }
        };

        self.stats
            .processed
            .fetch_add(persisted as u64, Ordering::Relaxed);
        let batches = self.stats.batches.fetch_add(1, Ordering::Relaxed) + 1;
        if self.settings.metrics_every > 0 && batches % self.settings.metrics_every == 0 {
            self.report_throughput();
        }

        self.set_state(ConsumerState::Idle);
        Ok(BatchOutcome::Completed {
            persisted,
            malformed,
            acknowledged,
        })
    }

    fn decode_entries(&self, entries: &[StreamEntry]) -> (Vec<LogRecord>, usize) {
        let mut records = Vec::with_capacity(entries.len());
        let mut malformed = 0;
        for entry in entries {
            let decoded = entry
                .payload()
                .ok_or_else(|| "entry has no data field".to_string())
                .and_then(|payload| {
                    serde_json::from_str::<LogRecord>(payload).map_err(|e| e.to_string())
                });
            match decoded {
                Ok(record) => records.push(record),
                Err(reason) => {
                    malformed += 1;
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Skipping malformed entry {}: {}", entry.id, reason);
                }
            }
        }
        (records, malformed)
    }

    /// Republish persisted records. Failures are logged and never undo the batch.
    async fn fan_out(&self, stored: &[StoredRecord]) {
        for record in stored {
            let payload = match serde_json::to_string(record) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode record {} for fan-out: {}", record.id, e);
                    continue;
                }
            };
            if let Err(e) = self.broker.publish(&self.settings.channel, payload).await {
                warn!("Fan-out of record {} failed: {}", record.id, e);
            }
        }
    }

    fn report_throughput(&self) {
        let stats = self.stats();
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            consumer = %self.settings.consumer_name,
            processed = stats.processed,
            batches = stats.batches,
            errors = stats.errors,
            rate = format_args!("{:.1}", stats.processed as f64 / elapsed),
            "Consumer throughput"
        );
    }

    /// Loop until `shutdown` is cancelled. Cancellation is observed between
    /// batches, never in the middle of one.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ConsumerStatsSnapshot, ConsumerError> {
        loop {
            match self.setup().await {
                Ok(()) => break,
                Err(ConsumerError::Queue(e)) => {
                    warn!("Broker not reachable for consumer {}: {}", self.name(), e);
                    if !pause(&shutdown, self.settings.retry_backoff).await {
                        return Ok(self.stats());
                    }
                }
                Err(e) => {
                    error!("Consumer {} is dead: {}", self.name(), e);
                    return Err(e);
                }
            }
        }

        info!(
            "Consumer {} reading '{}' as part of group '{}'",
            self.name(),
            self.settings.stream,
            self.settings.group
        );

        while !shutdown.is_cancelled() {
            let delay = match self.process_batch().await {
                Ok(BatchOutcome::Empty) => Some(self.settings.idle_sleep),
                Ok(BatchOutcome::Completed { .. }) => None,
                Err(e) => {
                    error!("Consumer {} batch failed: {}", self.name(), e);
                    Some(self.settings.retry_backoff)
                }
            };
            if let Some(delay) = delay {
                if !pause(&shutdown, delay).await {
                    break;
                }
            }
        }

        let stats = self.stats();
        info!(
            "Consumer {} stopped: processed={} batches={} errors={}",
            self.name(),
            stats.processed,
            stats.batches,
            stats.errors
        );
        Ok(stats)
    }
}

/// Sleep unless shutdown comes first. Returns false when cancelled.
async fn pause(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
