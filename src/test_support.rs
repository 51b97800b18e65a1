//! In-memory stand-ins for the broker and the store.
//!
//! They follow the same contracts as the Redis and PostgreSQL adapters so
//! the pipeline can be exercised end to end without external services.

use crate::domain::{LogRecord, StoredRecord};
use crate::port::{
    MessageStream, PortFuture, QueueError, ReadCursor, ReadRequest, RecordStore, StoreError,
    StreamBroker, StreamEntry, StreamInfo,
};
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct GroupState {
    /// Sequence number of the last entry handed out with `>`.
    last_delivered: u64,
    /// Entry sequence -> consumer it was delivered to.
    pending: BTreeMap<u64, String>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<(u64, StreamEntry)>,
    groups: HashMap<String, GroupState>,
}

/// Broker keeping streams, consumer groups and pending lists in memory.
pub struct InMemoryBroker {
    streams: Mutex<HashMap<String, StreamState>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: Mutex<Vec<(String, String)>>,
    next_seq: AtomicU64,
    unavailable: AtomicBool,
    fail_publish: AtomicBool,
    fail_group_setup: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_group_setup: AtomicBool::new(false),
        }
    }

    /// Make every operation fail with `BrokerUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `publish` fail while everything else keeps working.
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make `ensure_group` fail with a non-retryable setup error.
    pub fn set_group_setup_failure(&self, fail: bool) {
        self.fail_group_setup.store(fail, Ordering::SeqCst);
    }

    /// Messages published so far, as `(channel, payload)`.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Append a raw entry with arbitrary fields, bypassing the `data` convention.
    pub fn append_raw(&self, stream: &str, fields: HashMap<String, String>) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = format!("{seq}-0");
        self.streams
            .lock()
            .entry(stream.to_string())
            .or_default()
            .entries
            .push((seq, StreamEntry { id: id.clone(), fields }));
        id
    }

    pub fn stream_len(&self, stream: &str) -> usize {
        self.streams.lock().get(stream).map_or(0, |s| s.entries.len())
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(QueueError::BrokerUnavailable("in-memory broker switched off".to_string()))
        } else {
            Ok(())
        }
    }

    fn append_payload(&self, stream: &str, payload: String) -> String {
        self.append_raw(
            stream,
            HashMap::from([(crate::port::DATA_FIELD.to_string(), payload)]),
        )
    }

    fn read(&self, request: &ReadRequest) -> Result<Vec<StreamEntry>, QueueError> {
        let mut streams = self.streams.lock();
        let state = streams
            .get_mut(&request.stream)
            .ok_or_else(|| QueueError::StreamMissing(request.stream.clone()))?;
        let StreamState { entries, groups } = state;
        let group = groups
            .get_mut(&request.group)
            .ok_or_else(|| QueueError::Broker(format!("NOGROUP {}", request.group)))?;

        let delivered = match request.cursor {
            ReadCursor::Pending => entries
                .iter()
                .filter(|(seq, _)| group.pending.get(seq) == Some(&request.consumer))
                .take(request.count)
                .map(|(_, entry)| entry.clone())
                .collect(),
            ReadCursor::New => {
                let fresh: Vec<(u64, StreamEntry)> = entries
                    .iter()
                    .filter(|(seq, _)| *seq > group.last_delivered)
                    .take(request.count)
                    .cloned()
                    .collect();
                for (seq, _) in &fresh {
                    group.last_delivered = *seq;
                    group.pending.insert(*seq, request.consumer.clone());
                }
                fresh.into_iter().map(|(_, entry)| entry).collect()
            }
        };
        Ok(delivered)
    }
}

fn sequence_of(id: &str) -> Option<u64> {
    id.split('-').next()?.parse().ok()
}

impl StreamBroker for InMemoryBroker {
    fn append<'a>(&'a self, stream: &'a str, payload: String) -> PortFuture<'a, Result<String, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.append_payload(stream, payload))
        })
    }

    fn append_batch<'a>(
        &'a self,
        stream: &'a str,
        payloads: Vec<String>,
    ) -> PortFuture<'a, Result<Vec<String>, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(payloads
                .into_iter()
                .map(|payload| self.append_payload(stream, payload))
                .collect())
        })
    }

    fn ensure_group<'a>(&'a self, stream: &'a str, group: &'a str) -> PortFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            if self.fail_group_setup.load(Ordering::SeqCst) {
                return Err(QueueError::GroupSetup(
                    "WRONGTYPE key holds the wrong kind of value".to_string(),
                ));
            }
            self.streams
                .lock()
                .entry(stream.to_string())
                .or_default()
                .groups
                .entry(group.to_string())
                .or_default();
            Ok(())
        })
    }

    fn read_group<'a>(&'a self, request: &'a ReadRequest) -> PortFuture<'a, Result<Vec<StreamEntry>, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            let entries = self.read(request)?;
            if entries.is_empty() && request.cursor == ReadCursor::New {
                // Emulate a blocking read without holding the test up.
                tokio::time::sleep(request.block.min(std::time::Duration::from_millis(10))).await;
            }
            Ok(entries)
        })
    }

    fn ack<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        ids: &'a [String],
    ) -> PortFuture<'a, Result<u64, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            let mut streams = self.streams.lock();
            let Some(group) = streams.get_mut(stream).and_then(|s| s.groups.get_mut(group)) else {
                return Ok(0);
            };
            let acked = ids
                .iter()
                .filter_map(|id| sequence_of(id))
                .filter(|seq| group.pending.remove(seq).is_some())
                .count();
            Ok(acked as u64)
        })
    }

    fn pending_count<'a>(&'a self, stream: &'a str, group: &'a str) -> PortFuture<'a, Result<u64, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .streams
                .lock()
                .get(stream)
                .and_then(|s| s.groups.get(group))
                .map_or(0, |g| g.pending.len() as u64))
        })
    }

    fn stream_info<'a>(&'a self, stream: &'a str) -> PortFuture<'a, Result<StreamInfo, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            let streams = self.streams.lock();
            let state = streams
                .get(stream)
                .ok_or_else(|| QueueError::StreamMissing(stream.to_string()))?;
            Ok(StreamInfo {
                length: state.entries.len() as u64,
                groups: state.groups.len() as u64,
                first_entry_id: state.entries.first().map(|(_, e)| e.id.clone()),
                last_entry_id: state.entries.last().map(|(_, e)| e.id.clone()),
            })
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, payload: String) -> PortFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(QueueError::Broker("publish rejected".to_string()));
            }
            self.published.lock().push((channel.to_string(), payload.clone()));
            if let Some(sender) = self.channels.lock().get(channel) {
                // No receivers is fine for pub/sub.
                let _ = sender.send(payload);
            }
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> PortFuture<'a, Result<MessageStream, QueueError>> {
        Box::pin(async move {
            self.check_available()?;
            let receiver = self
                .channels
                .lock()
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(1024).0)
                .subscribe();
            let stream = futures::stream::unfold(receiver, |mut receiver| async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) => return Some((message, receiver)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            })
            .boxed();
            Ok(stream)
        })
    }
}

/// Store keeping committed rows in memory with row-level failure injection.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<StoredRecord>>,
    next_id: AtomicI64,
    fail_on_row: Mutex<Option<usize>>,
    batches: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        })
    }

    /// Fail the next batches at this zero-based row index until cleared.
    pub fn fail_on_row(&self, row: Option<usize>) {
        *self.fail_on_row.lock() = row;
    }

    pub fn rows(&self) -> Vec<StoredRecord> {
        self.rows.lock().clone()
    }

    pub fn committed_batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }
}

impl RecordStore for InMemoryStore {
    fn insert_batch<'a>(
        &'a self,
        records: &'a [LogRecord],
    ) -> PortFuture<'a, Result<Vec<StoredRecord>, StoreError>> {
        Box::pin(async move {
            let fail_on = *self.fail_on_row.lock();
            // Stage everything first, commit only if every row succeeds.
            let mut staged = Vec::with_capacity(records.len());
            for (row, record) in records.iter().enumerate() {
                if fail_on == Some(row) {
                    return Err(StoreError::RowFailed {
                        row,
                        message: "injected failure".to_string(),
                    });
                }
                staged.push(StoredRecord {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    created_at: Utc::now(),
                    record: record.clone(),
                });
            }
            self.rows.lock().extend(staged.iter().cloned());
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(staged)
        })
    }
}
