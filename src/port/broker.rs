use super::PortFuture;
use futures::stream::BoxStream;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Stream entry field carrying the JSON-encoded record.
pub const DATA_FIELD: &str = "data";

/// Messages received from a pub/sub channel.
pub type MessageStream = BoxStream<'static, String>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Stream '{0}' does not exist")]
    StreamMissing(String),

    #[error("Consumer group setup failed: {0}")]
    GroupSetup(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(String),
}

impl QueueError {
    /// Whether the caller should try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::BrokerUnavailable(_))
    }
}

/// An appended stream entry as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn with_payload(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::from([(DATA_FIELD.to_string(), payload.into())]),
        }
    }

    pub fn payload(&self) -> Option<&str> {
        self.fields.get(DATA_FIELD).map(String::as_str)
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Entries never delivered to any member of the group (`>`).
    New,
    /// Entries already delivered to this consumer but not yet acknowledged.
    Pending,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub count: usize,
    /// Upper bound on how long a `New` read waits for entries.
    pub block: Duration,
    pub cursor: ReadCursor,
}

/// Best-effort snapshot of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub length: u64,
    pub groups: u64,
    pub first_entry_id: Option<String>,
    pub last_entry_id: Option<String>,
}

/// Append-only ordered log with named consumer groups and a pub/sub side-channel.
pub trait StreamBroker: Send + Sync {
    /// Append one payload, creating the stream on first use. Returns the entry ID.
    fn append<'a>(&'a self, stream: &'a str, payload: String) -> PortFuture<'a, Result<String, QueueError>>;

    /// Append all payloads in one pipelined submission.
    fn append_batch<'a>(
        &'a self,
        stream: &'a str,
        payloads: Vec<String>,
    ) -> PortFuture<'a, Result<Vec<String>, QueueError>>;

    /// Create the group at the start of the stream (creating the stream too).
    /// An already existing group is not an error.
    fn ensure_group<'a>(&'a self, stream: &'a str, group: &'a str) -> PortFuture<'a, Result<(), QueueError>>;

    fn read_group<'a>(&'a self, request: &'a ReadRequest) -> PortFuture<'a, Result<Vec<StreamEntry>, QueueError>>;

    /// Acknowledge entries, removing them from the group's pending list.
    fn ack<'a>(
        &'a self,
        stream: &'a str,
        group: &'a str,
        ids: &'a [String],
    ) -> PortFuture<'a, Result<u64, QueueError>>;

    /// Number of delivered but unacknowledged entries in the group.
    fn pending_count<'a>(&'a self, stream: &'a str, group: &'a str) -> PortFuture<'a, Result<u64, QueueError>>;

    /// Fails with `StreamMissing` when the stream has never been created.
    fn stream_info<'a>(&'a self, stream: &'a str) -> PortFuture<'a, Result<StreamInfo, QueueError>>;

    fn publish<'a>(&'a self, channel: &'a str, payload: String) -> PortFuture<'a, Result<(), QueueError>>;

    fn subscribe<'a>(&'a self, channel: &'a str) -> PortFuture<'a, Result<MessageStream, QueueError>>;
}
