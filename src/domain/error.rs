use crate::app::config::ConfigError;
use crate::broadcast::BroadcastError;
use crate::parser::ParseError;
use crate::ingest::IngestError;
use crate::port::{QueueError, StoreError};
use crate::queue::ConsumerError;
use crate::shipper::{ShipperError, TransportError};
use crate::supervisor::SupervisorError;
use thiserror::Error;

/// Top-level error type for the pipeline binaries.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Shipper error: {0}")]
    Shipper(#[from] ShipperError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Supervision error: {0}")]
    Supervision(#[from] SupervisorError),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}
