//! HTTP ingestion entry point.
//!
//! Thin layer over the parser registry and the queue producer; the live
//! subscriber transport is mounted on the same router.

mod error;
mod handlers;
mod payload;

pub use error::IngestError;
pub use payload::{CustomParserRequest, LogRecordPayload, ParseRequest};

use crate::broadcast::{self, Broadcaster};
use crate::parser::ParserRegistry;
use crate::queue::QueueProducer;
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

/// Upper bound for `max_batch`.
pub const MAX_BATCH_LIMIT: usize = 10_000;

/// Shared state of the ingestion handlers.
pub struct IngestState {
    pub registry: Arc<ParserRegistry>,
    pub producer: Arc<QueueProducer>,
    pub broadcaster: Arc<Broadcaster>,
    pub max_batch: usize,
}

pub fn router(state: Arc<IngestState>) -> Router {
    let broadcaster = state.broadcaster.clone();

    let api = Router::new()
        .route("/logs", post(handlers::ingest_log))
        .route("/logs/batch", post(handlers::ingest_batch))
        .route("/queue/status", get(handlers::queue_status))
        .route("/health", get(handlers::health))
        .route("/parse/auto", post(handlers::parse_auto))
        .route("/parse/formats", get(handlers::parse_formats))
        .route("/parse/patterns", get(handlers::parse_patterns))
        .route("/parse/custom", post(handlers::add_custom_parser))
        .route("/parse/custom/{name}", delete(handlers::remove_custom_parser))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(broadcast::ws::router(broadcaster))
}
