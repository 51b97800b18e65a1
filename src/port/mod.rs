//! Seams between the pipeline core and its external collaborators.
//!
//! - `StreamBroker`: durable ordered stream with consumer groups plus a
//!   pub/sub side-channel for fan-out
//! - `RecordStore`: atomic multi-row batch persistence

mod broker;
mod store;

use std::future::Future;
use std::pin::Pin;

pub use broker::{
    DATA_FIELD, MessageStream, QueueError, ReadCursor, ReadRequest, StreamBroker, StreamEntry,
    StreamInfo,
};
pub use store::{RecordStore, StoreError};

/// Boxed future returned by port methods.
pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
