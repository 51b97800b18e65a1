//! Durable stream plumbing: producer, consumer and the Redis Streams broker.

pub mod consumer;
pub mod producer;
pub mod redis_broker;

pub use consumer::{
    BatchOutcome, ConsumerError, ConsumerSettings, ConsumerState, ConsumerStatsSnapshot,
    QueueConsumer,
};
pub use producer::QueueProducer;
pub use redis_broker::RedisBroker;
