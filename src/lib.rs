//! Durable, multi-queue message broker core: on-disk record blocks, queues
//! built from them, a recovering store, and the line-oriented session
//! protocol served over them.

pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod record;
pub mod server;
pub mod session;
pub mod store;

pub use config::Config;
pub use metrics::MetricsSink;
pub use queue::Queue;
pub use record::{Record, RecordsBlock};
pub use store::QueueStore;
