//! Streaming telemetry normalization and per-minute feature aggregation
//!
//! Raw source payloads come in per topic, get mapped to canonical
//! measurements, and fold into sufficient-statistic rollups keyed by
//! minute bucket. A scheduler publishes closed buckets as derived
//! feature payloads and warms a TTL cache. Anything unprocessable is
//! preserved on a dead-letter topic.

pub mod backoff;
pub mod bus;
pub mod cache;
pub mod config;
pub mod dlq;
pub mod ingestion;
pub mod mappers;
pub mod measurement;
pub mod publisher;
pub mod router;
pub mod scheduler;
pub mod snapshots;
pub mod stats;
pub mod store;
pub mod timeparse;

pub use bus::{BusMessage, InMemoryBus, MessageBus};
pub use cache::{FeatureCache, InMemoryFeatureCache};
pub use config::Config;
pub use measurement::Measurement;
pub use publisher::FeaturePublisher;
pub use router::Router;
pub use store::{
    DimensionStore, FeatureStore, SqliteDimensionStore, SqliteFeatureStore,
};
