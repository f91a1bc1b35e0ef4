//! Runtime configuration from environment variables

use log::info;
use std::env;

/// Topic names for every ingested source. An empty string disables the
/// topic.
#[derive(Debug, Clone)]
pub struct Topics {
    pub sensors: String,
    pub device_health: String,
    pub lab: String,
    pub sweep: String,
    pub weather: String,
    pub ops: String,
    pub feed_batch: String,
    pub feed_quality: String,
    pub econ_txn: String,
    pub device_snapshot: String,
    pub farm_snapshot: String,
    pub house_snapshot: String,
    pub flock_snapshot: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path for rollups and dimensions
    pub db_path: String,
    /// Per-topic channel buffer size
    pub channel_buffer: usize,
    /// Global cap on messages processed concurrently across all topics
    pub consumer_concurrency: usize,
    /// Finalize/publish cadence in milliseconds
    pub publish_interval_ms: u64,
    /// How far back the publish query scans, in seconds
    pub lookback_secs: u64,
    /// Max rollup rows fetched per publish cycle
    pub publish_batch_limit: u32,
    /// TTL for cached feature payloads, in seconds
    pub feature_ttl_secs: u64,
    /// Merge retry backoff: base delay, cap, attempt budget
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_max_attempts: u32,
    pub topics: Topics,
    /// Outbound topic for finalized feature payloads
    pub out_topic: String,
    /// Dead-letter topic
    pub dlq_topic: String,
    /// When non-empty, only these tenants are processed
    pub tenant_filter: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "analytics.db".to_string(),
            channel_buffer: 10_000,
            consumer_concurrency: 6,
            publish_interval_ms: 10_000,
            lookback_secs: 7_200,
            publish_batch_limit: 2_000,
            feature_ttl_secs: 86_400,
            retry_base_ms: 200,
            retry_max_ms: 10_000,
            retry_max_attempts: 8,
            topics: Topics {
                sensors: "sensors.device.readings".to_string(),
                device_health: "sensors.device.health.v1".to_string(),
                lab: "sensors.lab.readings.v1".to_string(),
                sweep: "sensors.sweep.readings.v1".to_string(),
                weather: "external.weather.observation.v1".to_string(),
                ops: "farms.operational.event.v1".to_string(),
                feed_batch: "feed.batch.created.v1".to_string(),
                feed_quality: "feed.quality.result.v1".to_string(),
                econ_txn: "economics.cost.txn.v1".to_string(),
                device_snapshot: "devices.device.snapshot.v1".to_string(),
                farm_snapshot: "farms.farm.snapshot.v1".to_string(),
                house_snapshot: "farms.house.snapshot.v1".to_string(),
                flock_snapshot: "farms.flock.snapshot.v1".to_string(),
            },
            out_topic: "analytics.features".to_string(),
            dlq_topic: "analytics.invalid-readings".to_string(),
            tenant_filter: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let config = Self {
            db_path: env_or("ANALYTICS_DB_PATH", &defaults.db_path),
            channel_buffer: env_parse("BUS_CHANNEL_BUFFER", defaults.channel_buffer),
            consumer_concurrency: env_parse("CONSUMER_CONCURRENCY", defaults.consumer_concurrency),
            publish_interval_ms: env_parse("PUBLISH_INTERVAL_MS", defaults.publish_interval_ms),
            lookback_secs: env_parse("PUBLISH_LOOKBACK_SECS", defaults.lookback_secs),
            publish_batch_limit: env_parse("PUBLISH_BATCH_LIMIT", defaults.publish_batch_limit),
            feature_ttl_secs: env_parse("FEATURE_TTL_SECONDS", defaults.feature_ttl_secs),
            retry_base_ms: env_parse("MERGE_RETRY_BASE_MS", defaults.retry_base_ms),
            retry_max_ms: env_parse("MERGE_RETRY_MAX_MS", defaults.retry_max_ms),
            retry_max_attempts: env_parse("MERGE_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            topics: Topics {
                sensors: env_or("TOPIC_SENSORS", &defaults.topics.sensors),
                device_health: env_or("TOPIC_DEVICE_HEALTH", &defaults.topics.device_health),
                lab: env_or("TOPIC_LAB", &defaults.topics.lab),
                sweep: env_or("TOPIC_SWEEP", &defaults.topics.sweep),
                weather: env_or("TOPIC_WEATHER", &defaults.topics.weather),
                ops: env_or("TOPIC_OPS_EVENT", &defaults.topics.ops),
                feed_batch: env_or("TOPIC_FEED_BATCH", &defaults.topics.feed_batch),
                feed_quality: env_or("TOPIC_FEED_QUALITY", &defaults.topics.feed_quality),
                econ_txn: env_or("TOPIC_ECON_TXN", &defaults.topics.econ_txn),
                device_snapshot: env_or("TOPIC_DEVICE_SNAPSHOT", &defaults.topics.device_snapshot),
                farm_snapshot: env_or("TOPIC_FARM_SNAPSHOT", &defaults.topics.farm_snapshot),
                house_snapshot: env_or("TOPIC_HOUSE_SNAPSHOT", &defaults.topics.house_snapshot),
                flock_snapshot: env_or("TOPIC_FLOCK_SNAPSHOT", &defaults.topics.flock_snapshot),
            },
            out_topic: env_or("TOPIC_OUT", &defaults.out_topic),
            dlq_topic: env_or("TOPIC_DLQ", &defaults.dlq_topic),
            tenant_filter: env_csv("TENANT_FILTER"),
        };

        info!("🔧 Configuration loaded:");
        info!("   Database: {}", config.db_path);
        info!(
            "   Publish: every {}ms, lookback {}s, batch {}",
            config.publish_interval_ms, config.lookback_secs, config.publish_batch_limit
        );
        info!("   Concurrency: {} in-flight messages", config.consumer_concurrency);
        if config.tenant_filter.is_empty() {
            info!("   Tenant filter: (all tenants)");
        } else {
            info!("   Tenant filter: {:?}", config.tenant_filter);
        }

        config
    }
}
