//! Stream Runtime - analytics service entrypoint
//!
//! Wires the full pipeline: topic consumers feed the router, the router
//! merges canonical measurements into minute rollups, and a scheduler
//! publishes finalized feature payloads on a fixed cadence.
//!
//! Messages arrive on stdin as NDJSON envelopes, one per line:
//!   {"topic": "sensors.device.readings", "payload": {...}}
//! The bridge republishes each envelope onto the in-process bus; a real
//! broker client replaces the bridge without touching the pipeline.
//!
//! Usage:
//!   cargo run --release --bin stream_runtime
//!
//! Environment variables:
//!   ANALYTICS_DB_PATH   - SQLite database path (default: analytics.db)
//!   PUBLISH_INTERVAL_MS - Finalize/publish cadence (default: 10000)
//!   TENANT_FILTER       - Comma-separated tenant allowlist (default: all)
//!   TOPIC_*             - Per-source topic overrides

use dotenv::dotenv;
use farmflow::config::Config;
use farmflow::ingestion::spawn_consumers;
use farmflow::publisher::FeaturePublisher;
use farmflow::scheduler::publish_scheduler_task;
use farmflow::store::{DimensionStore, FeatureStore};
use farmflow::{
    InMemoryBus, InMemoryFeatureCache, MessageBus, Router, SqliteDimensionStore,
    SqliteFeatureStore,
};
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    payload: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    info!("🚀 Stream Runtime - telemetry analytics pipeline");

    let config = Config::from_env();

    // Unrecoverable: without the store there is nothing to run
    let features: Arc<dyn FeatureStore> = Arc::new(SqliteFeatureStore::new(&config.db_path)?);
    let dimensions: Arc<dyn DimensionStore> =
        Arc::new(SqliteDimensionStore::new(&config.db_path)?);

    let bus = Arc::new(InMemoryBus::new(config.channel_buffer));
    let cache = Arc::new(InMemoryFeatureCache::new());

    let router = Arc::new(Router::new(
        &config,
        features.clone(),
        dimensions,
        bus.clone() as Arc<dyn MessageBus>,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer_handles = spawn_consumers(&bus, router, &config, shutdown_rx.clone());
    info!("✅ {} topic consumers running", consumer_handles.len());

    let publisher = Arc::new(FeaturePublisher::new(
        features,
        bus.clone() as Arc<dyn MessageBus>,
        cache,
        config.out_topic.clone(),
        config.lookback_secs,
        config.publish_batch_limit,
        config.feature_ttl_secs,
    ));
    let scheduler_handle = tokio::spawn(publish_scheduler_task(
        publisher,
        config.publish_interval_ms,
        shutdown_rx,
    ));

    // stdin -> bus bridge
    let bridge_bus = bus.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Envelope>(&line) {
                        Ok(envelope) => {
                            let payload = envelope.payload.to_string().into_bytes();
                            if let Err(e) =
                                bridge_bus.publish(&envelope.topic, None, payload).await
                            {
                                error!("❌ Bridge publish failed: {}", e);
                            }
                        }
                        Err(e) => warn!("⚠️ Unparseable stdin envelope: {}", e),
                    }
                }
                Ok(None) => {
                    info!("📪 stdin closed, bridge stopped (pipeline keeps running)");
                    break;
                }
                Err(e) => {
                    error!("❌ stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️ Received CTRL+C, shutting down..."),
        Err(e) => error!("❌ Failed to listen for CTRL+C: {}", e),
    }

    // Signal shutdown and give in-flight work a bounded grace period
    let _ = shutdown_tx.send(true);

    let drain = async {
        for handle in consumer_handles {
            let _ = handle.await;
        }
        let _ = scheduler_handle.await;
    };
    if tokio::time::timeout(std::time::Duration::from_secs(10), drain)
        .await
        .is_err()
    {
        warn!("⚠️ Drain timed out, exiting anyway");
    }

    info!("✅ Stream runtime stopped");
    Ok(())
}
