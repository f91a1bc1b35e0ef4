//! End-to-end pipeline tests: bus -> consumers -> router -> rollups ->
//! publisher -> outbound topic + cache.

use chrono::{Duration, TimeZone, Utc};
use farmflow::config::Config;
use farmflow::dlq::{DeadLetter, DeadLetterReason};
use farmflow::ingestion::spawn_consumers;
use farmflow::publisher::{FeaturePayload, FeaturePublisher};
use farmflow::store::{DimensionStore, FeatureStore};
use farmflow::{
    FeatureCache, InMemoryBus, InMemoryFeatureCache, MessageBus, Router, SqliteDimensionStore,
    SqliteFeatureStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::TempDir;
use tokio::sync::watch;

struct Harness {
    config: Config,
    bus: Arc<InMemoryBus>,
    features: Arc<SqliteFeatureStore>,
    router: Arc<Router>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();

    let features = Arc::new(SqliteFeatureStore::new(dir.path().join("analytics.db")).unwrap());
    let dimensions =
        Arc::new(SqliteDimensionStore::new(dir.path().join("analytics.db")).unwrap());
    let bus = Arc::new(InMemoryBus::new(config.channel_buffer));

    let router = Arc::new(Router::new(
        &config,
        features.clone() as Arc<dyn FeatureStore>,
        dimensions as Arc<dyn DimensionStore>,
        bus.clone() as Arc<dyn MessageBus>,
    ));

    Harness {
        config,
        bus,
        features,
        router,
        _dir: dir,
    }
}

async fn publish_json(bus: &InMemoryBus, topic: &str, payload: serde_json::Value) {
    bus.publish(topic, None, payload.to_string().into_bytes())
        .await
        .unwrap();
}

/// Poll until the rollup for (tenant, entity, metric) reaches `count`,
/// or fail after ~2 seconds.
async fn await_rollup_count(features: &SqliteFeatureStore, metric: &str, count: i64) {
    for _ in 0..200 {
        let rows = features
            .select_finalized(Utc::now() + Duration::days(1), Duration::days(2), 10_000)
            .await
            .unwrap();
        if rows
            .iter()
            .any(|r| r.metric == metric && r.count >= count)
        {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("rollup for {} never reached count {}", metric, count);
}

#[tokio::test]
async fn test_readings_flow_to_published_features() {
    let h = harness();
    let mut out_rx = h.bus.subscribe(&h.config.out_topic);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_consumers(&h.bus, h.router.clone(), &h.config, shutdown_rx);

    // two readings in one closed minute, per the worked example
    let t0 = Utc::now() - Duration::minutes(5);
    let bucket = Utc
        .timestamp_opt(t0.timestamp() - t0.timestamp() % 60, 0)
        .unwrap();
    for value in [25.5, 26.5] {
        publish_json(
            &h.bus,
            "sensors.device.readings",
            json!({
                "tenant_id": "t1", "device_id": "dev-1", "sensor_id": "s1",
                "metric": "temp.c", "value": value,
                "time": bucket.to_rfc3339(),
            }),
        )
        .await;
    }
    await_rollup_count(&h.features, "temp.c", 2).await;

    let cache = Arc::new(InMemoryFeatureCache::new());
    let publisher = FeaturePublisher::new(
        h.features.clone() as Arc<dyn FeatureStore>,
        h.bus.clone() as Arc<dyn MessageBus>,
        cache.clone(),
        h.config.out_topic.clone(),
        h.config.lookback_secs,
        h.config.publish_batch_limit,
        h.config.feature_ttl_secs,
    );
    let published = publisher.publish_finalized().await.unwrap();
    assert_eq!(published, 1);

    let msg = out_rx.recv().await.unwrap();
    assert_eq!(msg.key.as_deref(), Some("t1:dev-1:temp.c"));
    let payload: FeaturePayload = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(payload.count, 2);
    assert_eq!(payload.min, 25.5);
    assert_eq!(payload.max, 26.5);
    assert!((payload.avg - 26.0).abs() < 1e-9);
    assert!((payload.stddev - 0.5).abs() < 1e-9);
    assert_eq!(payload.window, "1m");

    // cache warm-up is fire-and-forget
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    let key = format!("feat:t1:dev-1:temp.c:{}", payload.bucket);
    assert!(cache.get(&key).await.unwrap().is_some());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_poison_messages_divert_and_flow_continues() {
    let h = harness();
    let mut dlq_rx = h.bus.subscribe(&h.config.dlq_topic);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_consumers(&h.bus, h.router.clone(), &h.config, shutdown_rx);

    // 1: not JSON at all
    h.bus
        .publish(
            "sensors.device.readings",
            None,
            b"this is not json".to_vec(),
        )
        .await
        .unwrap();

    // 2: JSON but fails the source schema (no tenant_id)
    publish_json(
        &h.bus,
        "sensors.device.readings",
        json!({"device_id": "d1", "metric": "m", "value": 1.0, "time": 1755659520}),
    )
    .await;

    // 3: a good reading afterwards still processes
    publish_json(
        &h.bus,
        "sensors.device.readings",
        json!({
            "tenant_id": "t1", "device_id": "d1",
            "metric": "rh.pct", "value": 60.0,
            "time": (Utc::now() - Duration::minutes(3)).to_rfc3339(),
        }),
    )
    .await;

    let first = dlq_rx.recv().await.unwrap();
    let first: DeadLetter = serde_json::from_slice(&first.payload).unwrap();
    assert_eq!(first.reason, DeadLetterReason::InvalidJson);
    assert_eq!(first.payload, json!("this is not json"));

    let second = dlq_rx.recv().await.unwrap();
    let second: DeadLetter = serde_json::from_slice(&second.payload).unwrap();
    assert_eq!(second.reason, DeadLetterReason::MapperThrow);
    assert!(second.error.is_some());

    await_rollup_count(&h.features, "rh.pct", 1).await;

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_fanout_sources_share_one_store() {
    let h = harness();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_consumers(&h.bus, h.router.clone(), &h.config, shutdown_rx);

    let t = (Utc::now() - Duration::minutes(5)).to_rfc3339();

    publish_json(
        &h.bus,
        "farms.operational.event.v1",
        json!({
            "tenant_id": "t1", "house_id": "h1",
            "category": "feeding", "type": "feed_load",
            "quantity": 250.0, "unit": "kg", "time": t,
        }),
    )
    .await;

    publish_json(
        &h.bus,
        "economics.cost.txn.v1",
        json!({
            "tenant_id": "t1", "house_id": "h1",
            "category": "feed", "amount": 100.0, "quantity": 4.0,
            "time": t,
        }),
    )
    .await;

    await_rollup_count(&h.features, "ops.feeding.feed_load.qty", 1).await;
    await_rollup_count(&h.features, "econ.txn.ppu", 1).await;

    let rows = h
        .features
        .select_finalized(Utc::now() + Duration::days(1), Duration::days(2), 10_000)
        .await
        .unwrap();
    let metrics: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
    assert!(metrics.contains(&"ops.feeding.feed_load.count"));
    assert!(metrics.contains(&"econ.category.feed.count"));
    assert!(metrics.contains(&"econ.txn.amount"));

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_snapshots_populate_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("analytics.db");
    let config = Config::default();

    let features = Arc::new(SqliteFeatureStore::new(&db_path).unwrap());
    let dimensions = Arc::new(SqliteDimensionStore::new(&db_path).unwrap());
    let bus = Arc::new(InMemoryBus::new(config.channel_buffer));
    let router = Arc::new(Router::new(
        &config,
        features as Arc<dyn FeatureStore>,
        dimensions as Arc<dyn DimensionStore>,
        bus.clone() as Arc<dyn MessageBus>,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_consumers(&bus, router, &config, shutdown_rx);

    publish_json(
        &bus,
        "farms.house.snapshot.v1",
        json!({
            "tenant_id": "t1", "house_id": "h1", "farm_id": "f1",
            "capacity": 30000.0, "updated_at": 1755659520,
        }),
    )
    .await;
    publish_json(
        &bus,
        "farms.flock.snapshot.v1",
        json!({
            "tenant_id": "t1", "flock_id": "fl-1", "house_id": "h1",
            "sex": "mixed", "population": 28000, "updated_at": 1755659520,
        }),
    )
    .await;

    // poll sqlite directly until both rows land
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let mut total = 0i64;
    for _ in 0..200 {
        total = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM dim_houses) + (SELECT COUNT(*) FROM dim_flocks)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        if total == 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(total, 2);

    let capacity: f64 = conn
        .query_row(
            "SELECT capacity FROM dim_houses WHERE tenant_id = 't1' AND house_id = 'h1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(capacity, 30000.0);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}
