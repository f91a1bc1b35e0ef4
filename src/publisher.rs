//! Finalized feature publishing
//!
//! Each cycle fetches closed minute rollups, derives mean and standard
//! deviation from the stored sufficient statistics, and emits one JSON
//! payload per rollup on the outbound topic, keyed so one series lands on
//! one partition. Cache writes are fire-and-forget; a cold cache means a
//! slower read path, not a broken pipeline.

use crate::bus::MessageBus;
use crate::cache::FeatureCache;
use crate::stats;
use crate::store::{FeatureStore, MinuteFeatureRow};
use chrono::{Duration, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Outbound payload for one finalized (bucket, tenant, entity, metric).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub bucket: String,
    pub tenant_id: String,
    pub entity_id: String,
    pub metric: String,
    pub count: i64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub stddev: f64,
    pub window: String,
}

impl FeaturePayload {
    fn from_row(row: &MinuteFeatureRow) -> Self {
        let derived = stats::derive(row.count, row.sum, row.sumsq);
        Self {
            bucket: row.bucket.to_rfc3339_opts(SecondsFormat::Millis, true),
            tenant_id: row.tenant_id.clone(),
            entity_id: row.entity_id.clone(),
            metric: row.metric.clone(),
            count: row.count,
            min: row.min,
            max: row.max,
            avg: derived.mean,
            stddev: derived.stddev,
            window: "1m".to_string(),
        }
    }

    /// Partition key: one per series, so a series never splits across
    /// partitions.
    fn partition_key(&self) -> String {
        format!("{}:{}:{}", self.tenant_id, self.entity_id, self.metric)
    }

    fn cache_key(&self) -> String {
        format!(
            "feat:{}:{}:{}:{}",
            self.tenant_id, self.entity_id, self.metric, self.bucket
        )
    }
}

pub struct FeaturePublisher {
    store: Arc<dyn FeatureStore>,
    bus: Arc<dyn MessageBus>,
    cache: Arc<dyn FeatureCache>,
    out_topic: String,
    lookback: Duration,
    batch_limit: u32,
    cache_ttl: StdDuration,
}

impl FeaturePublisher {
    pub fn new(
        store: Arc<dyn FeatureStore>,
        bus: Arc<dyn MessageBus>,
        cache: Arc<dyn FeatureCache>,
        out_topic: String,
        lookback_secs: u64,
        batch_limit: u32,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            bus,
            cache,
            out_topic,
            lookback: Duration::seconds(lookback_secs as i64),
            batch_limit,
            cache_ttl: StdDuration::from_secs(cache_ttl_secs),
        }
    }

    /// Run one publish cycle. Returns the number of payloads published.
    pub async fn publish_finalized(
        &self,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let rows = self
            .store
            .select_finalized(Utc::now(), self.lookback, self.batch_limit)
            .await?;

        if rows.is_empty() {
            debug!("🔎 No finalized rollups this cycle");
            return Ok(0);
        }

        let mut published = 0;
        for row in &rows {
            let payload = FeaturePayload::from_row(row);
            let body = serde_json::to_string(&payload)?;

            self.bus
                .publish(
                    &self.out_topic,
                    Some(payload.partition_key()),
                    body.clone().into_bytes(),
                )
                .await?;
            published += 1;

            let cache = self.cache.clone();
            let key = payload.cache_key();
            let ttl = self.cache_ttl;
            tokio::spawn(async move {
                if let Err(e) = cache.set_with_ttl(&key, body, ttl).await {
                    warn!("⚠️ Feature cache write failed ({}): {}", key, e);
                }
            });
        }

        info!("📤 Published {} finalized feature payloads", published);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::cache::InMemoryFeatureCache;
    use crate::measurement::Measurement;
    use crate::store::SqliteFeatureStore;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;
    use tempfile::tempdir;

    fn measurement(value: f64, time: DateTime<Utc>) -> Measurement {
        serde_json::from_value(json!({
            "tenant_id": "t1",
            "entity_id": "house-3",
            "metric": "temp.c",
            "value": value,
            "time": time.to_rfc3339(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_derives_and_caches() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());
        let mut out_rx = bus.subscribe("analytics.features");

        // two readings in a minute that closed well before now
        let t = Utc::now() - Duration::minutes(5);
        store.merge(&measurement(25.5, t)).await.unwrap();
        store.merge(&measurement(26.5, t)).await.unwrap();

        let publisher = FeaturePublisher::new(
            store,
            bus.clone(),
            cache.clone(),
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        );

        let n = publisher.publish_finalized().await.unwrap();
        assert_eq!(n, 1);

        let msg = out_rx.recv().await.unwrap();
        assert_eq!(msg.key.as_deref(), Some("t1:house-3:temp.c"));

        let payload: FeaturePayload = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(payload.count, 2);
        assert_eq!(payload.min, 25.5);
        assert_eq!(payload.max, 26.5);
        assert!((payload.avg - 26.0).abs() < 1e-9);
        assert!((payload.stddev - 0.5).abs() < 1e-9);
        assert_eq!(payload.window, "1m");
        assert!(payload.bucket.ends_with("Z"));

        // cache write is spawned; give it a beat
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let cached = cache
            .get(&format!(
                "feat:t1:house-3:temp.c:{}",
                payload.bucket
            ))
            .await
            .unwrap();
        assert!(cached.is_some());
    }

    struct BrokenCache;

    #[async_trait::async_trait]
    impl FeatureCache for BrokenCache {
        async fn set_with_ttl(
            &self,
            _key: &str,
            _value: String,
            _ttl: StdDuration,
        ) -> Result<(), crate::cache::CacheError> {
            Err(crate::cache::CacheError::Backend("cache offline".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, crate::cache::CacheError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_publish() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let mut out_rx = bus.subscribe("analytics.features");

        let t = Utc::now() - Duration::minutes(5);
        store.merge(&measurement(25.5, t)).await.unwrap();

        let publisher = FeaturePublisher::new(
            store,
            bus.clone(),
            Arc::new(BrokenCache),
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        );

        let n = publisher.publish_finalized().await.unwrap();
        assert_eq!(n, 1);

        let msg = out_rx.recv().await.unwrap();
        let payload: FeaturePayload = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(payload.count, 1);
    }

    #[tokio::test]
    async fn test_empty_cycle_publishes_nothing() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());

        let publisher = FeaturePublisher::new(
            store,
            bus,
            cache,
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        );
        assert_eq!(publisher.publish_finalized().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_minute_not_published() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());

        store.merge(&measurement(20.0, Utc::now())).await.unwrap();

        let publisher = FeaturePublisher::new(
            store,
            bus,
            cache,
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        );
        assert_eq!(publisher.publish_finalized().await.unwrap(), 0);
    }

    #[test]
    fn test_singleton_stddev_is_zero() {
        let row = MinuteFeatureRow {
            bucket: Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 0).unwrap(),
            tenant_id: "t1".to_string(),
            entity_id: "e1".to_string(),
            metric: "m".to_string(),
            count: 1,
            sum: 10.0,
            min: 10.0,
            max: 10.0,
            sumsq: 100.0,
        };
        let payload = FeaturePayload::from_row(&row);
        assert_eq!(payload.stddev, 0.0);
        assert_eq!(payload.avg, 10.0);
        assert_eq!(payload.bucket, "2025-08-20T00:00:00.000Z");
    }
}
