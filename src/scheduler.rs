//! Periodic finalize/publish ticker
//!
//! One tick runs one publish cycle to completion before the next tick is
//! considered, so a slow cycle can never overlap itself. A failed cycle
//! is logged and the cadence continues.

use crate::publisher::FeaturePublisher;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

pub async fn publish_scheduler_task(
    publisher: Arc<FeaturePublisher>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("⏰ Publish scheduler started (every {}ms)", interval_ms);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = publisher.publish_finalized().await {
                    error!("❌ Publish cycle failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                // a dropped sender counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    info!("⏰ Publish scheduler stopping");
                    break;
                }
            }
        }
    }

    // one last cycle so buckets closed during drain still go out
    if let Err(e) = publisher.publish_finalized().await {
        error!("❌ Final publish cycle failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, MessageBus};
    use crate::cache::InMemoryFeatureCache;
    use crate::measurement::Measurement;
    use crate::store::{FeatureStore, MinuteFeatureRow, SqliteFeatureStore, StoreError};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scheduler_publishes_and_stops() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());
        let mut out_rx = bus.subscribe("analytics.features");

        let m: Measurement = serde_json::from_value(json!({
            "tenant_id": "t1", "entity_id": "e1", "metric": "m",
            "value": 5.0,
            "time": (Utc::now() - ChronoDuration::minutes(3)).to_rfc3339(),
        }))
        .unwrap();
        store.merge(&m).await.unwrap();

        let publisher = Arc::new(FeaturePublisher::new(
            store,
            bus.clone() as Arc<dyn MessageBus>,
            cache,
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(publish_scheduler_task(publisher, 20, shutdown_rx));

        let msg = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("scheduler never published")
            .expect("bus closed");
        assert_eq!(msg.topic, "analytics.features");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    /// Store whose finalized-select takes longer than the tick interval
    /// and records whether two cycles ever ran at once.
    struct SlowStore {
        active: AtomicUsize,
        overlapped: AtomicBool,
        cycles: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FeatureStore for SlowStore {
        async fn merge(&self, _measurement: &Measurement) -> Result<(), StoreError> {
            Ok(())
        }

        async fn select_finalized(
            &self,
            _now: chrono::DateTime<Utc>,
            _lookback: ChronoDuration,
            _limit: u32,
        ) -> Result<Vec<MinuteFeatureRow>, StoreError> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        let store = Arc::new(SlowStore {
            active: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            cycles: AtomicUsize::new(0),
        });
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());

        let publisher = Arc::new(FeaturePublisher::new(
            store.clone() as Arc<dyn FeatureStore>,
            bus as Arc<dyn MessageBus>,
            cache,
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        ));

        // each cycle takes ~50ms against a 10ms tick interval
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(publish_scheduler_task(publisher, 10, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(store.cycles.load(Ordering::SeqCst) >= 2);
        assert!(!store.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_scheduler() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteFeatureStore::new(dir.path().join("f.db")).unwrap());
        let bus = Arc::new(InMemoryBus::new(64));
        let cache = Arc::new(InMemoryFeatureCache::new());

        let publisher = Arc::new(FeaturePublisher::new(
            store as Arc<dyn FeatureStore>,
            bus as Arc<dyn MessageBus>,
            cache,
            "analytics.features".to_string(),
            7_200,
            2_000,
            86_400,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(publish_scheduler_task(publisher, 20, shutdown_rx));

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop after sender drop")
            .unwrap();
    }
}
