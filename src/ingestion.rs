//! Topic consumers
//!
//! One task per subscribed topic, processing that topic's messages
//! strictly in order. A global semaphore caps how many messages are in
//! flight across all topics at once. Rollup-store failures redeliver the
//! same message with bounded exponential backoff; every other failure
//! class was already diverted to the dead-letter topic inside the router.

use crate::backoff::RetryPolicy;
use crate::bus::{BusMessage, InMemoryBus};
use crate::config::Config;
use crate::router::Router;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl RetrySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay_ms: config.retry_base_ms,
            max_delay_ms: config.retry_max_ms,
            max_attempts: config.retry_max_attempts,
        }
    }
}

/// Subscribe a consumer task for every topic the router handles.
pub fn spawn_consumers(
    bus: &InMemoryBus,
    router: Arc<Router>,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let permits = Arc::new(Semaphore::new(config.consumer_concurrency));
    let retry = RetrySettings::from_config(config);

    let mut topics = router.topics();
    topics.sort();

    topics
        .into_iter()
        .map(|topic| {
            let rx = bus.subscribe(&topic);
            tokio::spawn(topic_consumer_task(
                topic,
                rx,
                router.clone(),
                permits.clone(),
                retry,
                shutdown.clone(),
            ))
        })
        .collect()
}

/// Drain one topic sequentially until shutdown or channel close.
pub async fn topic_consumer_task(
    topic: String,
    mut rx: mpsc::Receiver<BusMessage>,
    router: Arc<Router>,
    permits: Arc<Semaphore>,
    retry: RetrySettings,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("🚚 Consumer started for topic: {}", topic);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        let permit = match permits.acquire().await {
                            Ok(p) => p,
                            Err(_) => break, // semaphore closed, shutting down
                        };
                        process_with_retry(&topic, &router, &msg, retry).await;
                        drop(permit);
                    }
                    None => {
                        info!("🚚 Topic channel closed: {}", topic);
                        break;
                    }
                }
            }
            changed = shutdown.changed() => {
                // a dropped sender counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    info!("🚚 Consumer stopping for topic: {}", topic);
                    break;
                }
            }
        }
    }
}

/// Dispatch one message, redelivering on rollup-store failure until the
/// retry budget runs out. Exhaustion drops the message with an error log;
/// there is nothing safe left to do with it.
async fn process_with_retry(topic: &str, router: &Router, msg: &BusMessage, retry: RetrySettings) {
    let mut policy = RetryPolicy::new(retry.base_delay_ms, retry.max_delay_ms, retry.max_attempts);

    loop {
        match router.dispatch(topic, &msg.payload).await {
            Ok(()) => return,
            Err(e) => {
                warn!("⚠️ Dispatch failed on {}: {}", topic, e);
                if policy.wait().await.is_err() {
                    error!(
                        "❌ Retries exhausted on {}, dropping message ({} bytes)",
                        topic,
                        msg.payload.len()
                    );
                    return;
                }
            }
        }
    }
}
