//! Topic routing and the normalize -> validate -> merge flow
//!
//! Every raw message lands here. Measurement topics run the three-stage
//! funnel (JSON parse, mapper, per-measurement validation) where each
//! stage diverts failures to the dead-letter topic instead of raising.
//! Snapshot topics skip the funnel and upsert dimensions directly. Only
//! a rollup-store failure escapes as an error, so the consumer can
//! retry the message instead of consuming it.

use crate::bus::MessageBus;
use crate::config::Config;
use crate::dlq::{publish_dead_letter, DeadLetter};
use crate::mappers;
use crate::measurement::Measurement;
use crate::snapshots;
use crate::store::{DimensionStore, FeatureStore, StoreError};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Sensors,
    DeviceHealth,
    Lab,
    Sweep,
    Weather,
    Ops,
    FeedBatch,
    FeedQuality,
    EconTxn,
    DeviceSnapshot,
    FarmSnapshot,
    HouseSnapshot,
    FlockSnapshot,
}

impl SourceKind {
    fn is_snapshot(&self) -> bool {
        matches!(
            self,
            SourceKind::DeviceSnapshot
                | SourceKind::FarmSnapshot
                | SourceKind::HouseSnapshot
                | SourceKind::FlockSnapshot
        )
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Store(StoreError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Store(e) => write!(f, "rollup store failure: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

pub struct Router {
    routes: HashMap<String, SourceKind>,
    features: Arc<dyn FeatureStore>,
    dimensions: Arc<dyn DimensionStore>,
    bus: Arc<dyn MessageBus>,
    dlq_topic: String,
    tenant_filter: Vec<String>,
}

impl Router {
    pub fn new(
        config: &Config,
        features: Arc<dyn FeatureStore>,
        dimensions: Arc<dyn DimensionStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        let t = &config.topics;
        let pairs = [
            (&t.sensors, SourceKind::Sensors),
            (&t.device_health, SourceKind::DeviceHealth),
            (&t.lab, SourceKind::Lab),
            (&t.sweep, SourceKind::Sweep),
            (&t.weather, SourceKind::Weather),
            (&t.ops, SourceKind::Ops),
            (&t.feed_batch, SourceKind::FeedBatch),
            (&t.feed_quality, SourceKind::FeedQuality),
            (&t.econ_txn, SourceKind::EconTxn),
            (&t.device_snapshot, SourceKind::DeviceSnapshot),
            (&t.farm_snapshot, SourceKind::FarmSnapshot),
            (&t.house_snapshot, SourceKind::HouseSnapshot),
            (&t.flock_snapshot, SourceKind::FlockSnapshot),
        ];

        // a topic configured to the empty string is disabled
        let routes = pairs
            .into_iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, kind)| (name.clone(), kind))
            .collect();

        Self {
            routes,
            features,
            dimensions,
            bus,
            dlq_topic: config.dlq_topic.clone(),
            tenant_filter: config.tenant_filter.clone(),
        }
    }

    /// Topics this router knows how to handle, for consumer subscription.
    pub fn topics(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    fn tenant_allowed(&self, tenant_id: &str) -> bool {
        self.tenant_filter.is_empty() || self.tenant_filter.iter().any(|t| t == tenant_id)
    }

    pub async fn dispatch(&self, topic: &str, raw: &[u8]) -> Result<(), DispatchError> {
        let Some(kind) = self.routes.get(topic).copied() else {
            warn!("⚠️ No handler registered for topic {}, dropping message", topic);
            return Ok(());
        };

        if kind.is_snapshot() {
            self.handle_snapshot(kind, topic, raw).await
        } else {
            self.handle_measurements(kind, raw).await
        }
    }

    async fn handle_measurements(
        &self,
        kind: SourceKind,
        raw: &[u8],
    ) -> Result<(), DispatchError> {
        let payload: Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(e) => {
                let record =
                    DeadLetter::invalid_json(e.to_string(), &String::from_utf8_lossy(raw));
                publish_dead_letter(self.bus.as_ref(), &self.dlq_topic, &record).await;
                return Ok(());
            }
        };

        let mapped = match map_for(kind, &payload) {
            Ok(list) => list,
            Err(e) => {
                let record = DeadLetter::mapper_throw(e.to_string(), payload);
                publish_dead_letter(self.bus.as_ref(), &self.dlq_topic, &record).await;
                return Ok(());
            }
        };

        for measurement in mapped {
            if !self.tenant_allowed(&measurement.tenant_id) {
                debug!("🔇 Skipping measurement for filtered tenant {}", measurement.tenant_id);
                continue;
            }

            if let Err(issues) = measurement.validate() {
                let payload = serde_json::to_value(&measurement).unwrap_or(Value::Null);
                let record = DeadLetter::invalid_measurement(issues, payload);
                publish_dead_letter(self.bus.as_ref(), &self.dlq_topic, &record).await;
                continue;
            }

            self.features
                .merge(&measurement)
                .await
                .map_err(DispatchError::Store)?;
        }

        Ok(())
    }

    async fn handle_snapshot(
        &self,
        kind: SourceKind,
        topic: &str,
        raw: &[u8],
    ) -> Result<(), DispatchError> {
        let payload: Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("⚠️ Unparseable snapshot on {}: {}", topic, e);
                return Ok(());
            }
        };

        let result = match kind {
            SourceKind::DeviceSnapshot => match snapshots::parse_device(&payload) {
                Ok(snap) => {
                    if !self.tenant_allowed(&snap.tenant_id) {
                        return Ok(());
                    }
                    self.dimensions.upsert_device(&snap).await
                }
                Err(e) => {
                    warn!("⚠️ Invalid device snapshot on {}: {}", topic, e);
                    return Ok(());
                }
            },
            SourceKind::FarmSnapshot => match snapshots::parse_farm(&payload) {
                Ok(snap) => {
                    if !self.tenant_allowed(&snap.tenant_id) {
                        return Ok(());
                    }
                    self.dimensions.upsert_farm(&snap).await
                }
                Err(e) => {
                    warn!("⚠️ Invalid farm snapshot on {}: {}", topic, e);
                    return Ok(());
                }
            },
            SourceKind::HouseSnapshot => match snapshots::parse_house(&payload) {
                Ok(snap) => {
                    if !self.tenant_allowed(&snap.tenant_id) {
                        return Ok(());
                    }
                    self.dimensions.upsert_house(&snap).await
                }
                Err(e) => {
                    warn!("⚠️ Invalid house snapshot on {}: {}", topic, e);
                    return Ok(());
                }
            },
            SourceKind::FlockSnapshot => match snapshots::parse_flock(&payload) {
                Ok(snap) => {
                    if !self.tenant_allowed(&snap.tenant_id) {
                        return Ok(());
                    }
                    self.dimensions.upsert_flock(&snap).await
                }
                Err(e) => {
                    warn!("⚠️ Invalid flock snapshot on {}: {}", topic, e);
                    return Ok(());
                }
            },
            _ => unreachable!("non-snapshot kind in snapshot handler"),
        };

        if let Err(e) = result {
            // dimensions are best-effort; the next snapshot will catch up
            warn!("⚠️ Dimension upsert failed on {}: {}", topic, e);
        }

        Ok(())
    }
}

fn map_for(kind: SourceKind, payload: &Value) -> Result<Vec<Measurement>, mappers::MapperError> {
    match kind {
        SourceKind::Sensors => mappers::sensors::map(payload),
        SourceKind::DeviceHealth => mappers::device_health::map(payload),
        SourceKind::Lab => mappers::lab::map(payload),
        SourceKind::Sweep => mappers::sweep::map(payload),
        SourceKind::Weather => mappers::weather::map(payload),
        SourceKind::Ops => mappers::ops::map(payload),
        SourceKind::FeedBatch => mappers::feed::map_batch(payload),
        SourceKind::FeedQuality => mappers::feed::map_quality(payload),
        SourceKind::EconTxn => mappers::econ::map(payload),
        _ => Ok(Vec::new()),
    }
}
