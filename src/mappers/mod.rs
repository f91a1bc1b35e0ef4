//! Per-source payload mappers
//!
//! One module per inbound schema. Each exposes a
//! `map(&serde_json::Value) -> Result<Vec<Measurement>, MapperError>`:
//! an empty vec means the payload had no usable entity anchor or value
//! and is silently dropped; a `MapperError` means the payload failed its
//! source schema (missing required fields, bad enum values, missing
//! time/ts) and belongs on the dead-letter topic as `mapper-throw`.
//!
//! Canonical-measurement validation happens after mapping, in the router,
//! so a bad item inside a fan-out list only skips that item.

pub mod device_health;
pub mod econ;
pub mod feed;
pub mod lab;
pub mod ops;
pub mod sensors;
pub mod sweep;
pub mod weather;

use crate::measurement::Measurement;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Source-schema rejection. Carries a human-readable reason for the DLQ.
#[derive(Debug)]
pub struct MapperError {
    pub message: String,
}

impl MapperError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for MapperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MapperError {}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Resolve the `time`/`ts` pair or reject the payload.
pub(crate) fn required_time(payload: &Value) -> Result<DateTime<Utc>, MapperError> {
    crate::timeparse::resolve_time_fields(payload)
        .ok_or_else(|| MapperError::new("time or ts must be present and parseable"))
}

/// Reject empty required identity fields (serde accepts empty strings).
pub(crate) fn require_non_empty(value: &str, field: &str) -> Result<(), MapperError> {
    if value.trim().is_empty() {
        Err(MapperError::new(format!("{} must be non-empty", field)))
    } else {
        Ok(())
    }
}

/// Build a measurement with the common shape mappers produce.
pub(crate) fn emit(
    tenant_id: &str,
    entity_id: &str,
    metric: String,
    value: f64,
    time: DateTime<Utc>,
    tags: &BTreeMap<String, String>,
) -> Measurement {
    Measurement {
        tenant_id: tenant_id.to_string(),
        entity_id: entity_id.to_string(),
        sensor_id: None,
        metric,
        value,
        time,
        tags: if tags.is_empty() {
            None
        } else {
            Some(tags.clone())
        },
    }
}

/// Insert `key -> value` when the optional is present.
pub(crate) fn tag_opt(tags: &mut BTreeMap<String, String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        tags.insert(key.to_string(), v.clone());
    }
}
