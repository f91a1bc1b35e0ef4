//! Dead-letter records
//!
//! Messages that cannot be processed are preserved on a side topic for
//! inspection instead of crashing the consumer or vanishing. Nothing here
//! retries; the DLQ publish itself is best-effort.

use crate::bus::MessageBus;
use crate::measurement::ValidationIssue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterReason {
    #[serde(rename = "invalid-json")]
    InvalidJson,
    #[serde(rename = "mapper-throw")]
    MapperThrow,
    #[serde(rename = "invalid-measurement")]
    InvalidMeasurement,
}

/// Envelope written to the dead-letter topic: `{reason, error|issues, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub reason: DeadLetterReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ValidationIssue>>,
    pub payload: Value,
}

impl DeadLetter {
    /// Raw bytes failed to parse as JSON; payload is the raw string.
    pub fn invalid_json(error: String, raw: &str) -> Self {
        Self {
            reason: DeadLetterReason::InvalidJson,
            error: Some(error),
            issues: None,
            payload: Value::String(raw.to_string()),
        }
    }

    /// Mapper rejected the parsed payload (schema or refinement failure).
    pub fn mapper_throw(error: String, payload: Value) -> Self {
        Self {
            reason: DeadLetterReason::MapperThrow,
            error: Some(error),
            issues: None,
            payload,
        }
    }

    /// A produced candidate failed canonical measurement validation.
    pub fn invalid_measurement(issues: Vec<ValidationIssue>, payload: Value) -> Self {
        Self {
            reason: DeadLetterReason::InvalidMeasurement,
            error: None,
            issues: Some(issues),
            payload,
        }
    }
}

/// Publish a dead-letter record, best-effort.
///
/// A DLQ publish failure is logged and swallowed so an unavailable DLQ
/// cannot cascade into the consumption loop.
pub async fn publish_dead_letter(bus: &dyn MessageBus, topic: &str, record: &DeadLetter) {
    let payload = match serde_json::to_vec(record) {
        Ok(p) => p,
        Err(e) => {
            log::error!("❌ Failed to serialize dead-letter record: {}", e);
            return;
        }
    };

    if let Err(e) = bus.publish(topic, None, payload).await {
        log::error!("❌ DLQ publish failed (topic: {}): {}", topic, e);
    }
}
