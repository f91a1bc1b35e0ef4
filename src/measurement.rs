//! Canonical measurement type shared by all source mappers
//!
//! Every inbound payload, whatever its shape, is reduced to this one
//! struct before touching the aggregation store. Metric names are
//! namespaced by source (`lab.*`, `sweep.*`, `ops.*`, `econ.*`, `feed.*`,
//! `weather.*`, `device.*`) so domains cannot collide.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub tenant_id: String,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    pub metric: String,
    pub value: f64,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

/// One structured validation failure, suitable for a dead-letter envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl Measurement {
    /// Validate against the canonical contract.
    ///
    /// Identity fields must be non-empty and the value finite. Returns all
    /// issues found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if self.tenant_id.trim().is_empty() {
            issues.push(ValidationIssue::new("tenant_id", "must be non-empty"));
        }
        if self.entity_id.trim().is_empty() {
            issues.push(ValidationIssue::new("entity_id", "must be non-empty"));
        }
        if self.metric.trim().is_empty() {
            issues.push(ValidationIssue::new("metric", "must be non-empty"));
        }
        if !self.value.is_finite() {
            issues.push(ValidationIssue::new("value", "must be a finite number"));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Timestamp truncated down to the start of its containing minute.
    pub fn minute_bucket(&self) -> DateTime<Utc> {
        // duration_trunc cannot fail for a one-minute granule
        self.time
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(self.time)
    }
}

/// Sanitize a free-form payload fragment for use inside a metric name.
///
/// Trims, lowercases, and collapses runs of characters outside
/// `[a-z0-9._-]` into a single underscore.
pub fn sanitize_metric_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sub = false;
    for c in raw.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' || c == '-' {
            out.push(c);
            last_was_sub = false;
        } else if !last_was_sub {
            out.push('_');
            last_was_sub = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_measurement() -> Measurement {
        Measurement {
            tenant_id: "t1".to_string(),
            entity_id: "d1".to_string(),
            sensor_id: None,
            metric: "temp".to_string(),
            value: 25.5,
            time: Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 30).unwrap(),
            tags: None,
        }
    }

    #[test]
    fn test_valid_measurement() {
        assert!(base_measurement().validate().is_ok());
    }

    #[test]
    fn test_empty_identity_fields() {
        let mut m = base_measurement();
        m.tenant_id = "".to_string();
        m.metric = "  ".to_string();

        let issues = m.validate().unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].field, "tenant_id");
        assert_eq!(issues[1].field, "metric");
    }

    #[test]
    fn test_non_finite_value() {
        let mut m = base_measurement();
        m.value = f64::NAN;
        let issues = m.validate().unwrap_err();
        assert_eq!(issues[0].field, "value");
    }

    #[test]
    fn test_minute_bucket_truncation() {
        let m = base_measurement();
        let bucket = m.minute_bucket();
        assert_eq!(bucket, Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 0).unwrap());

        let mut late = base_measurement();
        late.time = Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 59).unwrap();
        assert_eq!(late.minute_bucket(), bucket);
    }

    #[test]
    fn test_sanitize_metric_part() {
        assert_eq!(sanitize_metric_part("  Fan Speed/Change "), "fan_speed_change");
        assert_eq!(sanitize_metric_part("feeding"), "feeding");
        assert_eq!(sanitize_metric_part("a--b..c_d"), "a--b..c_d");
        assert_eq!(sanitize_metric_part("Crème brûlée!"), "cr_me_br_l_e_");
    }
}
