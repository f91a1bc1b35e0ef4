//! Device health heartbeats -> `device.health.up` gauge

use super::{emit, require_non_empty, required_time, MapperError};
use crate::measurement::Measurement;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct HealthPayload {
    tenant_id: String,
    device_id: String,
    status: Option<String>,
}

/// Boolean status mapped to 1 (up) / 0 (down or degraded). Payloads
/// without a recognized status carry no usable value and are dropped.
pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: HealthPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.device_id, "device_id")?;
    let time = required_time(payload)?;

    let value = match d.status.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "up" => 1.0,
        Some(s) if s == "down" || s == "degraded" => 0.0,
        _ => return Ok(Vec::new()),
    };

    let tags = BTreeMap::new();
    Ok(vec![emit(
        &d.tenant_id,
        &d.device_id,
        "device.health.up".to_string(),
        value,
        time,
        &tags,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_up_maps_to_one() {
        let out = map(&json!({
            "tenant_id": "t1", "device_id": "d1",
            "status": "up", "time": "2025-08-20T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metric, "device.health.up");
        assert_eq!(out[0].value, 1.0);
    }

    #[test]
    fn test_down_and_degraded_map_to_zero() {
        for status in ["down", "degraded", "DOWN"] {
            let out = map(&json!({
                "tenant_id": "t1", "device_id": "d1",
                "status": status, "ts": 1755659520
            }))
            .unwrap();
            assert_eq!(out[0].value, 0.0, "status {}", status);
        }
    }

    #[test]
    fn test_missing_status_dropped() {
        let out = map(&json!({
            "tenant_id": "t1", "device_id": "d1", "time": 1755659520
        }))
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_status_dropped() {
        let out = map(&json!({
            "tenant_id": "t1", "device_id": "d1",
            "status": "rebooting", "time": 1755659520
        }))
        .unwrap();
        assert!(out.is_empty());
    }
}
