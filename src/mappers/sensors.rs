//! Device sensor readings, already close to canonical shape

use super::{require_non_empty, required_time, tag_opt, MapperError};
use crate::measurement::Measurement;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct SensorPayload {
    tenant_id: String,
    device_id: String,
    sensor_id: Option<String>,
    quality: Option<String>,
    metric: String,
    value: f64,
    tags: Option<BTreeMap<String, String>>,
}

/// One reading in, one measurement out. The metric name passes through
/// unprefixed; sensor id and quality fold into tags.
pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: SensorPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.device_id, "device_id")?;
    require_non_empty(&d.metric, "metric")?;
    let time = required_time(payload)?;

    let mut tags = d.tags.unwrap_or_default();
    tag_opt(&mut tags, "sensor_id", &d.sensor_id);
    tag_opt(&mut tags, "quality", &d.quality);

    Ok(vec![Measurement {
        tenant_id: d.tenant_id,
        entity_id: d.device_id,
        sensor_id: d.sensor_id,
        metric: d.metric,
        value: d.value,
        time,
        tags: if tags.is_empty() { None } else { Some(tags) },
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_reading() {
        let payload = json!({
            "tenant_id": "t1",
            "device_id": "d1",
            "sensor_id": "s7",
            "metric": "temp",
            "value": 25.5,
            "time": "2025-08-20T00:00:30Z"
        });

        let out = map(&payload).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metric, "temp");
        assert_eq!(out[0].entity_id, "d1");
        assert_eq!(out[0].sensor_id.as_deref(), Some("s7"));
        assert_eq!(out[0].tags.as_ref().unwrap()["sensor_id"], "s7");
    }

    #[test]
    fn test_ts_epoch_accepted() {
        let payload = json!({
            "tenant_id": "t1",
            "device_id": "d1",
            "metric": "rh",
            "value": 61.0,
            "ts": 1755659520
        });

        let out = map(&payload).unwrap();
        assert_eq!(out[0].time.timestamp(), 1755659520);
        assert!(out[0].tags.is_none());
    }

    #[test]
    fn test_missing_value_rejected() {
        let payload = json!({
            "tenant_id": "t1",
            "device_id": "d1",
            "metric": "temp",
            "time": "2025-08-20T00:00:30Z"
        });
        assert!(map(&payload).is_err());
    }

    #[test]
    fn test_missing_time_rejected() {
        let payload = json!({
            "tenant_id": "t1",
            "device_id": "d1",
            "metric": "temp",
            "value": 1.0
        });
        assert!(map(&payload).is_err());
    }

    #[test]
    fn test_empty_tenant_rejected() {
        let payload = json!({
            "tenant_id": "",
            "device_id": "d1",
            "metric": "temp",
            "value": 1.0,
            "time": 1755659520
        });
        assert!(map(&payload).is_err());
    }
}
