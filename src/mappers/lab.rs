//! Lab station readings -> `lab.*`

use super::{require_non_empty, required_time, MapperError};
use crate::measurement::Measurement;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct LabPayload {
    tenant_id: String,
    station_id: String,
    sensor_id: String,
    metric: String,
    value: f64,
    quality: Option<String>,
}

pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: LabPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.station_id, "station_id")?;
    require_non_empty(&d.sensor_id, "sensor_id")?;
    require_non_empty(&d.metric, "metric")?;
    let time = required_time(payload)?;

    let tags = d.quality.map(|q| {
        let mut t = BTreeMap::new();
        t.insert("quality".to_string(), q);
        t
    });

    Ok(vec![Measurement {
        tenant_id: d.tenant_id,
        entity_id: d.station_id,
        sensor_id: Some(d.sensor_id),
        metric: format!("lab.{}", d.metric.to_lowercase()),
        value: d.value,
        time,
        tags,
    }])
}
