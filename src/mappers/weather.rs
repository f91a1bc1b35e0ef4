//! Weather observations -> `weather.temp_c`

use super::{emit, require_non_empty, required_time, MapperError};
use crate::measurement::Measurement;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct WeatherPayload {
    tenant_id: String,
    station_id: String,
    temp_c: Option<f64>,
}

/// Emits only when a temperature is present; observations without one are
/// dropped, not dead-lettered.
pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: WeatherPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.station_id, "station_id")?;
    let time = required_time(payload)?;

    let Some(temp) = d.temp_c else {
        return Ok(Vec::new());
    };

    let mut tags = BTreeMap::new();
    tags.insert("unit".to_string(), "C".to_string());

    Ok(vec![emit(
        &d.tenant_id,
        &d.station_id,
        "weather.temp_c".to_string(),
        temp,
        time,
        &tags,
    )])
}
