//! Edge sweep-robot readings -> `sweep.*`

use super::{require_non_empty, required_time, tag_opt, MapperError};
use crate::measurement::Measurement;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RunId {
    Text(String),
    Number(f64),
}

impl RunId {
    fn into_string(self) -> String {
        match self {
            RunId::Text(s) => s,
            RunId::Number(n) => {
                // integral run ids print without a trailing ".0"
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    format!("{}", n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SweepPayload {
    tenant_id: String,
    robot_id: String,
    run_id: RunId,
    sensor_id: String,
    metric: String,
    value: f64,
    zone_id: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    quality: Option<String>,
}

pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: SweepPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.robot_id, "robot_id")?;
    require_non_empty(&d.sensor_id, "sensor_id")?;
    require_non_empty(&d.metric, "metric")?;
    let time = required_time(payload)?;

    let mut tags = BTreeMap::new();
    tags.insert("run_id".to_string(), d.run_id.into_string());
    tags.insert("sensor_id".to_string(), d.sensor_id.clone());
    tag_opt(&mut tags, "zone_id", &d.zone_id);
    if let Some(x) = d.x {
        tags.insert("x".to_string(), x.to_string());
    }
    if let Some(y) = d.y {
        tags.insert("y".to_string(), y.to_string());
    }
    tag_opt(&mut tags, "quality", &d.quality);

    Ok(vec![Measurement {
        tenant_id: d.tenant_id,
        entity_id: d.robot_id,
        sensor_id: Some(d.sensor_id),
        metric: format!("sweep.{}", d.metric.to_lowercase()),
        value: d.value,
        time,
        tags: Some(tags),
    }])
}
