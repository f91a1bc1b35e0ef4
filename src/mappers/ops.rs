//! Operational events -> `ops.<category>.<type>.count` / `.qty`

use super::{emit, require_non_empty, required_time, tag_opt, MapperError};
use crate::measurement::{sanitize_metric_part, Measurement};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct OpsPayload {
    tenant_id: String,
    farm_id: Option<String>,
    house_id: Option<String>,
    device_id: Option<String>,
    category: String,
    #[serde(rename = "type")]
    event_type: String,
    quantity: Option<f64>,
    unit: Option<String>,
    severity: Option<String>,
    actor: Option<String>,
}

/// Always emits a `.count = 1`; adds `.qty` when a quantity rode along.
/// Entity anchor priority: device > house > farm; no anchor means drop.
pub fn map(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: OpsPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.category, "category")?;
    require_non_empty(&d.event_type, "type")?;
    let time = required_time(payload)?;

    let entity = d
        .device_id
        .as_deref()
        .or(d.house_id.as_deref())
        .or(d.farm_id.as_deref());
    let Some(entity) = entity else {
        return Ok(Vec::new());
    };

    let base = format!(
        "ops.{}.{}",
        sanitize_metric_part(&d.category),
        sanitize_metric_part(&d.event_type)
    );

    let mut tags = BTreeMap::new();
    tag_opt(&mut tags, "severity", &d.severity);
    tag_opt(&mut tags, "unit", &d.unit);
    tag_opt(&mut tags, "actor", &d.actor);
    tag_opt(&mut tags, "farm_id", &d.farm_id);
    tag_opt(&mut tags, "house_id", &d.house_id);
    tag_opt(&mut tags, "src_device_id", &d.device_id);

    let mut out = vec![emit(
        &d.tenant_id,
        entity,
        format!("{}.count", base),
        1.0,
        time,
        &tags,
    )];

    if let Some(qty) = d.quantity {
        out.push(emit(
            &d.tenant_id,
            entity,
            format!("{}.qty", base),
            qty,
            time,
            &tags,
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_only_without_quantity() {
        let out = map(&json!({
            "tenant_id": "t1", "house_id": "h3",
            "category": "ventilation", "type": "fan_speed_change",
            "time": "2025-08-20T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metric, "ops.ventilation.fan_speed_change.count");
        assert_eq!(out[0].value, 1.0);
        assert_eq!(out[0].entity_id, "h3");
    }

    #[test]
    fn test_count_and_qty_with_quantity() {
        let out = map(&json!({
            "tenant_id": "t1", "house_id": "h3",
            "category": "feeding", "type": "feed_load",
            "quantity": 250.0, "unit": "kg",
            "time": "2025-08-20T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].metric, "ops.feeding.feed_load.count");
        assert_eq!(out[1].metric, "ops.feeding.feed_load.qty");
        assert_eq!(out[1].value, 250.0);
        assert_eq!(out[1].tags.as_ref().unwrap()["unit"], "kg");
    }

    #[test]
    fn test_entity_priority_device_first() {
        let out = map(&json!({
            "tenant_id": "t1", "farm_id": "f1", "house_id": "h1", "device_id": "d1",
            "category": "alarm", "type": "High Temp!",
            "time": 1755659520
        }))
        .unwrap();

        assert_eq!(out[0].entity_id, "d1");
        assert_eq!(out[0].metric, "ops.alarm.high_temp_.count");
        let tags = out[0].tags.as_ref().unwrap();
        assert_eq!(tags["farm_id"], "f1");
        assert_eq!(tags["src_device_id"], "d1");
    }

    #[test]
    fn test_no_anchor_dropped() {
        let out = map(&json!({
            "tenant_id": "t1",
            "category": "alarm", "type": "x",
            "time": 1755659520
        }))
        .unwrap();
        assert!(out.is_empty());
    }
}
