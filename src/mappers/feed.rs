//! Feed batch and feed quality payloads -> `feed.*`
//!
//! Entity anchor priority for both: silo > house > device > farm.

use super::{emit, require_non_empty, required_time, tag_opt, MapperError};
use crate::measurement::{sanitize_metric_part, Measurement};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct FeedBatchPayload {
    tenant_id: String,
    batch_id: String,
    feed_type: Option<String>,
    mass_kg: Option<f64>,
    farm_id: Option<String>,
    house_id: Option<String>,
    silo_id: Option<String>,
    device_id: Option<String>,
}

fn anchor<'a>(
    silo: &'a Option<String>,
    house: &'a Option<String>,
    device: &'a Option<String>,
    farm: &'a Option<String>,
) -> Option<&'a str> {
    silo.as_deref()
        .or(house.as_deref())
        .or(device.as_deref())
        .or(farm.as_deref())
}

/// Batch created: always `feed.batch.count = 1`, plus `feed.batch.mass_kg`
/// when the batch mass is known.
pub fn map_batch(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: FeedBatchPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.batch_id, "batch_id")?;
    let time = required_time(payload)?;

    let Some(entity) = anchor(&d.silo_id, &d.house_id, &d.device_id, &d.farm_id) else {
        return Ok(Vec::new());
    };

    let mut tags = BTreeMap::new();
    tags.insert("batch_id".to_string(), d.batch_id.clone());
    if let Some(ft) = &d.feed_type {
        tags.insert("feed_type".to_string(), sanitize_metric_part(ft));
    }
    tag_opt(&mut tags, "farm_id", &d.farm_id);
    tag_opt(&mut tags, "house_id", &d.house_id);
    tag_opt(&mut tags, "silo_id", &d.silo_id);

    let mut out = vec![emit(
        &d.tenant_id,
        entity,
        "feed.batch.count".to_string(),
        1.0,
        time,
        &tags,
    )];

    if let Some(mass) = d.mass_kg {
        let mut mass_tags = tags.clone();
        mass_tags.insert("unit".to_string(), "kg".to_string());
        out.push(emit(
            &d.tenant_id,
            entity,
            "feed.batch.mass_kg".to_string(),
            mass,
            time,
            &mass_tags,
        ));
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum QualityStatus {
    Pass,
    Fail,
}

#[derive(Debug, Deserialize)]
struct FeedQualityPayload {
    tenant_id: String,
    batch_id: Option<String>,
    status: Option<QualityStatus>,
    farm_id: Option<String>,
    house_id: Option<String>,
    silo_id: Option<String>,
    device_id: Option<String>,
    moisture_pct: Option<f64>,
    protein_pct: Option<f64>,
    fat_pct: Option<f64>,
    fiber_pct: Option<f64>,
    ash_pct: Option<f64>,
    salt_pct: Option<f64>,
    energy_mjkg: Option<f64>,
    aflatoxin_ppb: Option<f64>,
}

/// Quality result: one measurement per recognized field actually present,
/// each tagged with its physical unit, plus a sample count and an optional
/// pass/fail gauge.
pub fn map_quality(payload: &Value) -> Result<Vec<Measurement>, MapperError> {
    let d: FeedQualityPayload = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    let time = required_time(payload)?;

    let Some(entity) = anchor(&d.silo_id, &d.house_id, &d.device_id, &d.farm_id) else {
        return Ok(Vec::new());
    };

    let mut tags = BTreeMap::new();
    tag_opt(&mut tags, "batch_id", &d.batch_id);
    if let Some(status) = d.status {
        let s = if status == QualityStatus::Pass { "pass" } else { "fail" };
        tags.insert("status".to_string(), s.to_string());
    }
    tag_opt(&mut tags, "farm_id", &d.farm_id);
    tag_opt(&mut tags, "house_id", &d.house_id);
    tag_opt(&mut tags, "silo_id", &d.silo_id);

    let fields: [(Option<f64>, &str, &str); 8] = [
        (d.moisture_pct, "feed.quality.moisture_pct", "pct"),
        (d.protein_pct, "feed.quality.protein_pct", "pct"),
        (d.fat_pct, "feed.quality.fat_pct", "pct"),
        (d.fiber_pct, "feed.quality.fiber_pct", "pct"),
        (d.ash_pct, "feed.quality.ash_pct", "pct"),
        (d.salt_pct, "feed.quality.salt_pct", "pct"),
        (d.energy_mjkg, "feed.quality.energy_mjkg", "mjkg"),
        (d.aflatoxin_ppb, "feed.quality.aflatoxin_ppb", "ppb"),
    ];

    let mut out = Vec::new();
    for (value, metric, unit) in fields {
        if let Some(v) = value {
            let mut field_tags = tags.clone();
            field_tags.insert("unit".to_string(), unit.to_string());
            out.push(emit(
                &d.tenant_id,
                entity,
                metric.to_string(),
                v,
                time,
                &field_tags,
            ));
        }
    }

    // sample count lets downstream count tests per window
    out.push(emit(
        &d.tenant_id,
        entity,
        "feed.quality.sample.count".to_string(),
        1.0,
        time,
        &tags,
    ));

    if let Some(status) = d.status {
        out.push(emit(
            &d.tenant_id,
            entity,
            "feed.quality.pass".to_string(),
            if status == QualityStatus::Pass { 1.0 } else { 0.0 },
            time,
            &tags,
        ));
    }

    Ok(out)
}
