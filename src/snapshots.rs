//! Dimension snapshot payloads (device / farm / house / flock)
//!
//! Reference-data snapshots ride the same bus as telemetry but bypass the
//! measurement pipeline entirely: they upsert into dimension tables,
//! last-write-wins. Parse failures here are logged and dropped; there is
//! no dead-letter path for dimension traffic.

use crate::mappers::MapperError;
use crate::timeparse::parse_event_time;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlockSex {
    Male,
    Female,
    Mixed,
}

impl FlockSex {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlockSex::Male => "male",
            FlockSex::Female => "female",
            FlockSex::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub tenant_id: String,
    pub device_id: String,
    pub farm_id: Option<String>,
    pub house_id: Option<String>,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub serial_no: Option<String>,
    pub meta: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FarmSnapshot {
    pub tenant_id: String,
    pub farm_id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub region: Option<String>,
    pub meta: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HouseSnapshot {
    pub tenant_id: String,
    pub house_id: String,
    pub farm_id: String,
    pub name: Option<String>,
    pub capacity: Option<f64>,
    pub kind: Option<String>,
    pub meta: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FlockSnapshot {
    pub tenant_id: String,
    pub flock_id: String,
    pub house_id: String,
    pub farm_id: Option<String>,
    pub breed: Option<String>,
    pub sex: Option<FlockSex>,
    pub population: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub meta: Value,
    pub updated_at: DateTime<Utc>,
}

fn require_non_empty(value: &str, field: &str) -> Result<(), MapperError> {
    if value.trim().is_empty() {
        Err(MapperError::new(format!("{} must be non-empty", field)))
    } else {
        Ok(())
    }
}

/// A present-but-unparseable time field rejects the snapshot; an absent
/// one does not.
fn opt_time(raw: &Option<Value>, field: &str) -> Result<Option<DateTime<Utc>>, MapperError> {
    match raw {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(v) => parse_event_time(v)
            .map(Some)
            .ok_or_else(|| MapperError::new(format!("{} is not a valid timestamp", field))),
    }
}

fn meta_or_empty(meta: Option<Value>) -> Value {
    meta.unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

#[derive(Debug, Deserialize)]
struct RawDeviceSnapshot {
    tenant_id: String,
    device_id: String,
    farm_id: Option<String>,
    house_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
    name: Option<String>,
    model: Option<String>,
    vendor: Option<String>,
    serial_no: Option<String>,
    meta: Option<Value>,
    updated_at: Option<Value>,
}

pub fn parse_device(payload: &Value) -> Result<DeviceSnapshot, MapperError> {
    let d: RawDeviceSnapshot = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.device_id, "device_id")?;

    Ok(DeviceSnapshot {
        tenant_id: d.tenant_id,
        device_id: d.device_id,
        farm_id: d.farm_id,
        house_id: d.house_id,
        kind: d.kind,
        status: d.status,
        name: d.name,
        model: d.model,
        vendor: d.vendor,
        serial_no: d.serial_no,
        meta: meta_or_empty(d.meta),
        updated_at: opt_time(&d.updated_at, "updated_at")?.unwrap_or_else(Utc::now),
    })
}

#[derive(Debug, Deserialize)]
struct RawFarmSnapshot {
    tenant_id: String,
    farm_id: String,
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    region: Option<String>,
    meta: Option<Value>,
    updated_at: Option<Value>,
}

pub fn parse_farm(payload: &Value) -> Result<FarmSnapshot, MapperError> {
    let d: RawFarmSnapshot = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.farm_id, "farm_id")?;

    Ok(FarmSnapshot {
        tenant_id: d.tenant_id,
        farm_id: d.farm_id,
        name: d.name,
        lat: d.lat,
        lon: d.lon,
        region: d.region,
        meta: meta_or_empty(d.meta),
        updated_at: opt_time(&d.updated_at, "updated_at")?.unwrap_or_else(Utc::now),
    })
}

#[derive(Debug, Deserialize)]
struct RawHouseSnapshot {
    tenant_id: String,
    house_id: String,
    farm_id: String,
    name: Option<String>,
    capacity: Option<f64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    meta: Option<Value>,
    updated_at: Option<Value>,
}

pub fn parse_house(payload: &Value) -> Result<HouseSnapshot, MapperError> {
    let d: RawHouseSnapshot = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.house_id, "house_id")?;
    require_non_empty(&d.farm_id, "farm_id")?;

    Ok(HouseSnapshot {
        tenant_id: d.tenant_id,
        house_id: d.house_id,
        farm_id: d.farm_id,
        name: d.name,
        capacity: d.capacity,
        kind: d.kind,
        meta: meta_or_empty(d.meta),
        updated_at: opt_time(&d.updated_at, "updated_at")?.unwrap_or_else(Utc::now),
    })
}

#[derive(Debug, Deserialize)]
struct RawFlockSnapshot {
    tenant_id: String,
    flock_id: String,
    house_id: String,
    farm_id: Option<String>,
    breed: Option<String>,
    sex: Option<FlockSex>,
    population: Option<i64>,
    start_date: Option<Value>,
    end_date: Option<Value>,
    meta: Option<Value>,
    updated_at: Option<Value>,
}

pub fn parse_flock(payload: &Value) -> Result<FlockSnapshot, MapperError> {
    let d: RawFlockSnapshot = serde_json::from_value(payload.clone())?;
    require_non_empty(&d.tenant_id, "tenant_id")?;
    require_non_empty(&d.flock_id, "flock_id")?;
    require_non_empty(&d.house_id, "house_id")?;
    if d.population.is_some_and(|p| p < 0) {
        return Err(MapperError::new("population must be non-negative"));
    }

    Ok(FlockSnapshot {
        tenant_id: d.tenant_id,
        flock_id: d.flock_id,
        house_id: d.house_id,
        farm_id: d.farm_id,
        breed: d.breed,
        sex: d.sex,
        population: d.population,
        start_date: opt_time(&d.start_date, "start_date")?,
        end_date: opt_time(&d.end_date, "end_date")?,
        meta: meta_or_empty(d.meta),
        updated_at: opt_time(&d.updated_at, "updated_at")?.unwrap_or_else(Utc::now),
    })
}
