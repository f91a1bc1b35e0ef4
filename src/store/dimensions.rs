//! Dimension tables: devices, farms, houses, flocks
//!
//! Snapshot messages replace the whole row for their natural key,
//! last-write-wins. Fields absent from the snapshot overwrite with NULL;
//! `meta` lands as JSON text.

use crate::snapshots::{DeviceSnapshot, FarmSnapshot, FlockSnapshot, HouseSnapshot};
use crate::store::StoreError;
use async_trait::async_trait;
use log::info;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait DimensionStore: Send + Sync {
    async fn upsert_device(&self, snap: &DeviceSnapshot) -> Result<(), StoreError>;
    async fn upsert_farm(&self, snap: &FarmSnapshot) -> Result<(), StoreError>;
    async fn upsert_house(&self, snap: &HouseSnapshot) -> Result<(), StoreError>;
    async fn upsert_flock(&self, snap: &FlockSnapshot) -> Result<(), StoreError>;
}

pub struct SqliteDimensionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDimensionStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS dim_devices (
                 tenant_id  TEXT NOT NULL,
                 device_id  TEXT NOT NULL,
                 farm_id    TEXT,
                 house_id   TEXT,
                 type       TEXT,
                 status     TEXT,
                 name       TEXT,
                 model      TEXT,
                 vendor     TEXT,
                 serial_no  TEXT,
                 meta       TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, device_id)
             );

             CREATE TABLE IF NOT EXISTS dim_farms (
                 tenant_id  TEXT NOT NULL,
                 farm_id    TEXT NOT NULL,
                 name       TEXT,
                 lat        REAL,
                 lon        REAL,
                 region     TEXT,
                 meta       TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, farm_id)
             );

             CREATE TABLE IF NOT EXISTS dim_houses (
                 tenant_id  TEXT NOT NULL,
                 house_id   TEXT NOT NULL,
                 farm_id    TEXT NOT NULL,
                 name       TEXT,
                 capacity   REAL,
                 type       TEXT,
                 meta       TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, house_id)
             );

             CREATE TABLE IF NOT EXISTS dim_flocks (
                 tenant_id  TEXT NOT NULL,
                 flock_id   TEXT NOT NULL,
                 house_id   TEXT NOT NULL,
                 farm_id    TEXT,
                 breed      TEXT,
                 sex        TEXT,
                 population INTEGER,
                 start_date INTEGER,
                 end_date   INTEGER,
                 meta       TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (tenant_id, flock_id)
             );",
        )?;

        info!(
            "💾 Dimension store ready: {}",
            db_path.as_ref().display()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))
    }
}

fn meta_text(meta: &serde_json::Value) -> String {
    meta.to_string()
}

#[async_trait]
impl DimensionStore for SqliteDimensionStore {
    async fn upsert_device(&self, snap: &DeviceSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dim_devices
                 (tenant_id, device_id, farm_id, house_id, type, status, name,
                  model, vendor, serial_no, meta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT (tenant_id, device_id) DO UPDATE SET
                 farm_id = excluded.farm_id,
                 house_id = excluded.house_id,
                 type = excluded.type,
                 status = excluded.status,
                 name = excluded.name,
                 model = excluded.model,
                 vendor = excluded.vendor,
                 serial_no = excluded.serial_no,
                 meta = excluded.meta,
                 updated_at = excluded.updated_at",
            params![
                snap.tenant_id,
                snap.device_id,
                snap.farm_id,
                snap.house_id,
                snap.kind,
                snap.status,
                snap.name,
                snap.model,
                snap.vendor,
                snap.serial_no,
                meta_text(&snap.meta),
                snap.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn upsert_farm(&self, snap: &FarmSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dim_farms
                 (tenant_id, farm_id, name, lat, lon, region, meta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (tenant_id, farm_id) DO UPDATE SET
                 name = excluded.name,
                 lat = excluded.lat,
                 lon = excluded.lon,
                 region = excluded.region,
                 meta = excluded.meta,
                 updated_at = excluded.updated_at",
            params![
                snap.tenant_id,
                snap.farm_id,
                snap.name,
                snap.lat,
                snap.lon,
                snap.region,
                meta_text(&snap.meta),
                snap.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn upsert_house(&self, snap: &HouseSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dim_houses
                 (tenant_id, house_id, farm_id, name, capacity, type, meta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (tenant_id, house_id) DO UPDATE SET
                 farm_id = excluded.farm_id,
                 name = excluded.name,
                 capacity = excluded.capacity,
                 type = excluded.type,
                 meta = excluded.meta,
                 updated_at = excluded.updated_at",
            params![
                snap.tenant_id,
                snap.house_id,
                snap.farm_id,
                snap.name,
                snap.capacity,
                snap.kind,
                meta_text(&snap.meta),
                snap.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn upsert_flock(&self, snap: &FlockSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dim_flocks
                 (tenant_id, flock_id, house_id, farm_id, breed, sex, population,
                  start_date, end_date, meta, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (tenant_id, flock_id) DO UPDATE SET
                 house_id = excluded.house_id,
                 farm_id = excluded.farm_id,
                 breed = excluded.breed,
                 sex = excluded.sex,
                 population = excluded.population,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 meta = excluded.meta,
                 updated_at = excluded.updated_at",
            params![
                snap.tenant_id,
                snap.flock_id,
                snap.house_id,
                snap.farm_id,
                snap.breed,
                snap.sex.map(|s| s.as_str()),
                snap.population,
                snap.start_date.map(|t| t.timestamp()),
                snap.end_date.map(|t| t.timestamp()),
                meta_text(&snap.meta),
                snap.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }
}
