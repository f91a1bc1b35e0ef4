//! Minute feature rollups: sufficient statistics per (bucket, tenant, entity, metric)
//!
//! Each accepted measurement folds into its minute bucket with a single
//! atomic merge statement, so concurrent consumers never lose an update.
//! Buckets are stored as epoch seconds (always a multiple of 60).

use crate::measurement::Measurement;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, TimeDelta, Utc};
use log::info;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct MinuteFeatureRow {
    pub bucket: DateTime<Utc>,
    pub tenant_id: String,
    pub entity_id: String,
    pub metric: String,
    pub count: i64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sumsq: f64,
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Merge one measurement into its minute rollup.
    async fn merge(&self, measurement: &Measurement) -> Result<(), StoreError>;

    /// Fetch rollups whose minute has closed (bucket strictly before the
    /// current minute), newest first, bounded by a lookback window and a
    /// row limit.
    async fn select_finalized(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
        limit: u32,
    ) -> Result<Vec<MinuteFeatureRow>, StoreError>;
}

pub struct SqliteFeatureStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFeatureStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS minute_features (
                 bucket     INTEGER NOT NULL,
                 tenant_id  TEXT NOT NULL,
                 entity_id  TEXT NOT NULL,
                 metric     TEXT NOT NULL,
                 count      INTEGER NOT NULL,
                 sum        REAL NOT NULL,
                 min        REAL NOT NULL,
                 max        REAL NOT NULL,
                 sumsq      REAL NOT NULL,
                 PRIMARY KEY (bucket, tenant_id, entity_id, metric)
             );

             CREATE INDEX IF NOT EXISTS idx_minute_features_bucket
                 ON minute_features (bucket);",
        )?;

        info!(
            "💾 Feature store ready: {}",
            db_path.as_ref().display()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl FeatureStore for SqliteFeatureStore {
    async fn merge(&self, measurement: &Measurement) -> Result<(), StoreError> {
        let bucket = measurement.minute_bucket().timestamp();
        let v = measurement.value;

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))?;

        conn.execute(
            "INSERT INTO minute_features
                 (bucket, tenant_id, entity_id, metric, count, sum, min, max, sumsq)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?5, ?6)
             ON CONFLICT (bucket, tenant_id, entity_id, metric) DO UPDATE SET
                 count = count + 1,
                 sum   = sum + excluded.sum,
                 min   = min(minute_features.min, excluded.min),
                 max   = max(minute_features.max, excluded.max),
                 sumsq = sumsq + excluded.sumsq",
            params![
                bucket,
                measurement.tenant_id,
                measurement.entity_id,
                measurement.metric,
                v,
                v * v,
            ],
        )?;

        Ok(())
    }

    async fn select_finalized(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
        limit: u32,
    ) -> Result<Vec<MinuteFeatureRow>, StoreError> {
        let current_minute = now
            .duration_trunc(TimeDelta::minutes(1))
            .map_err(|e| StoreError::Database(format!("bucket truncation: {}", e)))?;
        let horizon = now - lookback;

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT bucket, tenant_id, entity_id, metric, count, sum, min, max, sumsq
             FROM minute_features
             WHERE bucket < ?1 AND bucket >= ?2
             ORDER BY bucket DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![current_minute.timestamp(), horizon.timestamp(), limit],
            |row| {
                let bucket_secs: i64 = row.get(0)?;
                Ok(MinuteFeatureRow {
                    bucket: DateTime::from_timestamp(bucket_secs, 0).unwrap_or_default(),
                    tenant_id: row.get(1)?,
                    entity_id: row.get(2)?,
                    metric: row.get(3)?,
                    count: row.get(4)?,
                    sum: row.get(5)?,
                    min: row.get(6)?,
                    max: row.get(7)?,
                    sumsq: row.get(8)?,
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
