//! SQLite-backed persistence for minute features and dimensions

pub mod dimensions;
pub mod features;

pub use dimensions::{DimensionStore, SqliteDimensionStore};
pub use features::{FeatureStore, MinuteFeatureRow, SqliteFeatureStore};

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
