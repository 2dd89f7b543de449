// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reading store abstraction
//!
//! Defines the write contract the ingestion path depends on. The SQLite
//! implementation lives in [`crate::sqlite`].

use crate::reading::SensorReading;
use crate::topic::SensorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single reading write. Either way no row was persisted.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The sensor has no registration row.
    #[error("sensor '{0}' is not registered")]
    UnknownSensor(SensorId),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// A persisted reading row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Store-assigned, monotonically increasing row id
    pub id: i64,

    /// Insert time (UTC), assigned by the store
    pub timestamp: DateTime<Utc>,

    pub sensor_id: SensorId,

    pub reading: SensorReading,
}

/// Reading store trait
///
/// `insert_reading` persists exactly one complete row or none.
/// Implementations must be safe to call concurrently from many handler tasks.
///
/// # Implementations
///
/// - `SqliteStore` -- allow-list enforced through the `sensors` table
pub trait ReadingStore: Send + Sync {
    /// Persist a reading for a registered sensor
    fn insert_reading(&self, sensor_id: &SensorId, reading: &SensorReading)
        -> Result<(), WriteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sensor_message() {
        let err = WriteError::UnknownSensor(SensorId::new("42"));
        assert_eq!(err.to_string(), "sensor '42' is not registered");
    }

    #[test]
    fn test_storage_error_from_rusqlite() {
        let err: WriteError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, WriteError::Storage(_)));
    }
}
