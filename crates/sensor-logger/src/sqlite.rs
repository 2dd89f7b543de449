// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite reading store
//!
//! Owns the schema, the sensor registry, and the transactional reading write.

use crate::reading::{Measurement, SensorReading};
use crate::store::{ReadingStore, StoredReading, WriteError};
use crate::topic::SensorId;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections kept for reuse.
const MAX_IDLE_CONNECTIONS: usize = 8;

/// SQLite reading store
///
/// Every write checks out its own connection, so concurrent handlers never
/// queue behind an application lock; SQLite's transaction locking and the
/// busy timeout order conflicting writers.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sensors (
///     sensor_id TEXT PRIMARY KEY,
///     name TEXT NOT NULL,
///     created_at DATETIME DEFAULT CURRENT_TIMESTAMP
/// );
/// CREATE TABLE sensor_readings (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
///     sensor_id TEXT NOT NULL,
///     temp_min REAL, temp_max REAL, temp_median REAL,
///     pressure_min REAL, pressure_max REAL, pressure_median REAL,
///     humidity_min REAL, humidity_max REAL, humidity_median REAL,
///     FOREIGN KEY(sensor_id) REFERENCES sensors(sensor_id)
/// );
/// CREATE INDEX idx_readings_sensor ON sensor_readings(sensor_id);
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// Safe to call repeatedly against the same file; existing tables and
    /// rows are left untouched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;

        init_schema(&conn).context("Failed to initialize database schema")?;

        tracing::info!(path = %path.display(), "Database is ready");

        Ok(Self {
            path,
            idle: Mutex::new(vec![conn]),
        })
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Provision a sensor in the registry.
    ///
    /// Registration happens out-of-band (administration, tests); the
    /// ingestion path never calls this. Returns false if the sensor was
    /// already registered.
    pub fn register_sensor(&self, sensor_id: &SensorId, name: &str) -> Result<bool> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sensors (sensor_id, name) VALUES (?1, ?2)",
                params![sensor_id.as_str(), name],
            )
        })
        .map(|inserted| inserted == 1)
        .with_context(|| format!("Failed to register sensor {}", sensor_id))
    }

    /// Check whether a sensor has a registration row
    pub fn is_registered(&self, sensor_id: &SensorId) -> Result<bool> {
        let found = self.with_connection(|conn| {
            conn.query_row(
                "SELECT 1 FROM sensors WHERE sensor_id = ?1",
                [sensor_id.as_str()],
                |_| Ok(()),
            )
            .optional()
        })?;

        Ok(found.is_some())
    }

    /// Get total number of stored readings
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))
        })?;

        Ok(count as usize)
    }

    /// Load all readings for a sensor, oldest first
    pub fn load(&self, sensor_id: &SensorId) -> Result<Vec<StoredReading>> {
        let readings = self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, sensor_id,
                        temp_min, temp_max, temp_median,
                        pressure_min, pressure_max, pressure_median,
                        humidity_min, humidity_max, humidity_median
                 FROM sensor_readings
                 WHERE sensor_id = ?1
                 ORDER BY id ASC",
            )?;

            let rows = stmt
                .query_map([sensor_id.as_str()], row_to_reading)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })?;

        Ok(readings)
    }

    /// Run `f` on a pooled connection, opening a fresh one if none is idle.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = self.checkout()?;
        let result = f(&mut conn);
        self.checkin(conn);
        result
    }

    fn checkout(&self) -> rusqlite::Result<Connection> {
        let pooled = match self.idle.lock() {
            Ok(mut idle) => idle.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };

        match pooled {
            Some(conn) => Ok(conn),
            None => open_connection(&self.path),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }
}

impl ReadingStore for SqliteStore {
    fn insert_reading(
        &self,
        sensor_id: &SensorId,
        reading: &SensorReading,
    ) -> Result<(), WriteError> {
        let mut conn = self.checkout()?;
        let result = insert_in_transaction(&mut conn, sensor_id, reading);
        self.checkin(conn);
        result
    }
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets readers run alongside the single active writer
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sensors (
            sensor_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sensor_readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            sensor_id TEXT NOT NULL,
            temp_min REAL, temp_max REAL, temp_median REAL,
            pressure_min REAL, pressure_max REAL, pressure_median REAL,
            humidity_min REAL, humidity_max REAL, humidity_median REAL,
            FOREIGN KEY(sensor_id) REFERENCES sensors(sensor_id)
        );

        CREATE INDEX IF NOT EXISTS idx_readings_sensor ON sensor_readings(sensor_id);",
    )
}

fn insert_in_transaction(
    conn: &mut Connection,
    sensor_id: &SensorId,
    reading: &SensorReading,
) -> Result<(), WriteError> {
    // IMMEDIATE takes the write lock up front so the registry check and the
    // insert cannot be split by another writer.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let registered = tx
        .query_row(
            "SELECT 1 FROM sensors WHERE sensor_id = ?1",
            [sensor_id.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    if !registered {
        // Dropping `tx` rolls back
        return Err(WriteError::UnknownSensor(sensor_id.clone()));
    }

    let SensorReading {
        temperature: t,
        pressure: p,
        humidity: h,
    } = reading;

    tx.execute(
        "INSERT INTO sensor_readings (
            sensor_id,
            temp_min, temp_max, temp_median,
            pressure_min, pressure_max, pressure_median,
            humidity_min, humidity_max, humidity_median
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            sensor_id.as_str(),
            t.min,
            t.max,
            t.median,
            p.min,
            p.max,
            p.median,
            h.min,
            h.max,
            h.median,
        ],
    )?;

    tx.commit()?;
    Ok(())
}

fn row_to_reading(row: &rusqlite::Row) -> rusqlite::Result<StoredReading> {
    let measurement = |base: usize| -> rusqlite::Result<Measurement> {
        Ok(Measurement {
            min: row.get(base)?,
            max: row.get(base + 1)?,
            median: row.get(base + 2)?,
        })
    };

    let timestamp: NaiveDateTime = row.get(1)?;

    Ok(StoredReading {
        id: row.get(0)?,
        timestamp: timestamp.and_utc(),
        sensor_id: SensorId::new(row.get::<_, String>(2)?),
        reading: SensorReading {
            temperature: measurement(3)?,
            pressure: measurement(6)?,
            humidity: measurement(9)?,
        },
    })
}
