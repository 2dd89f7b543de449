// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion handler
//!
//! Per-message pipeline: resolve the topic, decode the payload, write the
//! reading. Every rejection is terminal: the message is logged and dropped,
//! never retried or requeued.
//!
//! # Outcomes
//!
//! | Failure | Level | Counter |
//! |---------|-------|---------|
//! | malformed topic / invalid sensor id | warn | `malformed_topics` |
//! | invalid payload | error | `invalid_payloads` |
//! | unknown sensor | warn | `unknown_sensors` |
//! | storage failure | error | `storage_errors` |

use crate::reading::SensorReading;
use crate::store::{ReadingStore, WriteError};
use crate::topic::{resolve_sensor_id, TopicError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Delivery callback registered with the supervisor.
///
/// Called once per delivered message, possibly from many threads at once.
/// Must not panic or propagate errors.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, topic: &str, payload: &[u8]);
}

/// Result of processing one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    MalformedTopic,
    InvalidSensorId,
    InvalidPayload,
    UnknownSensor,
    StorageFailed,
}

/// Handler statistics snapshot
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Messages delivered to the handler
    pub messages_received: u64,
    /// Readings committed
    pub readings_stored: u64,
    /// Topic resolution failures (either kind)
    pub malformed_topics: u64,
    /// Undecodable payloads
    pub invalid_payloads: u64,
    /// Readings from unregistered sensors
    pub unknown_sensors: u64,
    /// Storage errors
    pub storage_errors: u64,
}

#[derive(Default)]
struct Counters {
    messages_received: AtomicU64,
    readings_stored: AtomicU64,
    malformed_topics: AtomicU64,
    invalid_payloads: AtomicU64,
    unknown_sensors: AtomicU64,
    storage_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_stored: self.readings_stored.load(Ordering::Relaxed),
            malformed_topics: self.malformed_topics.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
            unknown_sensors: self.unknown_sensors.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
        }
    }
}

/// Ingestion handler
///
/// Owns nothing but its store handle; each message's reading lives only for
/// the duration of [`IngestionHandler::process`].
pub struct IngestionHandler<S: ReadingStore> {
    store: Arc<S>,
    counters: Counters,
}

impl<S: ReadingStore> IngestionHandler<S> {
    /// Create a handler writing to `store`
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            counters: Counters::default(),
        }
    }

    /// Get handler statistics
    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Run the full pipeline for one message
    pub fn process(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        Counters::bump(&self.counters.messages_received);
        tracing::debug!(topic, payload_size = payload.len(), "Received MQTT message");

        let sensor_id = match resolve_sensor_id(topic) {
            Ok(id) => id,
            Err(e) => {
                Counters::bump(&self.counters.malformed_topics);
                tracing::warn!(topic, error = %e, "Ignoring message on invalid topic");
                return match e {
                    TopicError::MalformedTopic { .. } => IngestOutcome::MalformedTopic,
                    TopicError::InvalidSensorId(_) => IngestOutcome::InvalidSensorId,
                };
            }
        };

        let reading = match SensorReading::decode(payload) {
            Ok(reading) => reading,
            Err(e) => {
                Counters::bump(&self.counters.invalid_payloads);
                tracing::error!(sensor_id = %sensor_id, error = %e, "Failed to decode sensor payload");
                return IngestOutcome::InvalidPayload;
            }
        };

        match self.store.insert_reading(&sensor_id, &reading) {
            Ok(()) => {
                Counters::bump(&self.counters.readings_stored);
                tracing::info!(sensor_id = %sensor_id, "Successfully logged data");
                IngestOutcome::Stored
            }
            Err(WriteError::UnknownSensor(_)) => {
                Counters::bump(&self.counters.unknown_sensors);
                tracing::warn!(sensor_id = %sensor_id, "Rejected data from unknown sensor");
                IngestOutcome::UnknownSensor
            }
            Err(e @ WriteError::Storage(_)) => {
                Counters::bump(&self.counters.storage_errors);
                tracing::error!(sensor_id = %sensor_id, error = %e, "Failed to store sensor reading");
                IngestOutcome::StorageFailed
            }
        }
    }
}

impl<S: ReadingStore + 'static> MessageHandler for IngestionHandler<S> {
    fn handle(&self, topic: &str, payload: &[u8]) {
        let _ = self.process(topic, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use crate::topic::SensorId;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = br#"{"temp":{"min":18.0,"max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;

    fn handler_with_sensor(sensor: &str) -> (TempDir, Arc<SqliteStore>, IngestionHandler<SqliteStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("ingest.db")).unwrap());
        store.register_sensor(&SensorId::new(sensor), "test sensor").unwrap();
        let handler = IngestionHandler::new(Arc::clone(&store));
        (dir, store, handler)
    }

    /// Store that fails every write with a storage error
    struct BrokenStore;

    impl ReadingStore for BrokenStore {
        fn insert_reading(&self, _: &SensorId, _: &SensorReading) -> Result<(), WriteError> {
            Err(WriteError::Storage(rusqlite::Error::InvalidQuery))
        }
    }

    #[test]
    fn test_registered_sensor_is_stored() {
        let (_dir, store, handler) = handler_with_sensor("17");

        assert_eq!(handler.process("env/sensor/17/data", PAYLOAD), IngestOutcome::Stored);

        let rows = store.load(&SensorId::new("17")).unwrap();
        assert_eq!(rows.len(), 1);
        let reading = rows[0].reading;
        assert_eq!(reading.temperature.min, 18.0);
        assert_eq!(reading.temperature.max, 22.5);
        assert_eq!(reading.temperature.median, 20.1);
        assert_eq!(reading.pressure.min, 1001.2);
        assert_eq!(reading.pressure.max, 1004.0);
        assert_eq!(reading.pressure.median, 1002.5);
        assert_eq!(reading.humidity.min, 40.0);
        assert_eq!(reading.humidity.max, 55.0);
        assert_eq!(reading.humidity.median, 47.3);
    }

    #[test]
    fn test_malformed_topic_discarded() {
        let (_dir, store, handler) = handler_with_sensor("17");

        assert_eq!(handler.process("env/sensor/17", PAYLOAD), IngestOutcome::MalformedTopic);
        assert_eq!(
            handler.process("env/sensor//data", PAYLOAD),
            IngestOutcome::InvalidSensorId
        );
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(handler.stats().malformed_topics, 2);
    }

    #[test]
    fn test_invalid_payload_discarded() {
        let (_dir, store, handler) = handler_with_sensor("17");
        let payload = br#"{"temp":{"min":"x","max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;

        assert_eq!(
            handler.process("env/sensor/17/data", payload),
            IngestOutcome::InvalidPayload
        );
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_sensor_discarded() {
        let (_dir, store, handler) = handler_with_sensor("17");

        assert_eq!(
            handler.process("env/sensor/99/data", PAYLOAD),
            IngestOutcome::UnknownSensor
        );
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_storage_failure_contained() {
        let handler = IngestionHandler::new(Arc::new(BrokenStore));

        assert_eq!(
            handler.process("env/sensor/17/data", PAYLOAD),
            IngestOutcome::StorageFailed
        );
        // The callback form swallows the failure
        handler.handle("env/sensor/17/data", PAYLOAD);
        assert_eq!(handler.stats().storage_errors, 2);
    }

    #[test]
    fn test_stats() {
        let (_dir, _store, handler) = handler_with_sensor("17");

        handler.handle("env/sensor/17/data", PAYLOAD);
        handler.handle("env/sensor/17/data", PAYLOAD);
        handler.handle("env/sensor/18/data", PAYLOAD);
        handler.handle("env/sensor/17/data", b"garbage");
        handler.handle("bad", PAYLOAD);

        assert_eq!(
            handler.stats(),
            IngestStats {
                messages_received: 5,
                readings_stored: 2,
                malformed_topics: 1,
                invalid_payloads: 1,
                unknown_sensors: 1,
                storage_errors: 0,
            }
        );
    }
}
