// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Environmental Sensor Logger
//!
//! Subscribes to sensor summaries on an MQTT broker and persists them to
//! SQLite.
//!
//! # Features
//!
//! - **Allow-list** -- readings are stored only for sensors provisioned in
//!   the `sensors` table
//! - **Transactional writes** -- each reading is one complete row or none
//! - **Resilient connection** -- fixed-interval reconnect with resubscribe
//! - **Contained failures** -- bad topics, bad payloads and storage errors
//!   drop one message, never the process
//!
//! # Architecture
//!
//! ```text
//! Supervisor                 (connect / reconnect / resubscribe / shutdown)
//! +-- Transport              (rumqttc event loop, or MockTransport)
//! +-- IngestionHandler       (one blocking task per message)
//!     +-- resolve_sensor_id  (topic -> SensorId)
//!     +-- SensorReading      (payload -> reading)
//!     +-- ReadingStore       (SqliteStore)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sensor_logger::{Config, IngestionHandler, MqttTransport, SqliteStore, Supervisor};
//! use std::sync::Arc;
//!
//! let config = Config::builder().broker_host("mqtt.lan").build();
//!
//! let store = Arc::new(SqliteStore::open(&config.db_path)?);
//! let handler = Arc::new(IngestionHandler::new(store));
//! let supervisor = Supervisor::new((&config).into(), MqttTransport::new(&config), handler);
//!
//! supervisor.serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

pub mod config;
pub mod handler;
pub mod mqtt;
pub mod reading;
pub mod sqlite;
pub mod store;
pub mod supervisor;
pub mod topic;
pub mod transport;

pub use config::Config;
pub use handler::{IngestOutcome, IngestStats, IngestionHandler, MessageHandler};
pub use mqtt::MqttTransport;
pub use reading::{InvalidPayload, Measurement, SensorReading};
pub use sqlite::SqliteStore;
pub use store::{ReadingStore, StoredReading, WriteError};
pub use supervisor::{
    ConnectError, ConnectionState, Supervisor, SupervisorConfig, MAX_IN_FLIGHT_LIMIT,
};
pub use topic::{resolve_sensor_id, SensorId, TopicError};
pub use transport::{MockTransport, Transport, TransportError, TransportEvent};
