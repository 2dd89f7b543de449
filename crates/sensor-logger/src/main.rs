// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Environmental Sensor Logger
//!
//! Persists MQTT sensor summaries to SQLite.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: environment_data.db, localhost:1883, env/sensor/+/data
//! sensor-logger
//!
//! # Configure through the environment
//! APP_DB_PATH=/var/lib/sensors.db APP_MQTT_BROKER=mqtt.lan APP_LOG_LEVEL=debug sensor-logger
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sensor_logger::{Config, IngestionHandler, MqttTransport, SqliteStore, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sensor-logger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Environmental sensor logger - persists MQTT sensor summaries to SQLite", long_about = None)]
struct Args {
    /// Database path (SQLite file)
    #[arg(long, env = "APP_DB_PATH", default_value = "environment_data.db")]
    db: PathBuf,

    /// MQTT broker host
    #[arg(long, env = "APP_MQTT_BROKER", default_value = "localhost")]
    broker: String,

    /// MQTT broker port
    #[arg(long, env = "APP_MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Log level: DEBUG, INFO, WARN or ERROR (anything else means INFO)
    #[arg(long, env = "APP_LOG_LEVEL", default_value = "INFO", value_parser = parse_log_level)]
    log_level: tracing::Level,

    /// MQTT client identifier
    #[arg(long, env = "APP_MQTT_CLIENT_ID", default_value = "sensor-logger")]
    client_id: String,

    /// Topic namespace (subscribes to <namespace>/sensor/+/data)
    #[arg(long, env = "APP_TOPIC_NAMESPACE", default_value = "env")]
    namespace: String,

    /// Reconnect interval in milliseconds
    #[arg(long, env = "APP_RETRY_INTERVAL_MS", default_value_t = 5000)]
    retry_interval_ms: u64,

    /// Graceful disconnect timeout in milliseconds
    #[arg(long, env = "APP_DISCONNECT_TIMEOUT_MS", default_value_t = 250)]
    disconnect_timeout_ms: u64,

    /// Give up on the initial connection after N seconds (0 = never)
    #[arg(long, env = "APP_CONNECT_TIMEOUT_SECS", default_value_t = 0)]
    connect_timeout_secs: u64,

    /// Maximum concurrently processed messages
    #[arg(long, env = "APP_MAX_IN_FLIGHT", default_value_t = 64)]
    max_in_flight: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(args.log_level.into()),
        )
        .init();

    tracing::info!("Starting environment data logger...");

    let config = Config::builder()
        .db_path(&args.db)
        .broker_host(&args.broker)
        .broker_port(args.port)
        .client_id(&args.client_id)
        .topic_namespace(&args.namespace)
        .retry_interval_ms(args.retry_interval_ms)
        .disconnect_timeout_ms(args.disconnect_timeout_ms)
        .connect_timeout_secs(args.connect_timeout_secs)
        .max_in_flight(args.max_in_flight)
        .build();

    let store = Arc::new(SqliteStore::open(&config.db_path).context("Database setup failed")?);
    let handler = Arc::new(IngestionHandler::new(store));

    tracing::info!(
        broker = %format!("{}:{}", config.broker_host, config.broker_port),
        topic = %config.subscription_filter(),
        "Connecting to MQTT broker"
    );

    let transport = MqttTransport::new(&config);
    let supervisor = Supervisor::new((&config).into(), transport, Arc::clone(&handler));

    // Signals are honored from the first connection attempt on
    tracing::info!("Application is running. Press Ctrl+C to exit.");
    supervisor
        .serve(shutdown_signal())
        .await
        .context("Failed to connect to MQTT broker")?;

    let stats = handler.stats();
    tracing::info!(
        received = stats.messages_received,
        stored = stats.readings_stored,
        malformed_topics = stats.malformed_topics,
        invalid_payloads = stats.invalid_payloads,
        unknown_sensors = stats.unknown_sensors,
        storage_errors = stats.storage_errors,
        "Application exited."
    );

    Ok(())
}

/// Map a log level name to a level, case-insensitively.
///
/// Unrecognized names fall back to INFO instead of failing startup.
fn parse_log_level(value: &str) -> Result<tracing::Level, std::convert::Infallible> {
    Ok(match value.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => tracing::Level::DEBUG,
        "WARN" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    })
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_from_flag(value: &str) -> tracing::Level {
        Args::try_parse_from(["sensor-logger", "--log-level", value])
            .unwrap()
            .log_level
    }

    #[test]
    fn test_log_level_case_insensitive() {
        assert_eq!(level_from_flag("debug"), tracing::Level::DEBUG);
        assert_eq!(level_from_flag("Warn"), tracing::Level::WARN);
        assert_eq!(level_from_flag("ERROR"), tracing::Level::ERROR);
        assert_eq!(level_from_flag("info"), tracing::Level::INFO);
    }

    #[test]
    fn test_unknown_log_level_falls_back_to_info() {
        assert_eq!(level_from_flag("warning"), tracing::Level::INFO);
        assert_eq!(level_from_flag("trace"), tracing::Level::INFO);
    }

    #[test]
    fn test_parse_log_level_default() {
        assert_eq!(parse_log_level("INFO"), Ok(tracing::Level::INFO));
    }
}
