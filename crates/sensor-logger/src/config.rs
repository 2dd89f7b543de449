// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logger service configuration

use crate::supervisor::MAX_IN_FLIGHT_LIMIT;
use crate::topic::subscription_filter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Logger service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    pub db_path: PathBuf,

    /// MQTT broker host
    pub broker_host: String,

    /// MQTT broker port
    pub broker_port: u16,

    /// MQTT client identifier
    pub client_id: String,

    /// Topic namespace (`<namespace>/sensor/+/data`)
    pub topic_namespace: String,

    /// Fixed delay between reconnect attempts, in milliseconds
    pub retry_interval_ms: u64,

    /// Upper bound on graceful disconnect, in milliseconds
    pub disconnect_timeout_ms: u64,

    /// Give up on the initial connection after this many seconds (0 = never)
    pub connect_timeout_secs: u64,

    /// MQTT keep-alive interval in seconds
    pub keep_alive_secs: u64,

    /// Maximum concurrently running message handlers
    pub max_in_flight: usize,

    /// Capacity of the MQTT client request queue
    pub event_loop_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("environment_data.db"),
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "sensor-logger".to_string(),
            topic_namespace: "env".to_string(),
            retry_interval_ms: 5000,
            disconnect_timeout_ms: 250,
            connect_timeout_secs: 0,
            keep_alive_secs: 30,
            max_in_flight: 64,
            event_loop_capacity: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Wildcard subscription covering every sensor
    pub fn subscription_filter(&self) -> String {
        subscription_filter(&self.topic_namespace)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    /// `None` means retry the initial connection forever
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    db_path: Option<PathBuf>,
    broker_host: Option<String>,
    broker_port: Option<u16>,
    client_id: Option<String>,
    topic_namespace: Option<String>,
    retry_interval_ms: Option<u64>,
    disconnect_timeout_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    keep_alive_secs: Option<u64>,
    max_in_flight: Option<usize>,
    event_loop_capacity: Option<usize>,
}

impl ConfigBuilder {
    /// Set database path
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Set broker host
    pub fn broker_host(mut self, host: impl Into<String>) -> Self {
        self.broker_host = Some(host.into());
        self
    }

    /// Set broker port
    pub fn broker_port(mut self, port: u16) -> Self {
        self.broker_port = Some(port);
        self
    }

    /// Set MQTT client identifier
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set topic namespace
    pub fn topic_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.topic_namespace = Some(namespace.into());
        self
    }

    /// Set reconnect interval in milliseconds
    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.retry_interval_ms = Some(ms);
        self
    }

    /// Set graceful disconnect bound in milliseconds
    pub fn disconnect_timeout_ms(mut self, ms: u64) -> Self {
        self.disconnect_timeout_ms = Some(ms);
        self
    }

    /// Set initial connect timeout in seconds (0 = retry forever)
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    /// Set keep-alive interval in seconds
    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = Some(secs);
        self
    }

    /// Set maximum concurrent handlers (clamped to `1..=MAX_IN_FLIGHT_LIMIT`)
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }

    /// Set client request queue capacity
    pub fn event_loop_capacity(mut self, capacity: usize) -> Self {
        self.event_loop_capacity = Some(capacity);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let defaults = Config::default();

        Config {
            db_path: self.db_path.unwrap_or(defaults.db_path),
            broker_host: self.broker_host.unwrap_or(defaults.broker_host),
            broker_port: self.broker_port.unwrap_or(defaults.broker_port),
            client_id: self.client_id.unwrap_or(defaults.client_id),
            topic_namespace: self.topic_namespace.unwrap_or(defaults.topic_namespace),
            retry_interval_ms: self.retry_interval_ms.unwrap_or(defaults.retry_interval_ms),
            disconnect_timeout_ms: self
                .disconnect_timeout_ms
                .unwrap_or(defaults.disconnect_timeout_ms),
            connect_timeout_secs: self
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
            keep_alive_secs: self.keep_alive_secs.unwrap_or(defaults.keep_alive_secs),
            max_in_flight: self
                .max_in_flight
                .unwrap_or(defaults.max_in_flight)
                .clamp(1, MAX_IN_FLIGHT_LIMIT),
            event_loop_capacity: self
                .event_loop_capacity
                .unwrap_or(defaults.event_loop_capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .db_path("/var/lib/logger/data.db")
            .broker_host("mqtt.lan")
            .broker_port(8883)
            .topic_namespace("lab")
            .retry_interval_ms(1000)
            .connect_timeout_secs(30)
            .build();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/logger/data.db"));
        assert_eq!(config.broker_host, "mqtt.lan");
        assert_eq!(config.broker_port, 8883);
        assert_eq!(config.subscription_filter(), "lab/sensor/+/data");
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.db_path, PathBuf::from("environment_data.db"));
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.subscription_filter(), "env/sensor/+/data");
        assert_eq!(config.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.disconnect_timeout(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn test_max_in_flight_clamped() {
        let config = Config::builder().max_in_flight(0).build();
        assert_eq!(config.max_in_flight, 1);

        let config = Config::builder().max_in_flight(usize::MAX).build();
        assert_eq!(config.max_in_flight, MAX_IN_FLIGHT_LIMIT);
    }
}
