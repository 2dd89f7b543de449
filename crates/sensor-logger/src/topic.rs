// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic resolution
//!
//! Sensors publish on `<namespace>/sensor/<sensor_id>/data`. The resolver
//! extracts the sensor identity from the third segment.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of `/`-separated segments in a sensor data topic.
const TOPIC_SEGMENTS: usize = 4;

/// Index of the sensor identity segment.
const SENSOR_ID_SEGMENT: usize = 2;

/// Topic resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("malformed topic '{topic}': expected 4 segments, got {segments}")]
    MalformedTopic { topic: String, segments: usize },

    #[error("invalid sensor id in topic '{0}'")]
    InvalidSensorId(String),
}

/// Opaque sensor identity taken from the topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Extract the sensor identity from a data topic.
///
/// Only the segment count is checked; the broker subscription already
/// restricts which topics reach us. The identity segment must be non-empty.
pub fn resolve_sensor_id(topic: &str) -> Result<SensorId, TopicError> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() != TOPIC_SEGMENTS {
        return Err(TopicError::MalformedTopic {
            topic: topic.to_string(),
            segments: segments.len(),
        });
    }

    let id = segments[SENSOR_ID_SEGMENT];
    if id.is_empty() {
        return Err(TopicError::InvalidSensorId(topic.to_string()));
    }

    Ok(SensorId::new(id))
}

/// Wildcard filter covering every sensor under `namespace`.
pub fn subscription_filter(namespace: &str) -> String {
    format!("{}/sensor/+/data", namespace)
}
