// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor reading decoding
//!
//! Payloads are JSON objects with three measurement groups:
//!
//! ```json
//! {
//!   "temp":     {"min": 18.0,   "max": 22.5,   "med": 20.1},
//!   "pressure": {"min": 1001.2, "max": 1004.0, "med": 1002.5},
//!   "humidity": {"min": 40.0,   "max": 55.0,   "med": 47.3}
//! }
//! ```
//!
//! All nine fields are required and must be numbers. Ordering of
//! `min <= med <= max` is not checked; range sanity belongs to the sensor
//! firmware.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload could not be decoded into a [`SensorReading`].
#[derive(Debug, Error)]
#[error("invalid payload: {0}")]
pub struct InvalidPayload(#[from] serde_json::Error);

/// Summary of one quantity over a sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub min: f64,
    pub max: f64,
    #[serde(rename = "med")]
    pub median: f64,
}

/// One decoded sensor summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "temp")]
    pub temperature: Measurement,
    pub pressure: Measurement,
    pub humidity: Measurement,
}

impl SensorReading {
    /// Decode a raw MQTT payload.
    pub fn decode(payload: &[u8]) -> Result<Self, InvalidPayload> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"temp":{"min":18.0,"max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;

    #[test]
    fn test_decode_valid_payload() {
        let reading = SensorReading::decode(VALID.as_bytes()).unwrap();

        assert_eq!(
            reading.temperature,
            Measurement {
                min: 18.0,
                max: 22.5,
                median: 20.1
            }
        );
        assert_eq!(reading.pressure.min, 1001.2);
        assert_eq!(reading.pressure.median, 1002.5);
        assert_eq!(reading.humidity.max, 55.0);
        assert_eq!(reading.humidity.median, 47.3);
    }

    #[test]
    fn test_integers_and_extra_fields_accepted() {
        let payload = r#"{"temp":{"min":18,"max":22,"med":20,"unit":"C"},"pressure":{"min":1001,"max":1004,"med":1002},"humidity":{"min":40,"max":55,"med":47},"fw":"1.2"}"#;
        let reading = SensorReading::decode(payload.as_bytes()).unwrap();
        assert_eq!(reading.temperature.max, 22.0);
    }

    #[test]
    fn test_no_range_validation() {
        let payload = r#"{"temp":{"min":30.0,"max":10.0,"med":-5.0},"pressure":{"min":0,"max":0,"med":0},"humidity":{"min":0,"max":0,"med":0}}"#;
        let reading = SensorReading::decode(payload.as_bytes()).unwrap();
        assert!(reading.temperature.min > reading.temperature.max);
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let payload = r#"{"temp":{"min":"x","max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;
        assert!(SensorReading::decode(payload.as_bytes()).is_err());

        let payload = r#"{"temp":{"min":18.0,"max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":null,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;
        assert!(SensorReading::decode(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let missing_group = r#"{"temp":{"min":18.0,"max":22.5,"med":20.1},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5}}"#;
        assert!(SensorReading::decode(missing_group.as_bytes()).is_err());

        let missing_median = r#"{"temp":{"min":18.0,"max":22.5},"pressure":{"min":1001.2,"max":1004.0,"med":1002.5},"humidity":{"min":40.0,"max":55.0,"med":47.3}}"#;
        assert!(SensorReading::decode(missing_median.as_bytes()).is_err());
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let payload = VALID.replace("\"temp\"", "\"Temp\"");
        assert!(SensorReading::decode(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let payloads: [&[u8]; 6] = [b"", b"not json", b"[]", b"{", b"\xff\xfe\x00", b"null"];
        for payload in payloads {
            assert!(SensorReading::decode(payload).is_err());
        }
        assert!(SensorReading::decode(&VALID.as_bytes()[..VALID.len() / 2]).is_err());
    }
}
