//! Core data models for the VOC monitor

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};

/// A single telemetry reading from the VOC sensor.
///
/// Only `voc_ppb` is required; the environmental covariates travel with the
/// payload but are not inputs to the lag model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub voc_ppb: f64,
    #[serde(default)]
    pub temp_c: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub timestamp: String,
}

impl Reading {
    /// Validated constructor for inbound broker payloads. Rejects malformed
    /// JSON, a missing target field, and non-finite target values instead of
    /// silently coercing them.
    pub fn from_payload(payload: &[u8]) -> Result<Self, MonitorError> {
        let reading: Reading =
            serde_json::from_slice(payload).map_err(|e| MonitorError::parse(e.to_string()))?;
        if !reading.voc_ppb.is_finite() {
            return Err(MonitorError::parse(format!(
                "non-finite voc_ppb value {}",
                reading.voc_ppb
            )));
        }
        Ok(reading)
    }
}

/// One completed inference: the reading's own target paired with what the
/// model predicted for that timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub actual: f64,
    pub predicted: f64,
}

/// Whether a retraining job is currently in flight. Exactly one job may be
/// in progress system-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainState {
    Idle,
    InProgress,
}

/// Audit counters mirrored into every persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounters {
    pub messages: u64,
    pub parse_errors: u64,
    pub inference_errors: u64,
    pub predictions: u64,
    pub retrains_triggered: u64,
    pub retrains_completed: u64,
    pub retrains_failed: u64,
}

/// Durable snapshot of operational state. Round-trippable: writing then
/// reading reproduces an operationally equivalent controller. The rolling
/// windows are deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub model_version: String,
    pub retrain_state: RetrainState,
    pub counters: AuditCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let payload =
            br#"{"voc_ppb": 412.5, "temp_c": 21.3, "humidity": 48.0, "timestamp": "2025-01-01T00:00:00Z"}"#;
        let reading = Reading::from_payload(payload).unwrap();
        assert_eq!(reading.voc_ppb, 412.5);
        assert_eq!(reading.temp_c, 21.3);
        assert_eq!(reading.humidity, 48.0);
        assert_eq!(reading.timestamp, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_parse_missing_target_rejected() {
        let payload = br#"{"temp_c": 21.3, "humidity": 48.0, "timestamp": "2025-01-01"}"#;
        let err = Reading::from_payload(payload).unwrap_err();
        assert!(matches!(err, MonitorError::Parse { .. }));
    }

    #[test]
    fn test_parse_malformed_json_rejected() {
        assert!(Reading::from_payload(b"not json at all").is_err());
        assert!(Reading::from_payload(b"{\"voc_ppb\": ").is_err());
    }

    #[test]
    fn test_parse_extra_fields_ignored() {
        let payload = br#"{"voc_ppb": 100.0, "co2_ppm": 900, "timestamp": "t"}"#;
        let reading = Reading::from_payload(payload).unwrap();
        assert_eq!(reading.voc_ppb, 100.0);
        assert_eq!(reading.temp_c, 0.0);
    }

    #[test]
    fn test_retrain_state_serde_names() {
        assert_eq!(
            serde_json::to_string(&RetrainState::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::from_str::<RetrainState>("\"idle\"").unwrap(),
            RetrainState::Idle
        );
    }

    #[test]
    fn test_persisted_state_json_round_trip() {
        let state = PersistedState {
            model_version: "voc_predictor-v20250101_120000".to_string(),
            retrain_state: RetrainState::InProgress,
            counters: AuditCounters {
                messages: 42,
                predictions: 37,
                retrains_triggered: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&state).unwrap();
        let restored: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
