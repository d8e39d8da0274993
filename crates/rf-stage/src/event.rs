//! StageEvent — A stage occurrence with timing and payload
//!
//! Produced by the engine, immutable once received.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

/// A timestamped stage emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage identifier exactly as the engine sent it (e.g. `"REEL_STOP_2"`)
    pub stage_type: String,

    /// Milliseconds from spin start
    pub timestamp_ms: u64,

    /// Opaque payload forwarded to the rendering layer
    #[serde(default)]
    pub payload: StagePayload,
}

impl StageEvent {
    /// Create a new stage event with an empty payload
    pub fn new(stage_type: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            stage_type: stage_type.into(),
            timestamp_ms,
            payload: StagePayload::default(),
        }
    }

    /// Create from a typed stage kind
    pub fn from_kind(kind: &StageKind, timestamp_ms: u64) -> Self {
        Self::new(kind.name(), timestamp_ms)
    }

    /// Create with payload
    pub fn with_payload(
        stage_type: impl Into<String>,
        timestamp_ms: u64,
        payload: StagePayload,
    ) -> Self {
        Self {
            stage_type: stage_type.into(),
            timestamp_ms,
            payload,
        }
    }

    /// Typed view of `stage_type`
    pub fn kind(&self) -> StageKind {
        StageKind::parse(&self.stage_type)
    }
}

/// Opaque key/value payload attached to a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagePayload(BTreeMap<String, serde_json::Value>);

impl StagePayload {
    /// Create empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set a key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Look up a numeric key
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(|v| v.as_f64())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_event_creation() {
        let event = StageEvent::with_payload(
            "WIN_PRESENT",
            1500,
            StagePayload::new().with("win_amount", 12.5),
        );

        assert_eq!(event.kind(), StageKind::WinPresent(None));
        assert_eq!(event.timestamp_ms, 1500);
        assert_eq!(event.payload.get_f64("win_amount"), Some(12.5));
    }

    #[test]
    fn test_payload_is_transparent_map() {
        let json = r#"{"stage_type":"REEL_STOP_1","timestamp_ms":900,"payload":{"symbols":[3,7,1]}}"#;
        let event: StageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind().reel_index(), Some(1));
        assert_eq!(event.payload.len(), 1);

        let round = serde_json::to_string(&event).unwrap();
        assert!(round.contains("\"payload\":{\"symbols\""));
    }

    #[test]
    fn test_missing_payload_defaults_empty() {
        let event: StageEvent =
            serde_json::from_str(r#"{"stage_type":"SPIN_END","timestamp_ms":0}"#).unwrap();
        assert!(event.payload.is_empty());
    }
}
