//! Realtime ingress/egress message schema (§6, Design Notes §9). Modeled
//! as plain serde-tagged enums processed by a handler function over a
//! channel — not a websocket transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngressMessage {
    StreamData {
        recording_id: Uuid,
        chunk: Vec<Vec<f64>>,
        sfreq: u32,
    },
    RequestInference {
        recording_id: Uuid,
        model_id: Uuid,
    },
    JoinRecording {
        recording_id: Uuid,
    },
    LeaveRecording {
        recording_id: Uuid,
    },
    SubscribeJob {
        job_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EgressMessage {
    RealtimeFeatures {
        recording_id: Uuid,
        timestamp: DateTime<Utc>,
        features: BTreeMap<String, f64>,
    },
    RealtimePrediction {
        recording_id: Uuid,
        prediction: i64,
        probability: f64,
        probabilities: Vec<f64>,
        timestamp: DateTime<Utc>,
    },
    Buffering {
        recording_id: Uuid,
    },
    Error {
        recording_id: Option<Uuid>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_round_trips_through_json() {
        let msg = IngressMessage::StreamData {
            recording_id: Uuid::nil(),
            chunk: vec![vec![1.0, 2.0]],
            sfreq: 250,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"stream_data\""));
        let parsed: IngressMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            IngressMessage::StreamData { sfreq, .. } => assert_eq!(sfreq, 250),
            _ => panic!("wrong variant"),
        }
    }
}
