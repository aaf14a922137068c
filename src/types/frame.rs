use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::constants::frame_types;

/// A single unit on the wire: `{ type, data?, timestamp, id? }`.
///
/// Frames are immutable once built; the `with_*` helpers consume and return
/// a new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any JSON number; peers may send fractional values
    #[serde(default = "now_millis", serialize_with = "serialize_timestamp")]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

// Whole values go out as integers
fn serialize_timestamp<S: Serializer>(timestamp: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if timestamp.fract() == 0.0 && timestamp.abs() < EXACT {
        serializer.serialize_i64(*timestamp as i64)
    } else {
        serializer.serialize_f64(*timestamp)
    }
}

impl Frame {
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: now_millis(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Heartbeat ping carrying a fresh correlation id
    pub fn ping() -> Self {
        Self::new(frame_types::PING, None).with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Heartbeat reply, echoing the ping's id when it had one
    pub fn pong(id: Option<String>) -> Self {
        Self {
            id,
            ..Self::new(frame_types::PONG, None)
        }
    }

    pub fn is_ping(&self) -> bool {
        self.kind == frame_types::PING
    }

    pub fn is_pong(&self) -> bool {
        self.kind == frame_types::PONG
    }

    /// Decode a text frame received from the wire
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Encode for transmission
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
