//! Status JSON envelope published by every stage at least every publish
//! period (default 3 s, see `runtime::DEFAULT_PUBLISH_PERIOD`).

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status message published on `status_<producer>`.
///
/// `msg_id` must be strictly increasing within a producer's lifetime (I5);
/// callers obtain it from a per-stage counter, not from this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub module: String,
    pub timestamp: String,
    pub msg_id: u64,
    /// Current stage-runtime state name, e.g. "running", "publish_status".
    /// Additive relative to the wire-level minimum fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Component-specific fields (rates, occupancies, file sizes, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusMessage {
    pub fn new(module: impl Into<String>, msg_id: u64) -> Self {
        Self {
            module: module.into(),
            timestamp: Local::now().to_rfc3339(),
            msg_id,
            state: None,
            extra: Map::new(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Monotonic `msg_id` generator; one instance per producer lifetime (I5).
#[derive(Debug, Default)]
pub struct MsgIdCounter(u64);

impl MsgIdCounter {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_json() {
        let status = StatusMessage::new("abcd", 1)
            .with_state("running")
            .with_field("rate_hz", 12345.0);
        let bytes = status.to_json().unwrap();
        let decoded = StatusMessage::from_json(&bytes).unwrap();
        assert_eq!(decoded.module, "abcd");
        assert_eq!(decoded.msg_id, 1);
        assert_eq!(decoded.state.as_deref(), Some("running"));
        assert_eq!(decoded.extra.get("rate_hz").and_then(Value::as_f64), Some(12345.0));
    }

    #[test]
    fn msg_id_strictly_increases() {
        let mut counter = MsgIdCounter::default();
        let a = counter.next();
        let b = counter.next();
        let c = counter.next();
        assert!(a < b && b < c);
    }
}
