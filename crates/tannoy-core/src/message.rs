//! Push records for Tannoy.
//!
//! A push record is both the unit of delivery and the unit of channel
//! history: the client route to dispatch on plus an arbitrary JSON payload.
//! Persistent pushes additionally carry the channel sequence number they
//! were assigned when they entered the backlog.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message pushed through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRecord {
    /// Sequence number assigned when the record entered channel history.
    /// Transient pushes are delivered without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Client-side dispatch route, e.g. `chat.msg`.
    pub route: String,
    /// Message payload.
    pub msg: Value,
}

impl PushRecord {
    /// Create a transient record.
    #[must_use]
    pub fn new(route: impl Into<String>, msg: Value) -> Self {
        Self {
            seq: None,
            route: route.into(),
            msg,
        }
    }

    /// Attach the history sequence number this record was stored under.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Whether this record was written to channel history.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.seq.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_creation() {
        let record = PushRecord::new("chat.msg", json!({"text": "hello"}));
        assert_eq!(record.route, "chat.msg");
        assert_eq!(record.msg, json!({"text": "hello"}));
        assert!(record.seq.is_none());
        assert!(!record.is_persistent());
    }

    #[test]
    fn test_record_with_seq() {
        let record = PushRecord::new("chat.msg", json!(1)).with_seq(42);
        assert_eq!(record.seq, Some(42));
        assert!(record.is_persistent());
    }

    #[test]
    fn test_transient_record_serializes_without_seq() {
        let record = PushRecord::new("chat.msg", json!({"text": "hi"}));
        let encoded = serde_json::to_value(&record).unwrap();
        assert!(encoded.get("seq").is_none());
    }
}
