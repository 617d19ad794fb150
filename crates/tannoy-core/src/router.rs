//! Delivery fan-out to connector processes.
//!
//! The router turns one push into one remote call per connector that
//! currently serves at least one recipient. Calls run concurrently and a
//! failing connector never affects the others: its error is logged and
//! swallowed, and there is no retry. Sequenced history is the recovery
//! path for players behind a failed connector.

use crate::channel::{ConnectorGroups, PlayerId};
use crate::message::PushRecord;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error raised by a single connector delivery call.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connector id resolves to no reachable process.
    #[error("connector unreachable: {0}")]
    Unreachable(String),
    /// The connector was reached but failed or refused the call.
    #[error("connector {connector} failed delivery: {reason}")]
    Failed {
        /// Connector that failed.
        connector: String,
        /// Backend-specific failure description.
        reason: String,
    },
}

/// How the connector should treat a delivery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Fire-and-forget client push, no per-player acknowledgement.
    Push,
}

/// Options attached to every delivery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Delivery handling on the connector side.
    pub kind: DeliveryKind,
    /// Whether the push named explicit recipients instead of the whole
    /// channel membership.
    pub targeted: bool,
}

impl DeliveryOptions {
    /// Options for a channel-wide push.
    #[must_use]
    pub fn broadcast() -> Self {
        Self {
            kind: DeliveryKind::Push,
            targeted: false,
        }
    }

    /// Options for a push naming explicit recipients.
    #[must_use]
    pub fn targeted() -> Self {
        Self {
            kind: DeliveryKind::Push,
            targeted: true,
        }
    }
}

/// Remote call surface of a connector process.
///
/// One implementation exists per deployment (HTTP sidecar, RPC mesh,
/// in-process loopback in tests). The router only requires that a call
/// either succeeds or fails for that connector alone.
#[async_trait]
pub trait ConnectorLink: Send + Sync {
    /// Deliver `record` to `players` attached to `connector_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when this connector cannot take the message.
    async fn push_message(
        &self,
        connector_id: &str,
        route: &str,
        record: &PushRecord,
        players: &[PlayerId],
        options: DeliveryOptions,
    ) -> Result<(), DeliveryError>;
}

/// Fans one push out to every connector holding recipients.
pub struct Router {
    link: Arc<dyn ConnectorLink>,
}

impl Router {
    /// Create a router delivering through `link`.
    #[must_use]
    pub fn new(link: Arc<dyn ConnectorLink>) -> Self {
        Self { link }
    }

    /// Issue one delivery call per connector group, concurrently.
    ///
    /// Resolves once every call has settled. Individual failures are
    /// logged at warn level and swallowed.
    pub async fn deliver(
        &self,
        groups: &ConnectorGroups,
        route: &str,
        record: &PushRecord,
        options: DeliveryOptions,
    ) {
        if groups.is_empty() {
            debug!(route, "no online recipients, skipping delivery");
            return;
        }

        let calls = groups.iter().map(|(connector_id, players)| async move {
            match self
                .link
                .push_message(connector_id, route, record, players, options)
                .await
            {
                Ok(()) => {
                    debug!(
                        connector = %connector_id,
                        players = players.len(),
                        route,
                        "delivered"
                    );
                }
                Err(err) => {
                    warn!(connector = %connector_id, error = %err, route, "delivery failed");
                }
            }
        });
        join_all(calls).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Link that records every call and can fail one connector.
    #[derive(Default)]
    struct RecordingLink {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail: Option<String>,
    }

    #[async_trait]
    impl ConnectorLink for RecordingLink {
        async fn push_message(
            &self,
            connector_id: &str,
            _route: &str,
            _record: &PushRecord,
            players: &[PlayerId],
            _options: DeliveryOptions,
        ) -> Result<(), DeliveryError> {
            if self.fail.as_deref() == Some(connector_id) {
                return Err(DeliveryError::Unreachable(connector_id.to_string()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((connector_id.to_string(), players.to_vec()));
            Ok(())
        }
    }

    fn make_groups(pairs: &[(&str, &[&str])]) -> ConnectorGroups {
        pairs
            .iter()
            .map(|(connector, players)| {
                (
                    connector.to_string(),
                    players.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_one_call_per_connector() {
        let link = Arc::new(RecordingLink::default());
        let router = Router::new(link.clone());
        let record = PushRecord::new("chat.msg", json!({"text": "hi"}));

        let groups = make_groups(&[("conn-1", &["p1", "p2"]), ("conn-2", &["p3"])]);
        router
            .deliver(&groups, "chat.msg", &record, DeliveryOptions::broadcast())
            .await;

        let calls: HashMap<_, _> = link.calls.lock().unwrap().iter().cloned().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls["conn-2"], vec!["p3"]);
        let mut on_conn1 = calls["conn-1"].clone();
        on_conn1.sort();
        assert_eq!(on_conn1, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_failed_connector_does_not_affect_others() {
        let link = Arc::new(RecordingLink {
            fail: Some("conn-2".to_string()),
            ..RecordingLink::default()
        });
        let router = Router::new(link.clone());
        let record = PushRecord::new("chat.msg", json!(null));

        let groups = make_groups(&[
            ("conn-1", &["p1"]),
            ("conn-2", &["p2"]),
            ("conn-3", &["p3"]),
        ]);
        // Resolves successfully despite the failing connector.
        router
            .deliver(&groups, "chat.msg", &record, DeliveryOptions::broadcast())
            .await;

        let calls = link.calls.lock().unwrap();
        let reached: Vec<_> = calls.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(calls.len(), 2);
        assert!(reached.contains(&"conn-1"));
        assert!(reached.contains(&"conn-3"));
    }

    #[tokio::test]
    async fn test_empty_groups_skip_delivery() {
        let link = Arc::new(RecordingLink::default());
        let router = Router::new(link.clone());
        let record = PushRecord::new("chat.msg", json!(null));

        router
            .deliver(
                &ConnectorGroups::new(),
                "chat.msg",
                &record,
                DeliveryOptions::broadcast(),
            )
            .await;

        assert!(link.calls.lock().unwrap().is_empty());
    }
}
