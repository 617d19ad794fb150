//! HTTP delivery link to connector processes.
//!
//! Each connector process exposes an internal push endpoint; the link
//! resolves connector ids through a static id-to-base-URL table taken from
//! configuration. A delivery is a single JSON POST with no retry, matching
//! the router's at-most-one-attempt contract.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use tannoy_core::{ConnectorLink, DeliveryError, DeliveryOptions, PlayerId, PushRecord};
use tracing::debug;

/// Body of the POST issued to a connector's push endpoint.
#[derive(Debug, Serialize)]
struct PushBody<'a> {
    route: &'a str,
    record: &'a PushRecord,
    players: &'a [PlayerId],
    options: DeliveryOptions,
}

/// [`ConnectorLink`] that reaches connector processes over HTTP.
pub struct HttpConnectorLink {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl HttpConnectorLink {
    /// Build a link from a connector-id to base-URL table.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoints: HashMap<String, String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build connector HTTP client")?;
        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl ConnectorLink for HttpConnectorLink {
    async fn push_message(
        &self,
        connector_id: &str,
        route: &str,
        record: &PushRecord,
        players: &[PlayerId],
        options: DeliveryOptions,
    ) -> Result<(), DeliveryError> {
        let Some(base) = self.endpoints.get(connector_id) else {
            return Err(DeliveryError::Unreachable(connector_id.to_string()));
        };
        let url = format!("{}/push", base.trim_end_matches('/'));

        let body = PushBody {
            route,
            record,
            players,
            options,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Failed {
                connector: connector_id.to_string(),
                reason: source.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DeliveryError::Failed {
                connector: connector_id.to_string(),
                reason: format!("push endpoint returned {}", response.status()),
            });
        }

        debug!(connector = %connector_id, players = players.len(), route, "Pushed to connector");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_connector_is_unreachable() {
        let link = HttpConnectorLink::new(HashMap::new()).unwrap();
        let record = PushRecord::new("chat.msg", json!(null));

        let err = link
            .push_message(
                "conn-1",
                "chat.msg",
                &record,
                &["p1".to_string()],
                DeliveryOptions::broadcast(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable(id) if id == "conn-1"));
    }

    #[test]
    fn test_push_body_shape() {
        let record = PushRecord::new("chat.msg", json!({"text": "hi"})).with_seq(3);
        let players = vec!["p1".to_string(), "p2".to_string()];
        let body = PushBody {
            route: "chat.msg",
            record: &record,
            players: &players,
            options: DeliveryOptions::broadcast(),
        };

        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["route"], "chat.msg");
        assert_eq!(encoded["record"]["seq"], 3);
        assert_eq!(encoded["players"][1], "p2");
        assert_eq!(encoded["options"]["kind"], "push");
    }
}
