//! Publishes device commands through the MQTT bridge sidecar over HTTP.

use async_trait::async_trait;
use serde::Serialize;
use skyrelay_c2_router::{Transport, TransportError};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct BridgePublish<'a> {
    topic: &'a str,
    payload: &'a str,
}

pub struct HttpBridgeTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpBridgeTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpBridgeTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let payload = String::from_utf8(payload)
            .map_err(|e| TransportError::Rejected(format!("payload is not UTF-8: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .json(&BridgePublish {
                topic,
                payload: &payload,
            })
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(format!("bridge answered {status}")));
        }
        debug!(topic, "published through bridge");
        Ok(())
    }
}
