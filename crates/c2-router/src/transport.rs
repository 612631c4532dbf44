//! Publish/subscribe transport contract and wire envelopes.
//!
//! The broker connection itself lives outside this crate. The router only
//! needs to hand encoded envelopes to a [`Transport`] and to receive raw
//! reply bytes back.

use crate::command_types::{CorrelationKey, ServiceCommand, ServiceMethod, ServiceReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skyrelay_core::{current_timestamp_ms, DeviceSn};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Transport failures surfaced by [`Transport::publish`]
#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker refused the message
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// Broker could not be reached
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound half of the pub/sub transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an encoded payload on `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Topic a gateway listens on for service calls
pub fn services_topic(gateway_sn: &DeviceSn) -> String {
    format!("thing/product/{}/services", gateway_sn)
}

/// Envelope published for a service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEnvelope {
    /// Transaction id, echoed by the reply
    pub tid: Uuid,
    /// Business id
    pub bid: Uuid,
    /// Publish time in milliseconds
    pub timestamp: u64,
    /// Target gateway
    pub gateway: DeviceSn,
    /// Invoked method
    pub method: ServiceMethod,
    /// Method parameters
    pub data: serde_json::Value,
}

impl ServiceEnvelope {
    /// Wrap `command` under the transaction id of `key`
    pub fn new(key: &CorrelationKey, command: &ServiceCommand) -> Self {
        Self {
            tid: key.tid,
            bid: Uuid::new_v4(),
            timestamp: current_timestamp_ms(),
            gateway: command.gateway_sn.clone(),
            method: command.method,
            data: command.data.clone(),
        }
    }
}

/// Envelope received on the shared reply topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Transaction id of the originating call
    pub tid: Uuid,
    /// Business id
    pub bid: Uuid,
    /// Reply time in milliseconds
    pub timestamp: u64,
    /// Replying gateway
    pub gateway: DeviceSn,
    /// Method being answered
    pub method: ServiceMethod,
    /// Result of the call
    pub data: ServiceReply,
}

impl ReplyEnvelope {
    /// Build the reply a device would publish for `request`
    pub fn answering(request: &ServiceEnvelope, data: ServiceReply) -> Self {
        Self {
            tid: request.tid,
            bid: request.bid,
            timestamp: current_timestamp_ms(),
            gateway: request.gateway.clone(),
            method: request.method,
            data,
        }
    }

    /// Key this reply is correlated on
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey {
            tid: self.tid,
            method: self.method,
        }
    }
}

/// Message captured by [`ChannelTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Destination topic
    pub topic: String,
    /// Encoded payload
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the payload as a service envelope
    pub fn service_envelope(&self) -> Result<ServiceEnvelope, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// In-process transport backed by a bounded tokio channel.
///
/// Used to wire simulated devices and tests; a full channel rejects the
/// publish instead of waiting.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<PublishedMessage>,
}

impl ChannelTransport {
    /// Create a transport and the receiver observing its publications
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .try_send(PublishedMessage {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::Rejected("outbound queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    TransportError::Unavailable("subscriber closed".to_string())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command() -> ServiceCommand {
        ServiceCommand {
            gateway_sn: DeviceSn::new("GW-1"),
            method: ServiceMethod::LiveStopPush,
            data: json!({ "video_id": "SN/39-0-7/normal-0" }),
        }
    }

    #[test]
    fn test_services_topic() {
        assert_eq!(
            services_topic(&DeviceSn::new("GW-1")),
            "thing/product/GW-1/services"
        );
    }

    #[test]
    fn test_reply_answers_request_key() {
        let key = CorrelationKey::generate(ServiceMethod::LiveStopPush);
        let request = ServiceEnvelope::new(&key, &command());
        let reply = ReplyEnvelope::answering(&request, ServiceReply::ok());

        assert_eq!(reply.correlation_key(), key);
        assert_eq!(reply.gateway, DeviceSn::new("GW-1"));
    }

    #[test]
    fn test_reply_envelope_wire_format() {
        let raw = json!({
            "tid": "6a7bfe89-c386-4043-b600-b518e10096cc",
            "bid": "42a19f36-5117-4520-bd13-fd61d818d52e",
            "timestamp": 1654070968655u64,
            "gateway": "GW-1",
            "method": "live_start_push",
            "data": { "result": 0 }
        });
        let reply: ReplyEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(reply.method, ServiceMethod::LiveStartPush);
        assert!(reply.data.is_success());
    }

    #[tokio::test]
    async fn test_channel_transport_delivers() {
        let (transport, mut rx) = ChannelTransport::new(4);
        transport.publish("t", b"hello".to_vec()).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "t");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn test_channel_transport_rejects_when_closed() {
        let (transport, rx) = ChannelTransport::new(1);
        drop(rx);

        let err = transport.publish("t", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_channel_transport_rejects_when_full() {
        let (transport, _rx) = ChannelTransport::new(1);
        transport.publish("t", Vec::new()).await.unwrap();

        let err = transport.publish("t", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }
}
