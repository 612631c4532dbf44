//! Command type definitions for device service calls
//!
//! A service call is a one-shot command published to a device gateway,
//! answered by exactly one reply carrying a result code.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use skyrelay_core::DeviceSn;
use std::fmt;
use uuid::Uuid;

/// Service methods understood by device gateways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMethod {
    /// Start pushing a live stream
    LiveStartPush,
    /// Stop pushing a live stream
    LiveStopPush,
    /// Change the quality of a live stream
    LiveSetQuality,
}

impl ServiceMethod {
    /// Wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMethod::LiveStartPush => "live_start_push",
            ServiceMethod::LiveStopPush => "live_stop_push",
            ServiceMethod::LiveSetQuality => "live_set_quality",
        }
    }
}

impl fmt::Display for ServiceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key binding one outgoing command to its single reply.
///
/// `tid` is random per request; the method is part of the key so a reply
/// for a different method is never accepted under the same transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    /// Transaction identifier
    pub tid: Uuid,
    /// Method the transaction invoked
    pub method: ServiceMethod,
}

impl CorrelationKey {
    /// Generate a fresh key for `method`
    pub fn generate(method: ServiceMethod) -> Self {
        Self {
            tid: Uuid::new_v4(),
            method,
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.tid)
    }
}

/// Command addressed to a device gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCommand {
    /// Gateway the command is published to
    pub gateway_sn: DeviceSn,
    /// Method to invoke
    pub method: ServiceMethod,
    /// Method parameters
    pub data: serde_json::Value,
}

impl ServiceCommand {
    /// Build a command from any serializable parameter struct
    pub fn new<P: Serialize>(
        gateway_sn: DeviceSn,
        method: ServiceMethod,
        params: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            gateway_sn,
            method,
            data: serde_json::to_value(params)?,
        })
    }
}

/// Reply published by a device for a service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReply {
    /// Result code, zero on success
    pub result: i32,
    /// Method-specific output
    #[serde(default)]
    pub output: serde_json::Value,
}

impl ServiceReply {
    /// Successful reply with no output
    pub fn ok() -> Self {
        Self {
            result: 0,
            output: serde_json::Value::Null,
        }
    }

    /// Failed reply carrying a device error code
    pub fn failed(result: i32) -> Self {
        Self {
            result,
            output: serde_json::Value::Null,
        }
    }

    /// Check if the device reported success
    pub fn is_success(&self) -> bool {
        self.result == 0
    }
}
