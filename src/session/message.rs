//! Outbound message construction and the telemetry payload schema
//!
//! Payloads are built as owned buffers through serde; there is no
//! fixed-size formatting anywhere on this path.

use serde::{Deserialize, Serialize};

/// Delivery guarantee tier for outbound publishes.
///
/// Serializes to the wire-visible `"type"` tag of the telemetry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QosLevel {
    #[serde(rename = "QOS0")]
    AtMostOnce,
    #[serde(rename = "QOS1")]
    AtLeastOnce,
}

impl QosLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AtMostOnce => "QOS0",
            Self::AtLeastOnce => "QOS1",
        }
    }
}

/// JSON payload published every cycle, one per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub message: String,
    #[serde(rename = "type")]
    pub tier: QosLevel,
    pub counter: u64,
}

/// One outbound publish: handed to the transport, then forgotten.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retained: bool,
}

impl Message {
    /// Build a telemetry message for the given tier and counter value.
    pub fn telemetry(
        topic: &str,
        greeting: &str,
        tier: QosLevel,
        counter: u64,
    ) -> Result<Self, serde_json::Error> {
        let payload = TelemetryPayload {
            message: greeting.to_string(),
            tier,
            counter,
        };
        Ok(Self {
            topic: topic.to_string(),
            payload: serde_json::to_vec(&payload)?,
            qos: tier,
            retained: false,
        })
    }
}

/// Monotonic counter correlating payloads across tiers.
///
/// Advances once per constructed message, independent of publish outcome,
/// and wraps at integer width. Debugging aid, not a correctness mechanism.
#[derive(Debug, Default)]
pub struct PublishCounter(u64);

impl PublishCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Take the value for the next message and advance.
    pub fn next(&mut self) -> u64 {
        let value = self.0;
        self.0 = self.0.wrapping_add(1);
        value
    }

    /// Value the next call to `next` will return.
    pub fn peek(&self) -> u64 {
        self.0
    }
}
