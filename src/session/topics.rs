//! Identity-scoped topic derivation
//!
//! The wire contract is exact: a device subscribes to everything under its
//! own hex identity (`<identity>/#`) and publishes to the bare identity
//! prefix (`<identity>/`). Broker-side routing may depend on this shape,
//! so every topic string in the crate comes from here.

use crate::identity::DeviceIdentity;

/// Derive the subscribe filter for an identity.
pub fn subscribe_filter(identity: &str) -> String {
    format!("{identity}/#")
}

/// Derive the publish topic for an identity.
pub fn publish_topic(identity: &str) -> String {
    format!("{identity}/")
}

/// Topic pair for one session, computed once at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTopics {
    subscribe: String,
    publish: String,
}

impl SessionTopics {
    pub fn for_identity(identity: &DeviceIdentity) -> Self {
        Self {
            subscribe: subscribe_filter(identity.as_str()),
            publish: publish_topic(identity.as_str()),
        }
    }

    /// Wildcard filter the session subscribes to.
    pub fn subscribe_filter(&self) -> &str {
        &self.subscribe
    }

    /// Topic both telemetry tiers publish to.
    pub fn publish_topic(&self) -> &str {
        &self.publish
    }
}
