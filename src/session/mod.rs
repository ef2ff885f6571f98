//! Broker session: parameters, wire-event routing, loop policy, the
//! rumqttc-backed client, and the session manager that runs it all.
//!
//! # Architecture
//!
//! Pure decision logic is split from I/O:
//!
//! - [`topics`] - pure identity-scoped topic derivation
//! - [`message`] - payload schema and the publish counter
//! - [`connection`] - session parameters, timing policy, error taxonomy
//! - [`events`] - pure routing of transport packets to session events
//! - [`policy`] - pure loop and publish-failure decision functions
//! - [`client`] - impure rumqttc I/O behind the [`BrokerSession`] trait
//! - [`manager`] - the startup sequence and steady-state loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use edgelink::config::BrokerSection;
//! use edgelink::identity::DeviceIdentity;
//! use edgelink::session::{BrokerSession, MqttSession, QosLevel, SessionParams};
//!
//! # tokio_test::block_on(async {
//! let identity = DeviceIdentity::from_serial(&[0xAA, 0xBB, 0xCC])?;
//! let broker = BrokerSection {
//!     host: "broker.example.com".to_string(),
//!     port: 8883,
//!     tls: None,
//! };
//!
//! let params = SessionParams::from_config(&identity, &broker)?;
//! let mut session = MqttSession::new(params);
//! session.connect().await?;
//! session.subscribe("AABBCC/#", QosLevel::AtMostOnce).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod events;
pub mod manager;
pub mod message;
pub mod policy;
pub mod topics;

pub use client::{BrokerSession, MqttSession};
pub use connection::{
    ReconnectPacing, SessionError, SessionParams, SessionState, SessionStatus, TlsMaterial,
    COMMAND_TIMEOUT, CONNECT_RETRY_DELAY, HANDSHAKE_TIMEOUT, KEEP_ALIVE, PUBLISH_PACING,
    YIELD_BUDGET,
};
pub use events::{EventRouter, SessionEvent};
pub use manager::SessionManager;
pub use message::{Message, PublishCounter, QosLevel, TelemetryPayload};
pub use policy::{directive_for, failure_action, LoopDirective, PublishFailureAction};
pub use topics::{publish_topic, subscribe_filter, SessionTopics};
