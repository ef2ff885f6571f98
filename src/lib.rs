//! Edgelink - device connectivity and telemetry core
//!
//! Device-side runtime for hardware-identified IoT endpoints talking to an
//! MQTT broker over mutual TLS.
//!
//! # Overview
//!
//! This crate provides the complete device-side plumbing:
//! - Identity resolution from a factory-provisioned secure element
//! - Network link supervision with unconditional reconnect
//! - Broker session lifecycle: retry, recovery, subscription restore
//! - Paced two-tier telemetry publishing with a monotonic counter
//! - Thread-safe status reporting for an operator display
//!
//! # Quick Start
//!
//! ```rust
//! use edgelink::identity::DeviceIdentity;
//! use edgelink::session::{Message, QosLevel, SessionTopics};
//!
//! // Identity renders the secure-element serial as uppercase hex
//! let identity = DeviceIdentity::from_serial(&[0x01, 0x23, 0x92]).unwrap();
//! assert_eq!(identity.as_str(), "012392");
//!
//! // Topics namespace everything under the identity
//! let topics = SessionTopics::for_identity(&identity);
//! assert_eq!(topics.subscribe_filter(), "012392/#");
//! assert_eq!(topics.publish_topic(), "012392/");
//!
//! // Telemetry messages carry a tier label and a monotonic counter
//! let message = Message::telemetry(
//!     topics.publish_topic(),
//!     "hello from SDK",
//!     QosLevel::AtMostOnce,
//!     0,
//! )
//! .unwrap();
//! assert_eq!(message.topic, "012392/");
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod identity;
pub mod observability;
pub mod session;
pub mod status;
pub mod testing;

// Re-export the boot-path types
pub use config::{BrokerSection, ConfigError, DeviceConfig, DeviceSection, TlsSection};
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, HostLink, LinkState};
pub use error::{DeviceResult, FatalError};
pub use identity::{DeviceIdentity, FactorySerial, IdentityProvider, SecureElement};
pub use session::{BrokerSession, MqttSession, SessionManager, SessionParams};
pub use status::{DisplayBuffer, StatusSink};
