//! Session parameters, timing policy, and the session error taxonomy
//!
//! Pure configuration for the broker session: timing constants fixed by
//! contract, credential loading, and the rumqttc options build. The only
//! I/O here is reading the TLS credential files, once, at session start.

use std::path::PathBuf;
use std::time::Duration;

use rumqttc::v5::MqttOptions;
use rumqttc::TlsConfiguration;
use rumqttc::Transport as RumqttcTransport;
use thiserror::Error;

use crate::config::BrokerSection;
use crate::identity::DeviceIdentity;

/// Per-command acknowledgment budget (subscribe acks, QoS 1 acks).
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(20);
/// Budget for connect + TLS handshake + ConnAck.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Broker keep-alive interval.
pub const KEEP_ALIVE: Duration = Duration::from_secs(10);
/// Transport yield budget per steady-loop iteration.
pub const YIELD_BUDGET: Duration = Duration::from_millis(100);
/// Pacing sleep before each publish pair.
pub const PUBLISH_PACING: Duration = Duration::from_secs(1);
/// Fixed delay between initial connect attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Broker session lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session established yet.
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// Session established and usable.
    Connected,
    /// Transport is recovering the session on its own.
    Reconnecting,
}

/// Outcome of one drive pass; the steady loop's controlling value.
#[derive(Debug)]
pub enum SessionStatus {
    /// Session healthy.
    Success,
    /// Automatic reconnect in progress; publishing should be skipped.
    ReconnectInProgress,
    /// An automatic reconnect just completed.
    Reconnected,
    /// The session failed; loop-ending unless the failure is tolerated.
    Failed(SessionError),
}

/// Pacing ladder for the transport's automatic reconnect.
///
/// One entry per consecutive failed attempt, then the sustained delay
/// forever. The session manager's own initial connect loop does not use
/// this; it retries on the fixed 2 s interval.
#[derive(Debug, Clone)]
pub struct ReconnectPacing {
    /// Delay ladder in seconds.
    pub ladder: Vec<u64>,
    /// Delay in seconds once the ladder is exhausted.
    pub sustained: u64,
}

impl Default for ReconnectPacing {
    fn default() -> Self {
        Self {
            ladder: vec![1, 2, 4, 8, 16, 32],
            sustained: 60,
        }
    }
}

impl ReconnectPacing {
    /// Delay before the given attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1)) as usize;
        let secs = self
            .ladder
            .get(index)
            .copied()
            .unwrap_or(self.sustained);
        Duration::from_secs(secs)
    }
}

/// Loaded TLS credential material, read once at session start.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of logs.
        f.debug_struct("TlsMaterial")
            .field("ca_len", &self.ca.len())
            .field("client_cert_len", &self.client_cert.len())
            .finish()
    }
}

/// Everything needed to open one broker session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    /// Hex device identity, used verbatim as the broker client id.
    pub client_id: String,
    pub tls: Option<TlsMaterial>,
    pub pacing: ReconnectPacing,
}

impl SessionParams {
    /// Build params from broker config and the resolved identity.
    ///
    /// Loads TLS credentials eagerly so a bad provisioning path fails the
    /// session initialization instead of the first connect attempt.
    pub fn from_config(
        identity: &DeviceIdentity,
        broker: &BrokerSection,
    ) -> Result<Self, SessionError> {
        let tls = match &broker.tls {
            Some(section) => Some(TlsMaterial {
                ca: read_credential(&section.root_ca_path)?,
                client_cert: read_credential(&section.certificate_path)?,
                client_key: read_credential(&section.private_key_path)?,
            }),
            None => None,
        };

        Ok(Self {
            host: broker.host.clone(),
            port: broker.port,
            client_id: identity.as_str().to_string(),
            tls,
            pacing: ReconnectPacing::default(),
        })
    }

    /// Human-readable endpoint for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the rumqttc options for this session.
    ///
    /// Clean start per session; with TLS material present the transport
    /// does full mutual TLS and hostname verification (rustls default).
    pub fn build_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);

        if let Some(material) = &self.tls {
            options.set_transport(RumqttcTransport::Tls(TlsConfiguration::Simple {
                ca: material.ca.clone(),
                alpn: None,
                client_auth: Some((material.client_cert.clone(), material.client_key.clone())),
            }));
        }

        options
    }
}

fn read_credential(path: &PathBuf) -> Result<Vec<u8>, SessionError> {
    std::fs::read(path).map_err(|source| SessionError::Credentials {
        path: path.clone(),
        source,
    })
}

/// Errors raised by the broker session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect failed: {message}")]
    ConnectFailed { message: String },

    #[error("Publish failed: {message}")]
    PublishFailed { message: String },

    #[error("Acknowledgment timeout after {waited_ms} ms")]
    AckTimeout { waited_ms: u64 },

    #[error("Subscribe failed: {message}")]
    SubscribeFailed { message: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Session protocol failure: {message}")]
    Protocol { message: String },

    #[error("Credential file '{path}' unreadable: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub fn connect_failed<S: Into<String>>(message: S) -> Self {
        Self::ConnectFailed {
            message: message.into(),
        }
    }

    pub fn publish_failed<S: Into<String>>(message: S) -> Self {
        Self::PublishFailed {
            message: message.into(),
        }
    }

    pub fn ack_timeout(waited: Duration) -> Self {
        Self::AckTimeout {
            waited_ms: waited.as_millis() as u64,
        }
    }

    pub fn subscribe_failed<S: Into<String>>(message: S) -> Self {
        Self::SubscribeFailed {
            message: message.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::NotConnected
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsSection;
    use std::io::Write;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_serial(&[0xAA, 0xBB, 0xCC]).unwrap()
    }

    fn plain_broker() -> BrokerSection {
        BrokerSection {
            host: "broker.example.com".to_string(),
            port: 8883,
            tls: None,
        }
    }

    #[test]
    fn test_params_use_identity_as_client_id() {
        let params = SessionParams::from_config(&identity(), &plain_broker()).unwrap();

        assert_eq!(params.client_id, "AABBCC");
        assert_eq!(params.endpoint(), "broker.example.com:8883");
        assert!(params.tls.is_none());
    }

    #[test]
    fn test_tls_material_loaded_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &[u8]| {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(content).unwrap();
            path
        };

        let broker = BrokerSection {
            host: "broker.example.com".to_string(),
            port: 8883,
            tls: Some(TlsSection {
                root_ca_path: write("ca.pem", b"ca bytes"),
                certificate_path: write("cert.pem", b"cert bytes"),
                private_key_path: write("key.pem", b"key bytes"),
            }),
        };

        let params = SessionParams::from_config(&identity(), &broker).unwrap();
        let material = params.tls.as_ref().unwrap();

        assert_eq!(material.ca, b"ca bytes");
        assert_eq!(material.client_cert, b"cert bytes");
        assert_eq!(material.client_key, b"key bytes");
    }

    #[test]
    fn test_missing_credential_fails_init() {
        let broker = BrokerSection {
            host: "broker.example.com".to_string(),
            port: 8883,
            tls: Some(TlsSection {
                root_ca_path: PathBuf::from("/missing/ca.pem"),
                certificate_path: PathBuf::from("/missing/cert.pem"),
                private_key_path: PathBuf::from("/missing/key.pem"),
            }),
        };

        let result = SessionParams::from_config(&identity(), &broker);

        match result {
            Err(SessionError::Credentials { path, .. }) => {
                assert_eq!(path, PathBuf::from("/missing/ca.pem"));
            }
            other => panic!("expected credential error, got {other:?}"),
        }
    }

    #[test]
    fn test_tls_material_debug_hides_key() {
        let material = TlsMaterial {
            ca: vec![1],
            client_cert: vec![2],
            client_key: b"super secret".to_vec(),
        };

        let rendered = format!("{material:?}");
        assert!(!rendered.contains("super secret"));
    }

    #[test]
    fn test_reconnect_pacing_ladder() {
        let pacing = ReconnectPacing::default();

        assert_eq!(pacing.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(pacing.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(pacing.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(pacing.delay_for_attempt(6), Duration::from_secs(32));

        // Ladder exhausted: sustain.
        assert_eq!(pacing.delay_for_attempt(7), Duration::from_secs(60));
        assert_eq!(pacing.delay_for_attempt(100), Duration::from_secs(60));
    }

    #[test]
    fn test_timing_constants() {
        assert_eq!(COMMAND_TIMEOUT, Duration::from_secs(20));
        assert_eq!(HANDSHAKE_TIMEOUT, Duration::from_secs(5));
        assert_eq!(KEEP_ALIVE, Duration::from_secs(10));
        assert_eq!(YIELD_BUDGET, Duration::from_millis(100));
        assert_eq!(PUBLISH_PACING, Duration::from_secs(1));
        assert_eq!(CONNECT_RETRY_DELAY, Duration::from_secs(2));
    }

    #[test]
    fn test_session_error_display() {
        let errors = vec![
            SessionError::connect_failed("refused"),
            SessionError::publish_failed("queue full"),
            SessionError::ack_timeout(Duration::from_secs(20)),
            SessionError::subscribe_failed("denied"),
            SessionError::not_connected(),
            SessionError::protocol("server went away"),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_session_state_equality() {
        assert_eq!(SessionState::Connected, SessionState::Connected);
        assert_ne!(SessionState::Connected, SessionState::Reconnecting);
    }
}
