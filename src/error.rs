//! Fatal error taxonomy for the device task
//!
//! Every variant here is unrecoverable by design: the supervisor in `main`
//! logs it and terminates the process. Recoverable conditions (connect
//! retries, tolerated publish failures, link drops) are handled inside the
//! connectivity and session modules and never surface as a `FatalError`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::session::SessionError;

/// Unrecoverable failures of the device's primary task
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Device identity unavailable: {0}")]
    Identity(#[from] IdentityError),

    #[error("Session initialization failed: {0}")]
    SessionInit(#[source] SessionError),

    #[error("Enabling automatic reconnect failed: {0}")]
    AutoReconnect(#[source] SessionError),

    #[error("Subscribe to '{topic}' failed: {source}")]
    SubscribeFailed {
        topic: String,
        #[source]
        source: SessionError,
    },

    #[error("Steady-state session loop ended: {0}")]
    SessionLost(#[source] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FatalError {
    /// Create a session initialization error
    pub fn session_init(source: SessionError) -> Self {
        Self::SessionInit(source)
    }

    /// Create an auto-reconnect configuration error
    pub fn auto_reconnect(source: SessionError) -> Self {
        Self::AutoReconnect(source)
    }

    /// Create a subscribe failure for the given topic filter
    pub fn subscribe_failed<S: Into<String>>(topic: S, source: SessionError) -> Self {
        Self::SubscribeFailed {
            topic: topic.into(),
            source,
        }
    }

    /// Create a steady-loop termination error
    pub fn session_lost(source: SessionError) -> Self {
        Self::SessionLost(source)
    }
}

/// Result type for device-task operations
pub type DeviceResult<T> = Result<T, FatalError>;
