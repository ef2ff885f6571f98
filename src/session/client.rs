//! Impure broker session I/O
//!
//! Owns the rumqttc client and event loop, driven inline from the session
//! manager's task. Connection recovery also runs inline: polling the event
//! loop after a transport error starts the next connect attempt, so drive
//! passes double as the automatic reconnect, paced by the backoff ladder.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, EventLoop};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::observability::metrics;
use crate::session::connection::{
    SessionError, SessionParams, SessionStatus, COMMAND_TIMEOUT, HANDSHAKE_TIMEOUT,
};
use crate::session::events::{EventRouter, SessionEvent};
use crate::session::message::{Message, QosLevel};

/// Broker-facing session operations used by the session manager.
#[async_trait]
pub trait BrokerSession: Send {
    /// Open the session and wait for the broker's acknowledgment.
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Enable automatic session recovery for subsequent drive passes.
    fn enable_auto_reconnect(&mut self) -> Result<(), SessionError>;

    /// Subscribe to a topic filter and wait for the broker's confirmation.
    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), SessionError>;

    /// Give the transport a bounded slice of time to make progress.
    async fn drive(&mut self, budget: Duration) -> SessionStatus;

    /// Publish one message; at-least-once waits for the acknowledgment.
    async fn publish(&mut self, message: &Message) -> Result<(), SessionError>;

    /// Whether the session currently holds a confirmed connection.
    fn is_connected(&self) -> bool;
}

fn to_transport_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// rumqttc-backed broker session.
pub struct MqttSession {
    params: SessionParams,
    client: AsyncClient,
    event_loop: EventLoop,
    connected: bool,
    auto_reconnect: bool,
    reconnecting: bool,
    reconnect_attempts: u32,
    /// Earliest instant the next recovery poll may run.
    resume_at: Option<Instant>,
    /// Filters to restore after a reconnect.
    subscribed: Vec<(String, QosLevel)>,
}

impl MqttSession {
    /// Build the session. No connection is attempted until `connect`.
    pub fn new(params: SessionParams) -> Self {
        let options = params.build_options();
        let (client, event_loop) = AsyncClient::new(options, 10);

        Self {
            params,
            client,
            event_loop,
            connected: false,
            auto_reconnect: false,
            reconnecting: false,
            reconnect_attempts: 0,
            resume_at: None,
            subscribed: Vec::new(),
        }
    }

    /// One bounded event loop poll, routed. `None` means the budget ran out.
    async fn poll_routed(
        &mut self,
        budget: Duration,
    ) -> Option<Result<SessionEvent, ConnectionError>> {
        match tokio::time::timeout(budget, self.event_loop.poll()).await {
            Ok(Ok(event)) => Some(Ok(EventRouter::route(&event))),
            Ok(Err(error)) => Some(Err(error)),
            Err(_) => None,
        }
    }

    /// Side effects for events that can arrive during any wait.
    fn absorb(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                metrics().message_received();
                info!(
                    %topic,
                    retain,
                    payload = %String::from_utf8_lossy(payload),
                    "Received message"
                );
            }
            SessionEvent::SubscriptionConfirmed { packet_id, .. } => {
                debug!(packet_id, "Subscription confirmed");
            }
            SessionEvent::PublishAcknowledged { packet_id, .. } => {
                // Ack for an earlier publish whose wait already timed out.
                debug!(packet_id, "Late publish acknowledgment");
            }
            SessionEvent::Infrastructure(event) => trace!(%event, "Transport event"),
            SessionEvent::Outgoing => {}
            _ => {}
        }
    }

    /// React to an unexpected session loss.
    ///
    /// With automatic reconnect the transport recovers on its own across
    /// subsequent drive passes. Without it, exactly one manual reconnect is
    /// attempted before the failure surfaces.
    async fn recover_or_fail(&mut self, error: SessionError) -> SessionStatus {
        self.connected = false;

        if self.auto_reconnect {
            self.begin_recovery(error)
        } else {
            self.manual_reconnect(error).await
        }
    }

    /// Enter or continue automatic recovery, pacing the next attempt.
    fn begin_recovery(&mut self, error: SessionError) -> SessionStatus {
        if !self.reconnecting {
            self.reconnecting = true;
            self.reconnect_attempts = 0;
            metrics().reconnect_started();
            warn!(%error, "Session lost; automatic recovery started");
        }

        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        let delay = self.params.pacing.delay_for_attempt(self.reconnect_attempts);
        self.resume_at = Some(Instant::now() + delay);
        debug!(
            attempt = self.reconnect_attempts,
            delay_secs = delay.as_secs(),
            "Next recovery attempt paced"
        );

        SessionStatus::ReconnectInProgress
    }

    /// One manual recovery attempt for sessions without automatic reconnect.
    ///
    /// On failure the original session error surfaces, not the reconnect's.
    async fn manual_reconnect(&mut self, error: SessionError) -> SessionStatus {
        warn!(%error, "Session lost without automatic recovery; attempting one manual reconnect");

        match self.connect().await {
            Ok(()) => {
                info!("Manual reconnect successful");
                self.restore_subscriptions().await;
                SessionStatus::Reconnected
            }
            Err(reconnect_error) => {
                warn!(%reconnect_error, "Manual reconnect failed");
                SessionStatus::Failed(error)
            }
        }
    }

    /// Restore tracked subscriptions after a reconnect.
    async fn restore_subscriptions(&mut self) {
        for (filter, qos) in self.subscribed.clone() {
            match self
                .client
                .subscribe(filter.as_str(), to_transport_qos(qos))
                .await
            {
                Ok(()) => debug!(%filter, "Re-subscribed after recovery"),
                Err(error) => warn!(%filter, %error, "Re-subscribe failed after recovery"),
            }
        }
    }

    /// Complete an in-progress recovery after the broker's acknowledgment.
    async fn finish_recovery(&mut self) {
        let attempts = self.reconnect_attempts;
        self.connected = true;
        self.reconnecting = false;
        self.reconnect_attempts = 0;
        self.resume_at = None;
        metrics().reconnect_completed();
        info!(attempts, "Session recovered");
        self.restore_subscriptions().await;
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        metrics().connection_attempt();
        info!(
            endpoint = %self.params.endpoint(),
            client_id = %self.params.client_id,
            "Connecting to broker"
        );

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::connect_failed(
                    "no broker acknowledgment within handshake budget",
                ));
            }

            match self.poll_routed(remaining).await {
                Some(Ok(SessionEvent::ConnectionAcknowledged { session_present })) => {
                    self.connected = true;
                    metrics().session_established();
                    info!(session_present, "Broker acknowledged connection");
                    return Ok(());
                }
                Some(Ok(SessionEvent::ConnectionRefused { code })) => {
                    return Err(SessionError::connect_failed(format!(
                        "broker refused session: {code}"
                    )));
                }
                Some(Ok(other)) => self.absorb(&other),
                Some(Err(error)) => {
                    return Err(SessionError::connect_failed(error.to_string()));
                }
                None => {
                    return Err(SessionError::connect_failed(
                        "no broker acknowledgment within handshake budget",
                    ));
                }
            }
        }
    }

    fn enable_auto_reconnect(&mut self) -> Result<(), SessionError> {
        self.auto_reconnect = true;
        info!("Automatic session recovery enabled");
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::not_connected());
        }

        info!(%filter, qos = qos.label(), "Subscribing");
        self.client
            .subscribe(filter, to_transport_qos(qos))
            .await
            .map_err(|error| SessionError::subscribe_failed(error.to_string()))?;

        let deadline = Instant::now() + COMMAND_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::subscribe_failed(
                    "no confirmation within command budget",
                ));
            }

            match self.poll_routed(remaining).await {
                Some(Ok(SessionEvent::SubscriptionConfirmed { packet_id, rejected })) => {
                    if rejected.is_empty() {
                        debug!(packet_id, %filter, "Subscription granted");
                        self.subscribed.push((filter.to_string(), qos));
                        return Ok(());
                    }
                    return Err(SessionError::subscribe_failed(format!(
                        "broker rejected filter: {}",
                        rejected.join(", ")
                    )));
                }
                Some(Ok(SessionEvent::Disconnected { reason })) => {
                    self.connected = false;
                    return Err(SessionError::subscribe_failed(format!(
                        "session closed while awaiting confirmation: {reason}"
                    )));
                }
                Some(Ok(other)) => self.absorb(&other),
                Some(Err(error)) => {
                    self.connected = false;
                    return Err(SessionError::subscribe_failed(error.to_string()));
                }
                None => {
                    return Err(SessionError::subscribe_failed(
                        "no confirmation within command budget",
                    ));
                }
            }
        }
    }

    async fn drive(&mut self, budget: Duration) -> SessionStatus {
        // Between paced recovery attempts the pass only sleeps.
        if self.reconnecting {
            if let Some(resume_at) = self.resume_at {
                if Instant::now() < resume_at {
                    tokio::time::sleep(budget).await;
                    return SessionStatus::ReconnectInProgress;
                }
            }
        }

        let deadline = Instant::now() + budget;
        let mut recovered = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.poll_routed(remaining).await {
                Some(Ok(SessionEvent::ConnectionAcknowledged { .. })) => {
                    if self.reconnecting {
                        self.finish_recovery().await;
                        recovered = true;
                    } else {
                        self.connected = true;
                    }
                }
                Some(Ok(SessionEvent::ConnectionRefused { code })) => {
                    return self
                        .recover_or_fail(SessionError::protocol(format!(
                            "broker refused session: {code}"
                        )))
                        .await;
                }
                Some(Ok(SessionEvent::Disconnected { reason })) => {
                    return self
                        .recover_or_fail(SessionError::protocol(format!(
                            "session closed: {reason}"
                        )))
                        .await;
                }
                Some(Ok(other)) => self.absorb(&other),
                Some(Err(error)) => {
                    return self
                        .recover_or_fail(SessionError::protocol(error.to_string()))
                        .await;
                }
                None => break,
            }
        }

        if recovered {
            SessionStatus::Reconnected
        } else if self.reconnecting {
            SessionStatus::ReconnectInProgress
        } else {
            SessionStatus::Success
        }
    }

    async fn publish(&mut self, message: &Message) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::not_connected());
        }

        self.client
            .publish(
                message.topic.clone(),
                to_transport_qos(message.qos),
                message.retained,
                message.payload.clone(),
            )
            .await
            .map_err(|error| SessionError::publish_failed(error.to_string()))?;

        match message.qos {
            QosLevel::AtMostOnce => Ok(()),
            QosLevel::AtLeastOnce => {
                // Single publish in flight per iteration; any ack is ours.
                let deadline = Instant::now() + COMMAND_TIMEOUT;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SessionError::ack_timeout(COMMAND_TIMEOUT));
                    }

                    match self.poll_routed(remaining).await {
                        Some(Ok(SessionEvent::PublishAcknowledged { packet_id, accepted })) => {
                            if accepted {
                                debug!(packet_id, "Publish acknowledged");
                                return Ok(());
                            }
                            return Err(SessionError::publish_failed(format!(
                                "broker rejected publish {packet_id}"
                            )));
                        }
                        Some(Ok(SessionEvent::Disconnected { reason })) => {
                            self.connected = false;
                            return Err(SessionError::protocol(format!(
                                "session closed while awaiting acknowledgment: {reason}"
                            )));
                        }
                        Some(Ok(other)) => self.absorb(&other),
                        Some(Err(error)) => {
                            self.connected = false;
                            return Err(SessionError::publish_failed(format!(
                                "transport failed while awaiting acknowledgment: {error}"
                            )));
                        }
                        None => return Err(SessionError::ack_timeout(COMMAND_TIMEOUT)),
                    }
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.reconnecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerSection;
    use crate::identity::DeviceIdentity;
    use crate::session::topics::SessionTopics;

    fn session() -> MqttSession {
        let identity = DeviceIdentity::from_serial(&[0xAA, 0xBB, 0xCC]).unwrap();
        let broker = BrokerSection {
            host: "localhost".to_string(),
            port: 1883,
            tls: None,
        };
        let params = SessionParams::from_config(&identity, &broker).unwrap();
        MqttSession::new(params)
    }

    #[test]
    fn test_transport_qos_mapping() {
        assert_eq!(to_transport_qos(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(to_transport_qos(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn test_session_starts_disconnected() {
        let session = session();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_publish_before_connect_is_guarded() {
        let identity = DeviceIdentity::from_serial(&[0xAA, 0xBB, 0xCC]).unwrap();
        let topics = SessionTopics::for_identity(&identity);
        let message = Message::telemetry(
            topics.publish_topic(),
            "hello from SDK",
            QosLevel::AtMostOnce,
            0,
        )
        .unwrap();

        let mut session = session();
        let result = session.publish(&message).await;

        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_is_guarded() {
        let mut session = session();
        let result = session.subscribe("AABBCC/#", QosLevel::AtMostOnce).await;

        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failure_with_auto_reconnect_enters_recovery() {
        let mut session = session();
        session.enable_auto_reconnect().unwrap();

        let status = session.begin_recovery(SessionError::protocol("session closed"));

        assert!(matches!(status, SessionStatus::ReconnectInProgress));
        assert_eq!(session.reconnect_attempts, 1);
        assert!(session.resume_at.is_some());
        assert!(!session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_walk_the_ladder() {
        let mut session = session();
        session.enable_auto_reconnect().unwrap();

        for expected_attempt in 1..=8u32 {
            let status = session.begin_recovery(SessionError::protocol("still down"));
            assert!(matches!(status, SessionStatus::ReconnectInProgress));
            assert_eq!(session.reconnect_attempts, expected_attempt);
        }

        // Beyond the ladder the pacing holds at the sustained delay.
        let before = Instant::now();
        session.begin_recovery(SessionError::protocol("still down"));
        let resume_at = session.resume_at.unwrap();
        let delay = resume_at.saturating_duration_since(before);
        assert!(delay <= Duration::from_secs(60));
        assert!(delay > Duration::from_secs(58));
    }

    #[tokio::test]
    async fn test_recovery_completion_resets_pacing() {
        let mut session = session();
        session.enable_auto_reconnect().unwrap();
        session.begin_recovery(SessionError::protocol("session closed"));
        assert!(session.reconnecting);

        session.finish_recovery().await;

        assert!(session.is_connected());
        assert!(!session.reconnecting);
        assert_eq!(session.reconnect_attempts, 0);
        assert!(session.resume_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_failure_preserves_original_error() {
        // No broker is listening, so the single manual attempt fails and
        // the original session error is the one that surfaces.
        let mut session = session();

        let status = session
            .recover_or_fail(SessionError::protocol("session closed"))
            .await;

        match status {
            SessionStatus::Failed(SessionError::Protocol { message }) => {
                assert!(message.contains("session closed"));
            }
            other => panic!("expected original failure, got {other:?}"),
        }
    }
}
