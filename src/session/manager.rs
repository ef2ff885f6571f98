//! Session startup and the steady-state publish loop
//!
//! One task owns all session state. Startup runs once: wait for the link,
//! connect with indefinite fixed-interval retry, enable automatic
//! recovery, subscribe to the device's own topic space. The steady loop
//! then alternates transport yields with paced telemetry publishes until
//! a non-tolerated failure ends it and escalates as fatal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivitySignal;
use crate::error::{DeviceResult, FatalError};
use crate::identity::DeviceIdentity;
use crate::observability::metrics;
use crate::session::client::BrokerSession;
use crate::session::connection::{
    SessionError, SessionState, SessionStatus, CONNECT_RETRY_DELAY, PUBLISH_PACING, YIELD_BUDGET,
};
use crate::session::message::{Message, PublishCounter, QosLevel};
use crate::session::policy::{directive_for, failure_action, LoopDirective, PublishFailureAction};
use crate::session::topics::SessionTopics;
use crate::status::StatusSink;

/// Poll interval while waiting for the link to come up.
const LINK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owns the broker session for the life of the process.
pub struct SessionManager<B> {
    session: B,
    topics: SessionTopics,
    sink: Arc<dyn StatusSink>,
    signal: Arc<ConnectivitySignal>,
    greeting: String,
    counter: PublishCounter,
    state: SessionState,
}

impl<B: BrokerSession> SessionManager<B> {
    pub fn new(
        session: B,
        identity: &DeviceIdentity,
        sink: Arc<dyn StatusSink>,
        signal: Arc<ConnectivitySignal>,
        greeting: String,
    ) -> Self {
        Self {
            session,
            topics: SessionTopics::for_identity(identity),
            sink,
            signal,
            greeting,
            counter: PublishCounter::new(),
            state: SessionState::Disconnected,
        }
    }

    /// Session lifecycle state, for logging and inspection.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session until a fatal failure. Does not return otherwise.
    pub async fn run(mut self) -> DeviceResult<()> {
        self.start_session().await?;
        self.steady_loop().await
    }

    /// One-time startup sequence.
    async fn start_session(&mut self) -> DeviceResult<()> {
        self.await_link().await;

        self.state = SessionState::Connecting;
        self.connect_with_retry().await;
        self.sink.append_line("Connected to AWS IoT Core!");

        self.session
            .enable_auto_reconnect()
            .map_err(FatalError::auto_reconnect)?;

        let filter = self.topics.subscribe_filter().to_string();
        self.session
            .subscribe(&filter, QosLevel::AtMostOnce)
            .await
            .map_err(|source| FatalError::subscribe_failed(filter, source))?;

        self.state = SessionState::Connected;
        Ok(())
    }

    /// Block until the connectivity layer reports link-up.
    async fn await_link(&self) {
        if self.signal.is_connected() {
            return;
        }
        info!("Waiting for network link");
        while !self.signal.is_connected() {
            tokio::time::sleep(LINK_POLL_INTERVAL).await;
        }
        info!("Network link ready");
    }

    /// Indefinite fixed-interval connect loop; returns only on success.
    async fn connect_with_retry(&mut self) {
        let mut attempt: u64 = 1;
        loop {
            match self.session.connect().await {
                Ok(()) => {
                    info!(attempt, "Session established");
                    return;
                }
                Err(error) => {
                    metrics().connection_failed();
                    warn!(
                        attempt,
                        %error,
                        retry_in_secs = CONNECT_RETRY_DELAY.as_secs(),
                        "Connect failed; retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Yield, pace, publish; forever, unless a failure escalates.
    async fn steady_loop(&mut self) -> DeviceResult<()> {
        info!(topic = %self.topics.publish_topic(), "Entering steady-state publish loop");

        let error = loop {
            let status = self.session.drive(YIELD_BUDGET).await;

            match directive_for(&status) {
                LoopDirective::SkipPublish => {
                    if self.state != SessionState::Reconnecting {
                        self.state = SessionState::Reconnecting;
                        debug!("Session recovery in progress; publishing paused");
                    }
                    continue;
                }
                LoopDirective::Terminate => {
                    break match status {
                        SessionStatus::Failed(error) => error,
                        _ => SessionError::protocol("steady loop ended without a failure"),
                    };
                }
                LoopDirective::Publish => {}
            }

            if matches!(status, SessionStatus::Reconnected) {
                info!("Session recovered; resuming publishes");
            }
            self.state = SessionState::Connected;

            tokio::time::sleep(PUBLISH_PACING).await;
            if let Err(error) = self.publish_pair().await {
                break error;
            }
        };

        error!(%error, "An error occurred in the main loop");
        Err(FatalError::session_lost(error))
    }

    /// Publish the iteration's telemetry pair, applying per-tier tolerance.
    async fn publish_pair(&mut self) -> Result<(), SessionError> {
        for tier in [QosLevel::AtMostOnce, QosLevel::AtLeastOnce] {
            if let Err(error) = self.publish_tier(tier).await {
                metrics().publish_failure(tier);
                match failure_action(tier, &error) {
                    PublishFailureAction::Tolerate => match &error {
                        SessionError::AckTimeout { .. } => {
                            warn!(qos = tier.label(), "Publish ack not received");
                        }
                        _ => warn!(qos = tier.label(), %error, "Publish failed"),
                    },
                    PublishFailureAction::Escalate => return Err(error),
                }
            }
        }
        Ok(())
    }

    /// The counter advances at construction, not on publish success.
    async fn publish_tier(&mut self, tier: QosLevel) -> Result<(), SessionError> {
        let counter = self.counter.next();
        let message =
            Message::telemetry(self.topics.publish_topic(), &self.greeting, tier, counter)?;
        debug!(counter, qos = tier.label(), "Publishing telemetry");
        self.session.publish(&message).await?;
        metrics().message_published(tier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::TelemetryPayload;
    use crate::status::DisplayBuffer;
    use crate::testing::mocks::MockBrokerSession;
    use std::sync::atomic::Ordering;
    use tokio::time::Instant;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_serial(&[0xAA, 0xBB, 0xCC]).unwrap()
    }

    fn linked_signal() -> Arc<ConnectivitySignal> {
        let signal = Arc::new(ConnectivitySignal::new());
        signal.set_link_up();
        signal
    }

    fn manager_with(
        mock: MockBrokerSession,
    ) -> (SessionManager<MockBrokerSession>, Arc<DisplayBuffer>) {
        let sink = Arc::new(DisplayBuffer::new(16));
        let manager = SessionManager::new(
            mock,
            &identity(),
            sink.clone(),
            linked_signal(),
            "hello from SDK".to_string(),
        );
        (manager, sink)
    }

    fn decoded(payload: &[u8]) -> TelemetryPayload {
        serde_json::from_slice(payload).unwrap()
    }

    #[test]
    fn test_manager_starts_disconnected() {
        let (manager, _sink) = manager_with(MockBrokerSession::new());
        assert_eq!(*manager.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_on_fixed_interval_until_success() {
        let mock = MockBrokerSession::new()
            .with_connect_sequence(vec![
                Err(SessionError::connect_failed("refused")),
                Err(SessionError::connect_failed("refused")),
                Ok(()),
            ])
            .with_drive_sequence(vec![SessionStatus::Failed(SessionError::protocol("done"))]);
        let connects = mock.connect_count_handle();
        let subscriptions = mock.subscriptions_handle();
        let auto_reconnect = mock.auto_reconnect_handle();
        let (manager, sink) = manager_with(mock);

        let started = Instant::now();
        let result = manager.run().await;

        assert!(matches!(result, Err(FatalError::SessionLost(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 3);
        // Two failed attempts, each followed by the fixed 2 s delay.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(auto_reconnect.load(Ordering::SeqCst));
        assert_eq!(
            subscriptions.lock().unwrap().as_slice(),
            &[("AABBCC/#".to_string(), QosLevel::AtMostOnce)]
        );
        assert!(sink
            .lines()
            .iter()
            .any(|line| line.text.contains("Connected to AWS IoT Core!")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_is_fatal() {
        let mock = MockBrokerSession::new()
            .with_subscribe_sequence(vec![Err(SessionError::subscribe_failed("denied"))]);
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        match result {
            Err(FatalError::SubscribeFailed { topic, .. }) => {
                assert_eq!(topic, "AABBCC/#");
            }
            other => panic!("expected subscribe failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_failure_is_fatal() {
        let mock = MockBrokerSession::new()
            .with_enable_failure(SessionError::protocol("library rejected the call"));
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        assert!(matches!(result, Err(FatalError::AutoReconnect(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_loop_publishes_pair_with_advancing_counter() {
        let mock = MockBrokerSession::new().with_drive_sequence(vec![
            SessionStatus::Success,
            SessionStatus::Success,
            SessionStatus::Failed(SessionError::protocol("done")),
        ]);
        let published = mock.published_handle();
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;
        assert!(matches!(result, Err(FatalError::SessionLost(_))));

        let messages = published.lock().unwrap();
        assert_eq!(messages.len(), 4);
        for message in messages.iter() {
            assert_eq!(message.topic, "AABBCC/");
            assert!(!message.retained);
        }

        let counters: Vec<u64> = messages
            .iter()
            .map(|message| decoded(&message.payload).counter)
            .collect();
        assert_eq!(counters, vec![0, 1, 2, 3]);

        assert_eq!(messages[0].qos, QosLevel::AtMostOnce);
        assert_eq!(messages[1].qos, QosLevel::AtLeastOnce);
        assert_eq!(decoded(&messages[1].payload).tier, QosLevel::AtLeastOnce);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_once_failure_is_masked() {
        let mock = MockBrokerSession::new()
            .with_publish_sequence(vec![
                Err(SessionError::publish_failed("queue full")),
                Ok(()),
            ])
            .with_drive_sequence(vec![
                SessionStatus::Success,
                SessionStatus::Failed(SessionError::protocol("done")),
            ]);
        let published = mock.published_handle();
        let drives = mock.drive_count_handle();
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        // The loop survived the failed first-tier publish and only ended
        // on the scripted drive failure.
        assert!(matches!(result, Err(FatalError::SessionLost(_))));
        assert_eq!(published.lock().unwrap().len(), 2);
        assert_eq!(drives.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_timeout_on_at_least_once_is_tolerated() {
        let mock = MockBrokerSession::new()
            .with_publish_sequence(vec![
                Ok(()),
                Err(SessionError::ack_timeout(Duration::from_secs(20))),
            ])
            .with_drive_sequence(vec![
                SessionStatus::Success,
                SessionStatus::Failed(SessionError::protocol("done")),
            ]);
        let published = mock.published_handle();
        let drives = mock.drive_count_handle();
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        assert!(matches!(result, Err(FatalError::SessionLost(_))));
        assert_eq!(published.lock().unwrap().len(), 2);
        assert_eq!(drives.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_at_least_once_failure_ends_loop() {
        let mock = MockBrokerSession::new()
            .with_publish_sequence(vec![
                Ok(()),
                Err(SessionError::publish_failed("rejected by broker")),
            ])
            .with_drive_sequence(vec![SessionStatus::Success]);
        let drives = mock.drive_count_handle();
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        match result {
            Err(FatalError::SessionLost(SessionError::PublishFailed { message })) => {
                assert!(message.contains("rejected by broker"));
            }
            other => panic!("expected escalated publish failure, got {other:?}"),
        }
        assert_eq!(drives.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishing_skipped_while_reconnecting() {
        let mock = MockBrokerSession::new().with_drive_sequence(vec![
            SessionStatus::ReconnectInProgress,
            SessionStatus::ReconnectInProgress,
            SessionStatus::Reconnected,
            SessionStatus::Failed(SessionError::protocol("done")),
        ]);
        let published = mock.published_handle();
        let drives = mock.drive_count_handle();
        let (manager, _sink) = manager_with(mock);

        let result = manager.run().await;

        assert!(matches!(result, Err(FatalError::SessionLost(_))));
        // Only the post-recovery iteration published; skipped iterations
        // advanced neither the counter nor the publish log.
        let messages = published.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(decoded(&messages[0].payload).counter, 0);
        assert_eq!(decoded(&messages[1].payload).counter, 1);
        assert_eq!(drives.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_link_before_connecting() {
        let signal = Arc::new(ConnectivitySignal::new());
        let mock = MockBrokerSession::new();
        let connects = mock.connect_count_handle();
        let sink = Arc::new(DisplayBuffer::new(16));
        let manager = SessionManager::new(
            mock,
            &identity(),
            sink,
            signal.clone(),
            "hello from SDK".to_string(),
        );

        let handle = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        signal.set_link_up();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(connects.load(Ordering::SeqCst) >= 1);

        handle.abort();
    }
}
