//! Mock implementations for testing
//!
//! Provides mock BrokerSession and LinkDriver implementations to enable
//! comprehensive testing without external dependencies.

use crate::connectivity::{LinkDriver, LinkError};
use crate::session::{BrokerSession, Message, QosLevel, SessionError, SessionStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock broker session driven by scripted outcomes.
///
/// Each operation pops the next scripted result for that call; an exhausted
/// script succeeds, so a mock with no script behaves like a healthy broker.
/// Calls are recorded before the outcome is applied, which makes failed
/// attempts visible to assertions.
#[derive(Debug, Default)]
pub struct MockBrokerSession {
    connect_results: VecDeque<Result<(), SessionError>>,
    enable_failure: Option<SessionError>,
    subscribe_results: VecDeque<Result<(), SessionError>>,
    drive_statuses: VecDeque<SessionStatus>,
    publish_results: VecDeque<Result<(), SessionError>>,
    connected: bool,
    connect_count: Arc<AtomicUsize>,
    drive_count: Arc<AtomicUsize>,
    published: Arc<Mutex<Vec<Message>>>,
    subscriptions: Arc<Mutex<Vec<(String, QosLevel)>>>,
    auto_reconnect: Arc<AtomicBool>,
}

impl MockBrokerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of successive `connect` calls.
    pub fn with_connect_sequence(mut self, results: Vec<Result<(), SessionError>>) -> Self {
        self.connect_results = results.into();
        self
    }

    /// Make the first `enable_auto_reconnect` call fail.
    pub fn with_enable_failure(mut self, error: SessionError) -> Self {
        self.enable_failure = Some(error);
        self
    }

    /// Script the outcome of successive `subscribe` calls.
    pub fn with_subscribe_sequence(mut self, results: Vec<Result<(), SessionError>>) -> Self {
        self.subscribe_results = results.into();
        self
    }

    /// Script the status reported by successive `drive` calls.
    pub fn with_drive_sequence(mut self, statuses: Vec<SessionStatus>) -> Self {
        self.drive_statuses = statuses.into();
        self
    }

    /// Script the outcome of successive `publish` calls.
    pub fn with_publish_sequence(mut self, results: Vec<Result<(), SessionError>>) -> Self {
        self.publish_results = results.into();
        self
    }

    /// Counter of `connect` calls, usable after the mock is moved.
    pub fn connect_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connect_count)
    }

    /// Counter of `drive` calls, usable after the mock is moved.
    pub fn drive_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.drive_count)
    }

    /// Every message handed to `publish`, including failed attempts.
    pub fn published_handle(&self) -> Arc<Mutex<Vec<Message>>> {
        Arc::clone(&self.published)
    }

    /// Every filter handed to `subscribe`, including failed attempts.
    pub fn subscriptions_handle(&self) -> Arc<Mutex<Vec<(String, QosLevel)>>> {
        Arc::clone(&self.subscriptions)
    }

    /// Whether `enable_auto_reconnect` has succeeded.
    pub fn auto_reconnect_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.auto_reconnect)
    }
}

#[async_trait]
impl BrokerSession for MockBrokerSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.connected = true;
        }
        result
    }

    fn enable_auto_reconnect(&mut self) -> Result<(), SessionError> {
        match self.enable_failure.take() {
            Some(error) => Err(error),
            None => {
                self.auto_reconnect.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), SessionError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn drive(&mut self, _budget: Duration) -> SessionStatus {
        self.drive_count.fetch_add(1, Ordering::SeqCst);
        self.drive_statuses
            .pop_front()
            .unwrap_or(SessionStatus::Success)
    }

    async fn publish(&mut self, message: &Message) -> Result<(), SessionError> {
        self.published.lock().unwrap().push(message.clone());
        self.publish_results.pop_front().unwrap_or(Ok(()))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Mock link driver for testing the connectivity monitor.
#[derive(Debug, Default)]
pub struct MockLinkDriver {
    should_fail: bool,
    request_count: Arc<AtomicUsize>,
}

impl MockLinkDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Counter of `request_connect` calls, usable after the mock is moved.
    pub fn request_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.request_count)
    }
}

impl LinkDriver for MockLinkDriver {
    fn request_connect(&self) -> Result<(), LinkError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(LinkError::request_rejected("Mock connect failure"))
        } else {
            Ok(())
        }
    }
}
