//! Connectivity monitor shell
//!
//! Owns the link state and the shared connectivity signal, applies the
//! side effects computed by the pure machine in [`super::link`], and talks
//! to the status sink. Event handling runs on whatever context delivers
//! driver events and must never block it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::observability::metrics::metrics;
use crate::status::StatusSink;

use super::link::{
    after_connect_request, transition, LinkAction, LinkDriver, LinkEvent, LinkState,
};

/// Shared link-state flags, set by the monitor, readable anywhere.
///
/// An owned replacement for ambient event-group bits: the pair lives here
/// and is handed out behind an `Arc`. Both mutations are idempotent.
#[derive(Debug, Default)]
pub struct ConnectivitySignal {
    connected: AtomicBool,
    disconnected: AtomicBool,
}

impl ConnectivitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_link_up(&self) {
        self.disconnected.store(false, Ordering::Release);
        self.connected.store(true, Ordering::Release);
    }

    pub fn set_link_down(&self) {
        self.connected.store(false, Ordering::Release);
        self.disconnected.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

/// Impure owner of the wireless-link state machine.
pub struct ConnectivityMonitor<D> {
    driver: D,
    sink: Arc<dyn StatusSink>,
    signal: Arc<ConnectivitySignal>,
    state: LinkState,
}

impl<D: LinkDriver> ConnectivityMonitor<D> {
    pub fn new(driver: D, sink: Arc<dyn StatusSink>, signal: Arc<ConnectivitySignal>) -> Self {
        Self {
            driver,
            sink,
            signal,
            state: LinkState::Idle,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Handle to the shared connectivity signal.
    pub fn signal(&self) -> Arc<ConnectivitySignal> {
        Arc::clone(&self.signal)
    }

    /// Begin link acquisition by issuing the initial connect request.
    pub fn start(&mut self) {
        info!("Starting connectivity monitor");
        self.issue_connect_request();
    }

    /// Feed one driver event through the machine and apply its effects.
    ///
    /// Runs synchronously on the event-delivery context; every effect is
    /// bounded (status line append, flag store, driver request).
    pub fn handle_event(&mut self, event: LinkEvent) {
        let result = transition(self.state, &event);
        if result.next != self.state {
            debug!(from = ?self.state, to = ?result.next, ?event, "Link state transition");
        }

        let previous = self.state;
        self.state = result.next;
        self.record_transition(previous, self.state);

        for action in result.actions {
            self.apply(action);
        }
    }

    fn record_transition(&self, from: LinkState, to: LinkState) {
        if to == LinkState::LinkUp && from != LinkState::LinkUp {
            metrics().link_established();
        }
        if to == LinkState::LinkDown && from != LinkState::LinkDown {
            metrics().link_lost();
        }
    }

    fn apply(&mut self, action: LinkAction) {
        match action {
            LinkAction::RequestConnect => self.issue_connect_request(),
            LinkAction::AnnounceAddress(addr) => {
                info!(address = %addr, "Network link is up");
                self.sink.append_line(&format!("Network: {addr}"));
            }
            LinkAction::AnnounceRetry => {
                warn!("Network link lost, reconnecting");
                self.sink.append_line("Network connection failed.");
                self.sink.append_line("Retrying...");
            }
            LinkAction::SetIndicator(connected) => {
                self.sink.set_connectivity_indicator(connected);
            }
            LinkAction::SignalConnected => self.signal.set_link_up(),
            LinkAction::SignalDisconnected => self.signal.set_link_down(),
        }
    }

    fn issue_connect_request(&mut self) {
        match self.driver.request_connect() {
            Ok(()) => self.state = after_connect_request(self.state),
            // Driver stays in charge of its own pacing; the next link
            // event retriggers the request.
            Err(error) => warn!(%error, "Link connect request failed"),
        }
    }
}

/// Drive a monitor from a channel of driver events.
///
/// The platform layer owns the sending half; the task starts the monitor,
/// then pumps until the channel closes.
pub fn spawn_event_pump<D>(
    mut monitor: ConnectivityMonitor<D>,
    mut events: mpsc::Receiver<LinkEvent>,
) -> tokio::task::JoinHandle<()>
where
    D: LinkDriver + Send + 'static,
{
    tokio::spawn(async move {
        monitor.start();
        while let Some(event) = events.recv().await {
            monitor.handle_event(event);
        }
        debug!("Link event channel closed; connectivity monitor stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DisplayBuffer;
    use crate::testing::mocks::MockLinkDriver;
    use std::net::Ipv4Addr;

    fn monitor_with(
        driver: MockLinkDriver,
    ) -> (ConnectivityMonitor<MockLinkDriver>, Arc<DisplayBuffer>) {
        let sink = Arc::new(DisplayBuffer::new(16));
        let signal = Arc::new(ConnectivitySignal::new());
        let monitor = ConnectivityMonitor::new(driver, sink.clone() as Arc<dyn StatusSink>, signal);
        (monitor, sink)
    }

    #[test]
    fn test_start_issues_connect_request() {
        let driver = MockLinkDriver::new();
        let requests = driver.request_count_handle();
        let (mut monitor, _sink) = monitor_with(driver);

        monitor.start();

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.state(), LinkState::LinkAcquiring);
    }

    #[test]
    fn test_address_acquired_updates_sink_and_signal() {
        let (mut monitor, sink) = monitor_with(MockLinkDriver::new());
        let signal = monitor.signal();
        monitor.start();

        monitor.handle_event(LinkEvent::AddressAcquired(Ipv4Addr::new(10, 0, 0, 5)));

        assert_eq!(monitor.state(), LinkState::LinkUp);
        assert!(signal.is_connected());
        assert!(!signal.is_disconnected());
        assert!(sink.indicator());

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Network: 10.0.0.5");
    }

    #[test]
    fn test_disconnect_retriggers_and_reports() {
        let driver = MockLinkDriver::new();
        let requests = driver.request_count_handle();
        let (mut monitor, sink) = monitor_with(driver);
        let signal = monitor.signal();
        monitor.start();
        monitor.handle_event(LinkEvent::AddressAcquired(Ipv4Addr::new(10, 0, 0, 5)));

        monitor.handle_event(LinkEvent::Disconnected);

        // Initial request plus the retry.
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.state(), LinkState::LinkAcquiring);
        assert!(!signal.is_connected());
        assert!(signal.is_disconnected());
        assert!(!sink.indicator());
        assert!(sink
            .lines()
            .iter()
            .any(|line| line.text.contains("Retrying")));
    }

    #[test]
    fn test_failed_connect_request_leaves_state() {
        let driver = MockLinkDriver::with_failure();
        let (mut monitor, _sink) = monitor_with(driver);

        monitor.start();

        // Request failed, so the machine never left Idle.
        assert_eq!(monitor.state(), LinkState::Idle);
    }

    #[test]
    fn test_one_address_line_per_acquisition() {
        let (mut monitor, sink) = monitor_with(MockLinkDriver::new());
        monitor.start();

        monitor.handle_event(LinkEvent::AddressAcquired(Ipv4Addr::new(10, 0, 0, 5)));
        monitor.handle_event(LinkEvent::Disconnected);
        monitor.handle_event(LinkEvent::AddressAcquired(Ipv4Addr::new(10, 0, 0, 5)));

        let address_lines = sink
            .lines()
            .iter()
            .filter(|line| line.text.starts_with("Network: "))
            .count();
        assert_eq!(address_lines, 2);
    }

    #[test]
    fn test_ignored_events_touch_nothing() {
        let driver = MockLinkDriver::new();
        let requests = driver.request_count_handle();
        let (mut monitor, sink) = monitor_with(driver);
        monitor.start();

        monitor.handle_event(LinkEvent::DriverStarted);
        monitor.handle_event(LinkEvent::Associated);
        monitor.handle_event(LinkEvent::SignalChanged(-60));

        assert_eq!(monitor.state(), LinkState::LinkAcquiring);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(sink.lines().is_empty());
    }
}
