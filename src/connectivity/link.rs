//! Pure wireless-link state machine
//!
//! Transitions are a pure function of (state, event) returning the next
//! state plus an ordered list of side effects. The impure shell in
//! `monitor` applies the effects; nothing here touches a network stack,
//! which keeps every transition testable in isolation.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Wireless link lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Monitor constructed, no connect request issued yet.
    Idle,
    /// Connect request outstanding, waiting for an address.
    LinkAcquiring,
    /// Link established, address assigned.
    LinkUp,
    /// Link lost; a fresh connect request is being arranged.
    LinkDown,
}

/// Events delivered by the link driver's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Driver finished starting up.
    DriverStarted,
    /// Joined the network, address assignment pending.
    Associated,
    /// Link established and an address was assigned.
    AddressAcquired(Ipv4Addr),
    /// Link lost, or the initial association failed.
    Disconnected,
    /// Signal strength report from the radio.
    SignalChanged(i8),
}

/// Side effects requested by a transition, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Ask the driver to (re)establish the link.
    RequestConnect,
    /// Status line carrying the acquired address.
    AnnounceAddress(Ipv4Addr),
    /// Status line announcing the retry.
    AnnounceRetry,
    /// Flip the panel's connectivity indicator.
    SetIndicator(bool),
    /// Mark the shared connectivity signal up.
    SignalConnected,
    /// Mark the shared connectivity signal down.
    SignalDisconnected,
}

/// Result of feeding one event through the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTransition {
    pub next: LinkState,
    pub actions: Vec<LinkAction>,
}

impl LinkTransition {
    fn ignore(state: LinkState) -> Self {
        Self {
            next: state,
            actions: Vec::new(),
        }
    }
}

/// Compute the transition for one link event.
///
/// An address acquisition always lands in `LinkUp` and announces exactly
/// once; a disconnect from any state lands in `LinkDown` and always
/// requests a new connection. Everything else is an explicit no-op.
pub fn transition(state: LinkState, event: &LinkEvent) -> LinkTransition {
    match event {
        LinkEvent::AddressAcquired(addr) => LinkTransition {
            next: LinkState::LinkUp,
            actions: vec![
                LinkAction::SignalConnected,
                LinkAction::SetIndicator(true),
                LinkAction::AnnounceAddress(*addr),
            ],
        },
        LinkEvent::Disconnected => LinkTransition {
            next: LinkState::LinkDown,
            actions: vec![
                LinkAction::AnnounceRetry,
                LinkAction::RequestConnect,
                LinkAction::SignalDisconnected,
                LinkAction::SetIndicator(false),
            ],
        },
        LinkEvent::DriverStarted | LinkEvent::Associated | LinkEvent::SignalChanged(_) => {
            LinkTransition::ignore(state)
        }
    }
}

/// State after the driver accepted a connect request.
///
/// The initial request (from `Idle`) and the retry request (from
/// `LinkDown`) are the same transition; established states are untouched.
pub fn after_connect_request(state: LinkState) -> LinkState {
    match state {
        LinkState::Idle | LinkState::LinkDown => LinkState::LinkAcquiring,
        LinkState::LinkAcquiring | LinkState::LinkUp => state,
    }
}

/// Errors raised by link drivers
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Link driver rejected connect request: {message}")]
    RequestRejected { message: String },

    #[error("Link driver unavailable: {message}")]
    Unavailable { message: String },
}

impl LinkError {
    pub fn request_rejected<S: Into<String>>(message: S) -> Self {
        Self::RequestRejected {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Command side of a wireless link driver.
///
/// Drivers rate-limit reconnection internally; callers may request a
/// connect as often as events demand. Events flow back out-of-band,
/// through whatever channel the platform wires to the monitor.
pub trait LinkDriver: Send + Sync {
    /// Ask the driver to (re)establish the link. Must not block.
    fn request_connect(&self) -> Result<(), LinkError>;
}

/// Driver for hosts where the operating system manages the interface.
///
/// There is no radio to command: a connect request probes for the egress
/// interface address and reports it as acquired. Real radio integrations
/// implement [`LinkDriver`] against their platform stack instead.
pub struct HostLink {
    events: tokio::sync::mpsc::Sender<LinkEvent>,
}

impl HostLink {
    pub fn new(events: tokio::sync::mpsc::Sender<LinkEvent>) -> Self {
        Self { events }
    }

    /// Address of the interface the OS would route external traffic over.
    ///
    /// Connecting a UDP socket selects the egress interface without
    /// sending any datagrams.
    fn local_address() -> Option<Ipv4Addr> {
        let socket = std::net::UdpSocket::bind(("0.0.0.0", 0)).ok()?;
        socket.connect(("8.8.8.8", 53)).ok()?;
        match socket.local_addr().ok()? {
            std::net::SocketAddr::V4(addr) => Some(*addr.ip()),
            std::net::SocketAddr::V6(_) => None,
        }
    }
}

impl LinkDriver for HostLink {
    fn request_connect(&self) -> Result<(), LinkError> {
        let addr = Self::local_address()
            .ok_or_else(|| LinkError::unavailable("no routable IPv4 interface"))?;

        self.events
            .try_send(LinkEvent::AddressAcquired(addr))
            .map_err(|_| LinkError::request_rejected("event channel closed or full"))?;

        Ok(())
    }
}
