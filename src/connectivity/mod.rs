//! Wireless-link connectivity: pure state machine plus its impure shell.

pub mod link;
pub mod monitor;

pub use link::{
    after_connect_request, transition, HostLink, LinkAction, LinkDriver, LinkError, LinkEvent,
    LinkState, LinkTransition,
};
pub use monitor::{spawn_event_pump, ConnectivityMonitor, ConnectivitySignal};
