//! Pure routing of transport events into session events
//!
//! Turns rumqttc v5 events into the small set of events the session
//! manager acts on. No I/O; the impure side lives in the session client.

use rumqttc::v5::mqttbytes::v5::{PubAckReason, SubscribeReasonCode};
use rumqttc::v5::Event;

/// Session-level view of one transport event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Broker accepted the connection.
    ConnectionAcknowledged { session_present: bool },
    /// Broker refused the connection.
    ConnectionRefused { code: String },
    /// A message arrived on a subscribed topic.
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Broker answered a subscribe request.
    SubscriptionConfirmed {
        packet_id: u16,
        /// Reason codes for rejected filters; empty means fully granted.
        rejected: Vec<String>,
    },
    /// Broker acknowledged a QoS 1 publish.
    PublishAcknowledged { packet_id: u16, accepted: bool },
    /// Broker closed the session.
    Disconnected { reason: String },
    /// Pings, acks of acks, and other plumbing.
    Infrastructure(String),
    /// Outgoing packet; handled by the transport itself.
    Outgoing,
}

/// Pure routing decisions over transport events.
pub struct EventRouter;

impl EventRouter {
    /// Map a transport event to its session-level meaning.
    pub fn route(event: &Event) -> SessionEvent {
        use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};

        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(ack) => match ack.code {
                    ConnectReturnCode::Success => SessionEvent::ConnectionAcknowledged {
                        session_present: ack.session_present,
                    },
                    other => SessionEvent::ConnectionRefused {
                        code: format!("{other:?}"),
                    },
                },
                Packet::Publish(publish) => SessionEvent::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::SubAck(ack) => SessionEvent::SubscriptionConfirmed {
                    packet_id: ack.pkid,
                    rejected: ack
                        .return_codes
                        .iter()
                        .filter(|code| !Self::subscribe_code_accepted(code))
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                Packet::PubAck(ack) => SessionEvent::PublishAcknowledged {
                    packet_id: ack.pkid,
                    accepted: Self::puback_accepted(&ack.reason),
                },
                Packet::Disconnect(disconnect) => SessionEvent::Disconnected {
                    reason: format!("{:?}", disconnect.reason_code),
                },
                other => SessionEvent::Infrastructure(format!("{other:?}")),
            },
            Event::Outgoing(_) => SessionEvent::Outgoing,
        }
    }

    /// A granted filter reports the granted QoS; anything else is a rejection.
    fn subscribe_code_accepted(code: &SubscribeReasonCode) -> bool {
        matches!(code, SubscribeReasonCode::Success(_))
    }

    /// Success and no-matching-subscribers both count as delivered.
    fn puback_accepted(reason: &PubAckReason) -> bool {
        matches!(
            reason,
            PubAckReason::Success | PubAckReason::NoMatchingSubscribers
        )
    }
}
