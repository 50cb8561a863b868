//! Outbound modem events.
//!
//! The [`ModemActor`](crate::actor::ModemActor) turns driver callbacks and
//! request outcomes into these and hands them to an [`EventPublisher`].
//! On the device the publisher pushes onto the static event channel; tests
//! record them.

use heapless::{String, Vec};

use super::commands::RequestKind;
use crate::error::Error;
use crate::modem::SmsMessage;

/// Largest socket chunk or MQTT payload carried by one event.
pub const EVENT_PAYLOAD_MAX: usize = 512;

/// Where the actor sends its events. Must not block.
pub type EventPublisher = fn(ModemEvent);

/// Structured events emitted by the modem actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// A [`ModemRequest`](super::commands::ModemRequest) was executed.
    Completed {
        request: RequestKind,
        result: Result<(), Error>,
    },

    /// Bytes taken from a socket's ingress buffer.
    SocketData {
        id: u8,
        data: Vec<u8, EVENT_PAYLOAD_MAX>,
    },

    /// The module acknowledged a socket close.
    SocketClosed { id: u8 },

    /// A complete MQTT message.
    MqttMessage {
        client: u8,
        topic: String<128>,
        payload: Vec<u8, EVENT_PAYLOAD_MAX>,
    },

    /// An SMS read from storage.
    Sms(SmsMessage),

    /// The server answered an HTTP download.
    HttpPending { status: u16, content_length: usize },

    /// The download was written to the module filesystem.
    HttpFinished,

    /// The download failed after it was started.
    HttpFailed,
}
