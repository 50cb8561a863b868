//! Inter-task channels for the modem actor.
//!
//! Bounded `embassy-sync` channels shared as statics, so any thread can
//! queue a request and the actor thread can publish events without heap
//! allocation.
//!
//! ```text
//! ┌──────────────┐  ModemRequest  ┌──────────────┐
//! │  App tasks   │───────────────▶│ Modem actor  │
//! │              │◀───────────────│ (own thread) │
//! └──────────────┘   ModemEvent   └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::commands::ModemRequest;
use crate::app::events::ModemEvent;

/// Channel depth for inbound requests.
const REQUEST_DEPTH: usize = 8;

/// Channel depth for outbound events.
const EVENT_DEPTH: usize = 16;

/// App tasks → modem actor.
pub static REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, ModemRequest, REQUEST_DEPTH> =
    Channel::new();

/// Modem actor → app tasks.
pub static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, ModemEvent, EVENT_DEPTH> =
    Channel::new();

/// Queue a request for the actor. Returns `false` when the channel is full.
pub fn send_request(req: ModemRequest) -> bool {
    if REQUEST_CHANNEL.try_send(req).is_err() {
        warn!("modem: request channel full, dropping request");
        return false;
    }
    true
}

/// Next pending event, if any.
pub fn try_recv_event() -> Option<ModemEvent> {
    EVENT_CHANNEL.try_receive().ok()
}

/// [`EventPublisher`](crate::app::events::EventPublisher) backed by
/// [`EVENT_CHANNEL`]. Drops the event when nobody keeps up.
pub fn publish_event(event: ModemEvent) {
    if let Err(embassy_sync::channel::TrySendError::Full(event)) = EVENT_CHANNEL.try_send(event) {
        warn!("modem: event channel full, dropping {:?}", event);
    }
}
