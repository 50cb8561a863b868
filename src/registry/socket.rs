//! Socket table entry.
//!
//! ```text
//!  Inactive ──begin_open──▶ Opening ──open_confirmed(0)──▶ Connected
//!      ▲                       │                             │
//!      │                open_confirmed(≠0)              begin_close
//!      │                       ▼                             ▼
//!      └──────close_acked / remote_closed────────────── Closing
//! ```
//!
//! `connected` is tracked separately from the state: a close that the module
//! never acknowledges leaves it stale so the caller can retry.

use heapless::String;

use super::buffer::IngressBuffer;
use super::ids::ContextId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketState {
    #[default]
    Inactive,
    Opening,
    Connected,
    Closing,
}

/// Where a socket points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String<128>,
    pub port: u16,
    pub context: ContextId,
    /// TLS context id when the socket is secured.
    pub tls_profile: Option<u8>,
}

#[derive(Debug, Default)]
pub struct Socket {
    state: SocketState,
    active: bool,
    connected: bool,
    endpoint: Option<Endpoint>,
    pub(crate) buffer: IngressBuffer,
}

impl Socket {
    pub const fn new() -> Self {
        Self {
            state: SocketState::Inactive,
            active: false,
            connected: false,
            endpoint: None,
            buffer: IngressBuffer::new(),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_tls(&self) -> bool {
        self.endpoint.as_ref().is_some_and(|e| e.tls_profile.is_some())
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn buffer(&self) -> &IngressBuffer {
        &self.buffer
    }

    /// Connect request accepted: forget the previous connection's data.
    pub(crate) fn begin_open(&mut self, endpoint: Endpoint) {
        self.buffer.reset();
        self.endpoint = Some(endpoint);
        self.active = true;
        self.connected = false;
        self.state = SocketState::Opening;
    }

    /// `+QIOPEN` / `+QSSLOPEN` result. Returns whether the socket is up.
    pub(crate) fn open_confirmed(&mut self, result: u16, now_ms: u64) -> bool {
        if result == 0 {
            self.state = SocketState::Connected;
            self.connected = true;
            self.active = true;
            self.buffer.set_connected_since(now_ms);
        } else {
            self.connected = false;
        }
        self.connected
    }

    /// First half of a close: always leaves `active == false` and
    /// `pending == false`, whatever the module answers next.
    pub(crate) fn begin_close(&mut self) {
        self.active = false;
        self.buffer.clear_metadata();
        if self.state != SocketState::Inactive {
            self.state = SocketState::Closing;
        }
    }

    /// `closed` notification: the peer is gone whatever the close
    /// command answers later.
    pub(crate) fn remote_closed(&mut self) {
        self.connected = false;
        self.begin_close();
    }

    /// The module acknowledged the close.
    pub(crate) fn close_acked(&mut self) {
        self.connected = false;
        self.state = SocketState::Inactive;
        self.buffer.clear_metadata();
    }

    /// Whether a data notification for this slot should be acted on.
    pub(crate) fn accepts_data(&self) -> bool {
        !matches!(self.state, SocketState::Closing | SocketState::Inactive)
    }

    /// Module rebooted.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}
