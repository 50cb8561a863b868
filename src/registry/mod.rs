//! Connection registry: fixed tables of PDP contexts, sockets and MQTT
//! sessions, owned by the [`Modem`](crate::Modem).
//!
//! Ids are protocol-bounded, so every table is a plain array sized at
//! compile time and indexed through the newtypes in [`ids`].

pub mod buffer;
pub mod context;
pub mod ids;
pub mod mqtt;
pub mod socket;

pub use buffer::{IngressBuffer, SOCKET_BUFFER_CAPACITY};
pub use context::{MAX_RETRY_DELAY_MS, PdpContext, next_retry_delay};
pub use ids::{
    ContextId, MAX_CONTEXTS, MAX_MQTT_CLIENTS, MAX_SOCKETS, MAX_TLS_PROFILES, MqttClientId,
    SocketId, tls_profile,
};
pub use mqtt::{MQTT_RECV_CHANNELS, MqttSession, MqttState};
pub use socket::{Endpoint, Socket, SocketState};

use crate::at::RegDomain;
use crate::at::urc::RegistrationStatus;

#[derive(Debug)]
pub struct Registry {
    contexts: [PdpContext; MAX_CONTEXTS],
    sockets: [Socket; MAX_SOCKETS],
    sessions: [MqttSession; MAX_MQTT_CLIENTS],
    registration: [RegistrationStatus; RegDomain::COUNT],
    sweeping: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            contexts: core::array::from_fn(|_| PdpContext::new()),
            sockets: core::array::from_fn(|_| Socket::new()),
            sessions: core::array::from_fn(|_| MqttSession::new()),
            registration: [RegistrationStatus::Unknown; RegDomain::COUNT],
            sweeping: false,
        }
    }

    pub fn context(&self, id: ContextId) -> &PdpContext {
        &self.contexts[id.index()]
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> &mut PdpContext {
        &mut self.contexts[id.index()]
    }

    pub fn socket(&self, id: SocketId) -> &Socket {
        &self.sockets[id.index()]
    }

    pub(crate) fn socket_mut(&mut self, id: SocketId) -> &mut Socket {
        &mut self.sockets[id.index()]
    }

    pub fn session(&self, id: MqttClientId) -> &MqttSession {
        &self.sessions[id.index()]
    }

    pub(crate) fn session_mut(&mut self, id: MqttClientId) -> &mut MqttSession {
        &mut self.sessions[id.index()]
    }

    pub fn registration(&self, domain: RegDomain) -> RegistrationStatus {
        self.registration[domain.index()]
    }

    pub(crate) fn set_registration(&mut self, domain: RegDomain, status: RegistrationStatus) {
        self.registration[domain.index()] = status;
    }

    /// Whether an MQTT connectivity sweep is in progress.
    pub fn sweeping(&self) -> bool {
        self.sweeping
    }

    /// Snapshot every session and open the sweep window.
    pub(crate) fn begin_sweep(&mut self) {
        for s in &mut self.sessions {
            s.begin_sweep();
        }
        self.sweeping = true;
    }

    pub(crate) fn end_sweep(&mut self) {
        self.sweeping = false;
    }

    /// Close the sweep window without an answer to rebuild from.
    pub(crate) fn abort_sweep(&mut self) {
        for s in &mut self.sessions {
            s.abort_sweep();
        }
        self.sweeping = false;
    }

    /// MQTT connectivity as callers should observe it.
    pub fn mqtt_connected(&self, id: MqttClientId) -> bool {
        self.session(id).observed_connected(self.sweeping)
    }

    /// Module rebooted or radio switched off: everything learned from the
    /// module is stale. APNs survive; the application set them up.
    pub(crate) fn reset_all(&mut self) {
        for c in &mut self.contexts {
            c.reset_link();
        }
        for s in &mut self.sockets {
            s.reset();
        }
        for m in &mut self.sessions {
            m.reset();
        }
        self.registration = [RegistrationStatus::Unknown; RegDomain::COUNT];
        self.sweeping = false;
    }

    /// Sockets that received data the driver has not fetched yet.
    pub fn pending_sockets(&self) -> impl Iterator<Item = SocketId> + '_ {
        SocketId::all().filter(|id| self.socket(*id).buffer().pending())
    }
}
