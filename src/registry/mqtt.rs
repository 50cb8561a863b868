//! MQTT session table entry.

use heapless::String;
use log::{info, warn};

use super::ids::{ContextId, MqttClientId};
use crate::config::MqttRecvMode;
use crate::error::RefusalReason;

/// Buffer channels the module keeps per client in compact receive mode.
pub const MQTT_RECV_CHANNELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MqttState {
    #[default]
    Disconnected,
    Initializing,
    Connecting,
    Connected,
    Disconnecting,
}

impl MqttState {
    /// `<state>` of `+QMTCONN: <c>,<state>`.
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Initializing,
            2 => Self::Connecting,
            3 => Self::Connected,
            4 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MqttSession {
    state: MqttState,
    shadow: bool,
    before_sweep: MqttState,
    last_refusal: Option<RefusalReason>,
    configured: bool,
    opened: bool,
    context: Option<ContextId>,
    recv_mode: MqttRecvMode,
    tls_profile: Option<u8>,
    host: String<128>,
    port: u16,
    waiting: [bool; MQTT_RECV_CHANNELS],
    next_poll_at: u64,
}

impl Default for MqttSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttSession {
    pub const fn new() -> Self {
        Self {
            state: MqttState::Disconnected,
            shadow: false,
            before_sweep: MqttState::Disconnected,
            last_refusal: None,
            configured: false,
            opened: false,
            context: None,
            recv_mode: MqttRecvMode::Compact,
            tls_profile: None,
            host: String::new(),
            port: 0,
            waiting: [false; MQTT_RECV_CHANNELS],
            next_poll_at: 0,
        }
    }

    pub fn state(&self) -> MqttState {
        self.state
    }

    /// Live connectivity, ignoring any sweep in progress.
    pub fn is_connected(&self) -> bool {
        self.state == MqttState::Connected
    }

    /// Value a caller should see: the pre-sweep snapshot while sweeping.
    pub fn observed_connected(&self, sweeping: bool) -> bool {
        if sweeping { self.shadow } else { self.is_connected() }
    }

    pub fn last_refusal(&self) -> Option<RefusalReason> {
        self.last_refusal
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn recv_mode(&self) -> MqttRecvMode {
        self.recv_mode
    }

    pub fn tls_profile(&self) -> Option<u8> {
        self.tls_profile
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn init(&mut self, context: ContextId) {
        self.context = Some(context);
        self.state = MqttState::Initializing;
    }

    pub(crate) fn configure(&mut self, mode: MqttRecvMode) {
        self.recv_mode = mode;
        self.configured = true;
    }

    pub(crate) fn set_tls(&mut self, profile: Option<u8>) {
        self.tls_profile = profile;
    }

    /// Remember the broker. Returns `false` if the host does not fit.
    pub(crate) fn set_broker(&mut self, host: &str, port: u16) -> bool {
        self.host.clear();
        if self.host.push_str(host).is_err() {
            return false;
        }
        self.port = port;
        true
    }

    pub(crate) fn set_opened(&mut self, opened: bool) {
        self.opened = opened;
        if !opened {
            self.state = MqttState::Disconnected;
        }
    }

    pub(crate) fn set_state(&mut self, state: MqttState) {
        if state != self.state {
            info!("mqtt state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
    }

    /// Three-field `+QMTCONN:` outcome.
    pub(crate) fn connect_outcome(&mut self, client: MqttClientId, result: u8, code: u8) {
        if result == 0 && code == 0 {
            self.last_refusal = None;
            self.set_state(MqttState::Connected);
            return;
        }
        if code == 0 {
            // The broker never answered; the CONNECT packet was not delivered.
            warn!("mqtt client {} CONNECT not acknowledged (result {})", client, result);
            self.last_refusal = None;
            self.set_state(MqttState::Disconnected);
            return;
        }
        let reason = RefusalReason::from_code(code);
        warn!("mqtt client {} refused: {} (result {})", client, reason, result);
        self.last_refusal = Some(reason);
        self.set_state(MqttState::Disconnected);
    }

    /// Two-field `+QMTCONN:` outside a sweep: 0 accepts, anything else is
    /// a refusal code.
    pub(crate) fn connect_short(&mut self, client: MqttClientId, value: u8) {
        if value == 0 {
            self.last_refusal = None;
            self.set_state(MqttState::Connected);
        } else {
            let reason = RefusalReason::from_code(value);
            warn!("mqtt client {} refused: {}", client, reason);
            self.last_refusal = Some(reason);
            self.set_state(MqttState::Disconnected);
        }
    }

    /// `+QMTSTAT:`, `+QMTCLOSE:` or `+QMTDISC:`.
    pub(crate) fn drop_link(&mut self) {
        self.opened = false;
        self.state = MqttState::Disconnected;
        self.waiting = [false; MQTT_RECV_CHANNELS];
    }

    /// Sweep start: snapshot, then reset live state so the query can
    /// rebuild it.
    pub(crate) fn begin_sweep(&mut self) {
        self.shadow = self.is_connected();
        self.before_sweep = self.state;
        self.state = MqttState::Disconnected;
    }

    /// The sweep query got no answer: put back the state it reset.
    pub(crate) fn abort_sweep(&mut self) {
        self.state = self.before_sweep;
    }

    pub(crate) fn mark_waiting(&mut self, channel: u8) -> bool {
        match self.waiting.get_mut(channel as usize) {
            Some(slot) => {
                *slot = true;
                true
            }
            None => false,
        }
    }

    /// Take and clear the set of channels with messages waiting.
    pub(crate) fn take_waiting(&mut self) -> [bool; MQTT_RECV_CHANNELS] {
        core::mem::take(&mut self.waiting)
    }

    /// Whether the periodic full-buffer poll is due. Re-arms the timer.
    pub(crate) fn poll_due(&mut self, now_ms: u64, interval_ms: u32) -> bool {
        if now_ms < self.next_poll_at {
            return false;
        }
        self.next_poll_at = now_ms + u64::from(interval_ms);
        true
    }

    /// Module rebooted: configuration on the module side is gone.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}
