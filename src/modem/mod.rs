//! The driver core.
//!
//! [`Modem`] owns the serial link, the clock and the connection
//! [`Registry`]. Everything that talks to the module is a method on it,
//! split by concern:
//!
//! | File          | Concern                                              |
//! |---------------|------------------------------------------------------|
//! | `engine.rs`   | command/response transactions                        |
//! | `dispatch.rs` | unsolicited line handling + deferred side effects    |
//! | `network.rs`  | boot, radio, PDP contexts, status, maintenance       |
//! | `socket.rs`   | TCP/TLS sockets and ingress drains                   |
//! | `mqtt.rs`     | MQTT sessions and payload reassembly                 |
//! | `http.rs`     | GET-to-file downloads                                |
//! | `sms.rs`      | SMS listing                                          |
//!
//! The modem is single-owner: one task calls [`Modem::poll`] (or
//! [`Modem::service`]) and every request method. Use
//! [`crate::actor`] to reach it from other threads.

mod dispatch;
mod engine;
mod http;
mod mqtt;
mod network;
mod socket;
mod sms;

pub use dispatch::DispatchMode;
pub use engine::Expect;
pub use mqtt::{LastWill, MqttConnectOptions, PublishOutcome};
pub use network::{ErrorFormat, RadioMode, Technology};
pub use sms::{MAX_SMS, SmsMessage};
pub use socket::MAX_SEND_LEN;

use heapless::{Deque, String};
use log::{info, warn};

use crate::app::ports::{Clock, DownloadObserver, SerialPort};
use crate::config::ModemConfig;
use crate::error::{Error, Result};
use crate::registry::{MqttClientId, Registry, SocketId};
use crate::transport::LineReader;

use dispatch::Deferred;

/// Called with the socket id after an acknowledged close.
pub type CloseHandler = Box<dyn FnMut(SocketId) + Send>;
/// Called once per received SMS.
pub type SmsHandler = Box<dyn FnMut(&SmsMessage) + Send>;
/// Called with client, topic and payload for every MQTT message.
pub type MqttMessageHandler = Box<dyn FnMut(MqttClientId, &str, &[u8]) + Send>;

const DEFERRED_DEPTH: usize = 16;

struct HttpJob {
    filename: String<64>,
    content_length: usize,
    observer: Box<dyn DownloadObserver + Send>,
}

#[derive(Debug, Default)]
struct Identity {
    imei: String<20>,
    ccid: String<24>,
    imsi: String<20>,
}

#[derive(Debug, Default)]
struct Signal {
    rssi: i16,
    technology: Technology,
    read_at: Option<u64>,
}

/// Quectel BG95/BG96 driver over a serial AT link.
pub struct Modem<S, C> {
    reader: LineReader<S>,
    clock: C,
    config: ModemConfig,
    registry: Registry,

    deferred: Deque<Deferred, DEFERRED_DEPTH>,
    depth: u8,
    running_deferred: bool,

    http: Option<HttpJob>,
    close_handler: Option<CloseHandler>,
    sms_handler: Option<SmsHandler>,
    mqtt_handler: Option<MqttMessageHandler>,

    identity: Identity,
    signal: Signal,
    ready_at: Option<u64>,
    next_maintenance_at: u64,
    next_ntp_at: u64,
    next_msg_id: u16,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    pub fn new(serial: S, clock: C, config: ModemConfig) -> Result<Self> {
        config.validate()?;
        let now = clock.now_ms();
        Ok(Self {
            reader: LineReader::new(serial),
            clock,
            next_maintenance_at: now + u64::from(config.maintenance_interval_ms),
            next_ntp_at: now,
            config,
            registry: Registry::new(),
            deferred: Deque::new(),
            depth: 0,
            running_deferred: false,
            http: None,
            close_handler: None,
            sms_handler: None,
            mqtt_handler: None,
            identity: Identity::default(),
            signal: Signal::default(),
            ready_at: None,
            next_msg_id: 1,
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn port(&self) -> &S {
        self.reader.port()
    }

    pub fn port_mut(&mut self) -> &mut S {
        self.reader.port_mut()
    }

    pub fn into_parts(self) -> (S, C) {
        (self.reader.into_inner(), self.clock)
    }

    // ── Handlers ─────────────────────────────────────────────

    /// Replace the socket close handler.
    pub fn set_socket_close_handler(&mut self, handler: CloseHandler) {
        self.close_handler = Some(handler);
    }

    /// Register the SMS handler. Only one may be registered at a time.
    pub fn set_sms_handler(&mut self, handler: SmsHandler) -> Result<()> {
        if self.sms_handler.is_some() {
            return Err(Error::HandlerAlreadySet);
        }
        self.sms_handler = Some(handler);
        Ok(())
    }

    pub fn clear_sms_handler(&mut self) {
        self.sms_handler = None;
    }

    pub fn has_sms_handler(&self) -> bool {
        self.sms_handler.is_some()
    }

    /// Replace the MQTT message handler.
    pub fn set_mqtt_message_handler(&mut self, handler: MqttMessageHandler) {
        self.mqtt_handler = Some(handler);
    }

    // ── Service loop ─────────────────────────────────────────

    /// Classify every complete line currently buffered, run the side
    /// effects they trigger, then drain sockets with pending data.
    pub fn service(&mut self) {
        loop {
            match self.reader.poll_line() {
                Ok(Some(line)) => {
                    self.dispatch(&line, DispatchMode::Immediate);
                    self.run_deferred();
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("service: {}", e);
                    break;
                }
            }
        }
        self.check_data_pending();
    }

    /// One scheduler tick: [`Self::service`], compact-mode MQTT buffer
    /// reads, and the periodic maintenance when it is due.
    pub fn poll(&mut self) {
        self.service();
        self.mqtt_read_messages();

        let now = self.clock.now_ms();
        if now >= self.next_maintenance_at {
            self.next_maintenance_at = now + u64::from(self.config.maintenance_interval_ms);
            self.maintenance();
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Message id for SUBSCRIBE/UNSUBSCRIBE/PUBLISH, 1..=65535.
    pub(crate) fn take_msg_id(&mut self) -> u16 {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Module rebooted or radio went off.
    pub(crate) fn forget_module_state(&mut self) {
        info!("resetting connection state");
        self.registry.reset_all();
        self.deferred.clear();
        self.signal = Signal::default();
        self.ready_at = None;
        if let Some(mut job) = self.http.take() {
            job.observer.failed();
        }
    }
}
