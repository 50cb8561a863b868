//! Event dispatcher.
//!
//! Every line the driver reads goes through [`Modem::dispatch`] exactly
//! once, in arrival order. Classification is [`crate::at::urc::parse`];
//! this file applies the resulting event to the registry.
//!
//! State changes are applied on the spot. Side effects that need the
//! channel (closing a socket, listing SMS, starting the HTTP readback,
//! turning echo off) are queued and run once no transaction is in flight,
//! so a nested command can never swallow the outer command's terminal
//! line. Socket data notifications are the one effect that depends on the
//! mode: deferred mode only raises the pending flag, immediate mode also
//! queues a drain.

use log::{debug, error, info, warn};

use super::Modem;
use crate::app::ports::{Clock, SerialPort};
use crate::at::urc::{self, Urc};
use crate::registry::{ContextId, SocketId};
use crate::transport::Line;

/// Where a line is being dispatched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Top-level service tick: nothing else owns the channel.
    Immediate,
    /// Inside a transaction wait.
    Deferred,
}

/// Channel work queued by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deferred {
    CloseSocket(SocketId),
    Drain(SocketId),
    ListSms,
    HttpReadback,
    DisableEcho,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    /// Apply one line. Returns whether it was an unsolicited event, as
    /// opposed to a line for the transaction in flight.
    pub(crate) fn dispatch(&mut self, line: &Line, mode: DispatchMode) -> bool {
        let Some(event) = urc::parse(line.as_str()) else {
            return false;
        };

        match event {
            Urc::Registration { domain, status } => {
                if self.registry.registration(domain) != status {
                    info!("{} registration: {}", domain.label(), status);
                }
                self.registry.set_registration(domain, status);
            }
            Urc::ContextReport { cid, active, ip } => match ContextId::new(cid) {
                Some(id) => self.registry.context_mut(id).apply_report(id, active, ip),
                None => debug!("report for untracked context {}", cid),
            },
            Urc::ContextDeactivated { cid } => {
                if let Some(id) = ContextId::new(cid) {
                    warn!("context {} deactivated by network", id);
                    self.registry.context_mut(id).mark_down(id);
                }
            }
            Urc::SocketOpened { socket, result, .. } => {
                if let Some(id) = SocketId::new(socket) {
                    let now = self.now_ms();
                    if self.registry.socket_mut(id).open_confirmed(result, now) {
                        info!("socket {} connected", id);
                    } else {
                        error!("socket {} open failed with code {}", id, result);
                    }
                }
            }
            Urc::SocketData { socket, .. } => {
                if let Some(id) = SocketId::new(socket) {
                    if !self.registry.socket(id).accepts_data() {
                        debug!("socket {} not open, data notification ignored", id);
                        return true;
                    }
                    self.registry.socket_mut(id).buffer.mark_pending();
                    if mode == DispatchMode::Immediate {
                        self.defer(Deferred::Drain(id));
                    }
                }
            }
            Urc::SocketClosed { socket, .. } => {
                if let Some(id) = SocketId::new(socket) {
                    info!("socket {} closed by peer", id);
                    self.registry.socket_mut(id).remote_closed();
                    self.defer(Deferred::CloseSocket(id));
                }
            }
            Urc::SmsReceived { index } => {
                debug!("sms received at index {:?}", index);
                self.defer(Deferred::ListSms);
            }
            Urc::MqttStatus { client, code } => {
                if let Some(id) = crate::registry::MqttClientId::new(client) {
                    warn!("mqtt client {} link closed (status {})", id, code);
                    self.registry.session_mut(id).drop_link();
                }
            }
            Urc::MqttRecv(recv) => self.on_mqtt_recv(line, recv),
            Urc::MqttConn(conn) => self.on_mqtt_conn(conn),
            Urc::HttpGet(get) => self.on_http_get(get),
            Urc::HttpReadFile { err } => self.on_http_readfile(err),
            Urc::CmeError { code } => {
                if self.http.is_some() {
                    self.on_http_error(code);
                }
            }
            Urc::Echo => self.defer(Deferred::DisableEcho),
        }
        true
    }

    pub(crate) fn defer(&mut self, action: Deferred) {
        if self.deferred.iter().any(|queued| *queued == action) {
            return;
        }
        if self.deferred.push_back(action).is_err() {
            warn!("deferred queue full, dropping {:?}", action);
        }
    }

    /// Execute queued channel work. Work queued while running is picked up
    /// by the same loop.
    pub(crate) fn run_deferred(&mut self) {
        if self.running_deferred {
            return;
        }
        self.running_deferred = true;
        while let Some(action) = self.deferred.pop_front() {
            self.perform(action);
        }
        self.running_deferred = false;
    }

    fn perform(&mut self, action: Deferred) {
        debug!("deferred: {:?}", action);
        let result = match action {
            Deferred::CloseSocket(id) => self.close_socket(id),
            Deferred::Drain(id) => self.drain(id).map(|_| ()),
            Deferred::ListSms => self.deliver_sms(),
            Deferred::HttpReadback => {
                self.http_readback();
                Ok(())
            }
            Deferred::DisableEcho => {
                warn!("local echo is on, disabling");
                let timeout = self.config.command_timeout_ms;
                self.check("ATE0", "OK", timeout)
            }
        };
        if let Err(e) = result {
            warn!("{:?} failed: {}", action, e);
        }
    }
}
