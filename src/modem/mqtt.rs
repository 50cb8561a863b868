//! MQTT sessions on the module's built-in client, and payload reassembly.
//!
//! ```text
//!  mqtt_init ─▶ mqtt_setup ─▶ [mqtt_set_tls] ─▶ mqtt_connect ─▶ publish / subscribe
//!                                               (opens the network link first)
//! ```
//!
//! Incoming messages reach the registered handler from the dispatcher. In
//! compact mode the notification only names a buffer channel; the channel
//! is read on the next [`Modem::poll`], and every channel is read
//! periodically in case a notification was missed.

use std::vec::Vec;

use log::{debug, info, warn};

use super::Modem;
use crate::app::ports::{Clock, SerialPort};
use crate::at::fields::{self, num};
use crate::at::urc::{MqttConn, MqttRecv};
use crate::config::MqttRecvMode;
use crate::error::{Error, IdKind, MqttError, RefusalReason, Result};
use crate::registry::{ContextId, MQTT_RECV_CHANNELS, MqttClientId, MqttState};
use crate::transport::{LINE_CAPACITY, Line};

const CONNECTION_QUERY_TIMEOUT_MS: u32 = 2_000;
const BUFFER_READ_TIMEOUT_MS: u32 = 400;

/// Message published by the broker if the client drops off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub host: &'a str,
    pub port: u16,
    pub clean_session: bool,
}

/// Delivery result reported by `+QMTPUB:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sent, and acknowledged when QoS > 0.
    Acked,
    /// Sent, but the module is retransmitting.
    Retransmission,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    fn session_id(&self, client: u8) -> Result<MqttClientId> {
        MqttClientId::try_from(client)
    }

    // ── Setup ────────────────────────────────────────────────

    /// Bind client `client` to PDP context `cid`.
    pub fn mqtt_init(&mut self, client: u8, cid: u8) -> Result<()> {
        let id = self.session_id(client)?;
        let context = ContextId::try_from(cid)?;
        self.registry.session_mut(id).init(context);
        Ok(())
    }

    /// Push the client configuration to the module. The receive mode is
    /// taken from the driver config and fixed from here on.
    pub fn mqtt_setup(&mut self, client: u8, will: Option<&LastWill<'_>>) -> Result<()> {
        let id = self.session_id(client)?;
        let context = self
            .registry
            .session(id)
            .context()
            .ok_or(MqttError::NotConfigured)?;
        let mode = self.config.mqtt_recv_mode;
        let (recv_mode, len_enable) = mode.wire_flags();
        let timeout = self.config.command_timeout_ms;

        self.check(&format!("AT+QMTCFG=\"pdpcid\",{},{}", id, context), "OK", timeout)?;
        self.check(
            &format!("AT+QMTCFG=\"recv/mode\",{},{},{}", id, recv_mode, len_enable),
            "OK",
            timeout,
        )?;
        let will_cmd = match will {
            Some(w) => format!(
                "AT+QMTCFG=\"will\",{},1,{},{},\"{}\",\"{}\"",
                id,
                w.qos.min(2),
                u8::from(w.retain),
                w.topic,
                w.payload
            ),
            None => format!("AT+QMTCFG=\"will\",{},0", id),
        };
        self.check(&will_cmd, "OK", timeout)?;
        self.check(
            &format!(
                "AT+QMTCFG=\"keepalive\",{},{}",
                id, self.config.mqtt_keepalive_secs
            ),
            "OK",
            timeout,
        )?;

        self.registry.session_mut(id).configure(mode);
        info!("mqtt client {} configured ({:?} receive)", id, mode);
        Ok(())
    }

    /// Use TLS context `profile` for the broker link, or plain TCP.
    pub fn mqtt_set_tls(&mut self, client: u8, profile: Option<u8>) -> Result<()> {
        let id = self.session_id(client)?;
        let profile = profile.map(crate::registry::tls_profile).transpose()?;
        let cmd = match profile {
            Some(p) => format!("AT+QMTCFG=\"ssl\",{},1,{}", id, p),
            None => format!("AT+QMTCFG=\"ssl\",{},0", id),
        };
        let timeout = self.config.command_timeout_ms;
        self.check(&cmd, "OK", timeout)?;
        self.registry.session_mut(id).set_tls(profile);
        Ok(())
    }

    // ── Network link ─────────────────────────────────────────

    /// Open the network link to the broker.
    pub fn mqtt_open(&mut self, client: u8, host: &str, port: u16) -> Result<()> {
        let id = self.session_id(client)?;
        if !self.registry.session_mut(id).set_broker(host, port) {
            return Err(MqttError::OpenFailed(u16::MAX).into());
        }
        let timeout = self.config.mqtt_open_timeout_ms;
        let reply = self.query_marker(
            &format!("AT+QMTOPEN={},\"{}\",{}", id, host, port),
            &format!("+QMTOPEN: {},", id),
            timeout,
        )?;
        match num::<i16>(&reply) {
            // 2: identifier already open.
            Some(0 | 2) => {
                self.registry.session_mut(id).set_opened(true);
                Ok(())
            }
            other => {
                warn!("mqtt client {} open failed: {:?}", id, other);
                self.registry.session_mut(id).set_opened(false);
                Err(MqttError::OpenFailed(other.map_or(u16::MAX, |c| c as u16)).into())
            }
        }
    }

    /// Whether the module reports an open network link for `client`.
    pub fn mqtt_is_opened(&mut self, client: u8) -> Result<bool> {
        let id = self.session_id(client)?;
        let timeout = self.config.command_timeout_ms;
        let reply = self.query("AT+QMTOPEN?", &format!("+QMTOPEN: {},", id), timeout)?;
        let opened = !reply.is_empty();
        self.registry.session_mut(id).set_opened(opened);
        Ok(opened)
    }

    /// Close the network link.
    pub fn mqtt_close(&mut self, client: u8) -> Result<()> {
        let id = self.session_id(client)?;
        let timeout = self.config.mqtt_open_timeout_ms;
        let result = self.query_marker(
            &format!("AT+QMTCLOSE={}", id),
            &format!("+QMTCLOSE: {},", id),
            timeout,
        );
        self.registry.session_mut(id).drop_link();
        result.map(|_| ())
    }

    // ── Session ──────────────────────────────────────────────

    /// Connect to the broker, opening the network link if needed.
    pub fn mqtt_connect(&mut self, client: u8, opts: &MqttConnectOptions<'_>) -> Result<()> {
        let id = self.session_id(client)?;
        let session = self.registry.session(id);
        if !session.is_configured() {
            return Err(MqttError::NotConfigured.into());
        }
        match session.state() {
            MqttState::Connected => return Ok(()),
            MqttState::Disconnecting => {
                warn!("mqtt client {} was disconnecting, tearing down", id);
                if let Err(e) = self.mqtt_close(client) {
                    debug!("mqtt close: {}", e);
                }
                return Err(MqttError::Disconnecting.into());
            }
            _ => {}
        }

        let timeout = self.config.command_timeout_ms;
        self.check(
            &format!(
                "AT+QMTCFG=\"session\",{},{}",
                id,
                u8::from(opts.clean_session)
            ),
            "OK",
            timeout,
        )?;
        if !self.registry.session(id).is_opened() {
            self.mqtt_open(client, opts.host, opts.port)?;
        }

        self.registry.session_mut(id).set_state(MqttState::Connecting);
        let cmd = match (opts.username, opts.password) {
            (Some(user), Some(pass)) => format!(
                "AT+QMTCONN={},\"{}\",\"{}\",\"{}\"",
                id, opts.client_id, user, pass
            ),
            (Some(user), None) => {
                format!("AT+QMTCONN={},\"{}\",\"{}\"", id, opts.client_id, user)
            }
            _ => format!("AT+QMTCONN={},\"{}\"", id, opts.client_id),
        };
        let timeout = self.config.mqtt_connect_timeout_ms;
        let result = self.query_marker(&cmd, &format!("+QMTCONN: {},", id), timeout);

        let session = self.registry.session(id);
        if session.is_connected() {
            info!("mqtt client {} connected", id);
            return Ok(());
        }
        let reason = session.last_refusal();
        self.registry.session_mut(id).set_state(MqttState::Disconnected);
        result?;
        match reason {
            Some(reason) => Err(MqttError::Refused(reason).into()),
            None => Err(MqttError::ConnectFailed.into()),
        }
    }

    /// Send DISCONNECT; the network link is closed by the module.
    pub fn mqtt_disconnect(&mut self, client: u8) -> Result<()> {
        let id = self.session_id(client)?;
        self.registry
            .session_mut(id)
            .set_state(MqttState::Disconnecting);
        let timeout = self.config.mqtt_open_timeout_ms;
        let result = self.query_marker(
            &format!("AT+QMTDISC={}", id),
            &format!("+QMTDISC: {},", id),
            timeout,
        );
        self.registry.session_mut(id).drop_link();
        result.map(|_| ())
    }

    /// Subscribe to `(topic, qos)` pairs in one SUBSCRIBE.
    pub fn mqtt_subscribe(&mut self, client: u8, topics: &[(&str, u8)]) -> Result<()> {
        let id = self.require_connected(client)?;
        if topics.is_empty() {
            return Err(MqttError::InvalidTopics.into());
        }
        let msg_id = self.take_msg_id();
        let mut cmd = format!("AT+QMTSUB={},{}", id, msg_id);
        for (topic, qos) in topics {
            cmd.push_str(&format!(",\"{}\",{}", topic, (*qos).min(2)));
        }
        self.topic_ack(id, &cmd, "+QMTSUB", msg_id)
    }

    pub fn mqtt_unsubscribe(&mut self, client: u8, topics: &[&str]) -> Result<()> {
        let id = self.require_connected(client)?;
        if topics.is_empty() {
            return Err(MqttError::InvalidTopics.into());
        }
        let msg_id = self.take_msg_id();
        let mut cmd = format!("AT+QMTUNS={},{}", id, msg_id);
        for topic in topics {
            cmd.push_str(&format!(",\"{}\"", topic));
        }
        self.topic_ack(id, &cmd, "+QMTUNS", msg_id)
    }

    fn topic_ack(&mut self, id: MqttClientId, cmd: &str, tag: &str, msg_id: u16) -> Result<()> {
        if cmd.len() >= LINE_CAPACITY {
            return Err(MqttError::InvalidTopics.into());
        }
        let timeout = self.config.mqtt_subscribe_timeout_ms;
        let prefix = format!("{}: {},{},", tag, id, msg_id);
        let reply = self.query_marker(cmd, &prefix, timeout)?;
        match fields::split(&reply).next().and_then(num::<u8>) {
            Some(0) => Ok(()),
            other => {
                warn!("mqtt client {} {} result {:?}", id, tag, other);
                Err(MqttError::SubscribeFailed.into())
            }
        }
    }

    /// Publish `payload` through the data prompt, so payloads may contain
    /// any byte.
    pub fn mqtt_publish(
        &mut self,
        client: u8,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<PublishOutcome> {
        let id = self.require_connected(client)?;
        let qos = qos.min(2);
        let msg_id = if qos == 0 { 0 } else { self.take_msg_id() };
        let cmd = format!(
            "AT+QMTPUBEX={},{},{},{},\"{}\",{}",
            id,
            msg_id,
            qos,
            u8::from(retain),
            topic,
            payload.len()
        );
        let prefix = format!("+QMTPUB: {},{},", id, msg_id);
        let timeout = self.config.mqtt_publish_timeout_ms;

        let reply = self.in_transaction(|m| {
            m.check_marker(&cmd, ">", timeout)?;
            m.reader.write_raw(payload)?;
            m.wait_for(&prefix, timeout)
        })?;
        match fields::split(&reply).next().and_then(num::<u8>) {
            Some(0) => Ok(PublishOutcome::Acked),
            Some(1) => Ok(PublishOutcome::Retransmission),
            _ => {
                warn!("mqtt client {} publish to {} failed", id, topic);
                Err(MqttError::PublishFailed.into())
            }
        }
    }

    fn require_connected(&self, client: u8) -> Result<MqttClientId> {
        let id = self.session_id(client)?;
        if self.registry.session(id).is_connected() {
            Ok(id)
        } else {
            Err(MqttError::NotConnected.into())
        }
    }

    // ── Status ───────────────────────────────────────────────

    /// Connectivity as last known. During a connection check this returns
    /// the value from before the check started.
    pub fn mqtt_connected(&self, client: u8) -> bool {
        MqttClientId::new(client).is_some_and(|id| self.registry.mqtt_connected(id))
    }

    pub fn mqtt_last_refusal(&self, client: u8) -> Option<RefusalReason> {
        MqttClientId::new(client).and_then(|id| self.registry.session(id).last_refusal())
    }

    /// Rebuild every session's state from `AT+QMTCONN?`.
    pub fn mqtt_check_connection(&mut self) -> Result<()> {
        if !MqttClientId::all().any(|id| self.registry.session(id).is_configured()) {
            return Ok(());
        }
        self.registry.begin_sweep();
        match self.exec("AT+QMTCONN?", CONNECTION_QUERY_TIMEOUT_MS) {
            Ok(_) => {
                self.registry.end_sweep();
                Ok(())
            }
            Err(e) => {
                warn!("mqtt connection check failed: {}", e);
                self.registry.abort_sweep();
                Err(e)
            }
        }
    }

    // ── Compact-mode buffers ─────────────────────────────────

    /// Read one receive buffer channel; the message arrives through the
    /// dispatcher.
    pub fn mqtt_read_buffer(&mut self, client: u8, channel: u8) -> Result<()> {
        let id = self.session_id(client)?;
        if channel as usize >= MQTT_RECV_CHANNELS {
            return Err(Error::InvalidId(IdKind::MqttClient, channel));
        }
        self.check(
            &format!("AT+QMTRECV={},{}", id, channel),
            "OK",
            BUFFER_READ_TIMEOUT_MS,
        )
    }

    /// Read every receive buffer channel of `client`.
    pub fn mqtt_read_all_buffers(&mut self, client: u8) -> Result<()> {
        self.session_id(client)?;
        for channel in 0..MQTT_RECV_CHANNELS as u8 {
            if let Err(e) = self.mqtt_read_buffer(client, channel) {
                debug!("mqtt client {} buffer {}: {}", client, channel, e);
            }
        }
        Ok(())
    }

    /// Fetch messages announced in compact mode, and poll every buffer
    /// when the periodic timer is due.
    pub(crate) fn mqtt_read_messages(&mut self) {
        let now = self.now_ms();
        let interval = self.config.mqtt_buffer_poll_ms;
        for id in MqttClientId::all() {
            let session = self.registry.session_mut(id);
            if !session.is_configured() || session.recv_mode() != MqttRecvMode::Compact {
                continue;
            }
            let waiting = session.take_waiting();
            let poll_all = session.is_connected() && session.poll_due(now, interval);

            if poll_all {
                if let Err(e) = self.mqtt_read_all_buffers(id.get()) {
                    debug!("mqtt client {} poll: {}", id, e);
                }
                continue;
            }
            for (channel, _) in waiting.iter().enumerate().filter(|(_, w)| **w) {
                if let Err(e) = self.mqtt_read_buffer(id.get(), channel as u8) {
                    warn!("mqtt client {} buffer {} read failed: {}", id, channel, e);
                }
            }
        }
    }

    // ── Dispatcher hooks ─────────────────────────────────────

    pub(crate) fn on_mqtt_conn(&mut self, conn: MqttConn) {
        match conn {
            MqttConn::Outcome {
                client,
                result,
                code,
            } => {
                if let Some(id) = MqttClientId::new(client) {
                    self.registry
                        .session_mut(id)
                        .connect_outcome(id, result, code);
                }
            }
            MqttConn::Short { client, value } => {
                let Some(id) = MqttClientId::new(client) else {
                    return;
                };
                if self.registry.sweeping() {
                    self.registry
                        .session_mut(id)
                        .set_state(MqttState::from_code(value));
                } else {
                    self.registry.session_mut(id).connect_short(id, value);
                }
            }
        }
    }

    pub(crate) fn on_mqtt_recv(&mut self, line: &Line, recv: MqttRecv<'_>) {
        match recv {
            MqttRecv::Waiting { client, channel } => {
                let marked = MqttClientId::new(client)
                    .is_some_and(|id| self.registry.session_mut(id).mark_waiting(channel));
                if !marked {
                    warn!("mqtt message waiting on unknown {}/{}", client, channel);
                }
            }
            MqttRecv::Message {
                client,
                msg_id,
                topic,
                declared_len,
                payload_at,
            } => {
                let Some(id) = MqttClientId::new(client) else {
                    warn!("mqtt message for unknown client {}", client);
                    return;
                };
                let payload = self.reassemble(line, declared_len, payload_at);
                debug!(
                    "mqtt client {} message {} on {} ({} bytes)",
                    id,
                    msg_id,
                    topic,
                    payload.len()
                );
                match self.mqtt_handler.as_mut() {
                    Some(handler) => handler(id, topic, &payload),
                    None => debug!("no mqtt handler, message dropped"),
                }
            }
        }
    }

    /// Recover the payload of a `+QMTRECV:` line.
    ///
    /// With a declared length, a payload containing `\n` was split by the
    /// framer: the rest is read raw for up to `mqtt_payload_grace_ms`,
    /// then exactly the declared length is kept. Without a length the
    /// payload runs to the closing quote at the end of the line.
    pub(crate) fn reassemble(
        &mut self,
        line: &Line,
        declared_len: Option<usize>,
        payload_at: usize,
    ) -> Vec<u8> {
        let content = line.raw().get(payload_at..).unwrap_or_default();
        let mut payload = content.to_vec();

        let Some(len) = declared_len else {
            if payload.last() == Some(&b'\r') {
                payload.pop();
            }
            if payload.last() == Some(&b'"') {
                payload.pop();
            }
            return payload;
        };

        if payload.len() > len {
            if payload[len] != b'"' {
                warn!("mqtt payload longer than declared {} bytes", len);
            }
            payload.truncate(len);
            return payload;
        }

        // The framer consumed the '\n'; the rest plus the closing quote
        // is still on the wire.
        payload.push(b'\n');
        let missing = (len + 1).saturating_sub(payload.len());
        if missing > 0 {
            let start = payload.len();
            payload.resize(start + missing, 0);
            let grace = self.config.mqtt_payload_grace_ms;
            let poll = self.config.poll_interval_ms;
            let got = match self.reader.read_raw(&mut payload[start..], &mut self.clock, grace, poll) {
                Ok(n) => n,
                Err(e) => {
                    warn!("mqtt payload read failed: {}", e);
                    0
                }
            };
            payload.truncate(start + got);
        }
        if payload.len() < len {
            warn!(
                "mqtt payload truncated: {} of {} bytes",
                payload.len(),
                len
            );
        }
        payload.truncate(len);
        payload
    }
}
