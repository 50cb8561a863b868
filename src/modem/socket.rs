//! TCP/TLS sockets and ingress drains.
//!
//! Sockets run in buffer access mode: the module keeps received data
//! until it is fetched with `AT+QIRD` / `AT+QSSLRECV`. A `recv`
//! notification only marks the socket pending; the drain happens on the
//! next service tick (or right away when the notification arrived there).

use log::{debug, info, warn};

use super::Modem;
use crate::app::ports::{Clock, SerialPort};
use crate::at::fields::num;
use crate::error::{AtError, ContextError, Error, Result, SocketError};
use crate::registry::socket::SocketState;
use crate::registry::{ContextId, Endpoint, SocketId, tls_profile};

/// Largest payload `AT+QISEND` accepts in one go.
pub const MAX_SEND_LEN: usize = 1460;

const DRAIN_CHUNK: usize = 256;

impl<S: SerialPort, C: Clock> Modem<S, C> {
    /// Open a plain TCP connection on socket `id` over context `cid`
    /// (context 1 when `None`).
    pub fn tcp_connect(&mut self, id: u8, host: &str, port: u16, cid: Option<u8>) -> Result<()> {
        self.socket_open(id, host, port, cid, None)
    }

    /// Open a TLS connection using TLS context `profile`.
    pub fn tcp_connect_tls(
        &mut self,
        id: u8,
        host: &str,
        port: u16,
        cid: Option<u8>,
        profile: u8,
    ) -> Result<()> {
        self.socket_open(id, host, port, cid, Some(profile))
    }

    fn socket_open(
        &mut self,
        id: u8,
        host: &str,
        port: u16,
        cid: Option<u8>,
        profile: Option<u8>,
    ) -> Result<()> {
        let id = SocketId::try_from(id)?;
        let context = ContextId::try_from(cid.unwrap_or(1))?;
        let tls = profile.map(tls_profile).transpose()?;
        if !self.registry.context(context).is_connected() {
            return Err(ContextError::NotConnected.into());
        }
        let mut endpoint = Endpoint {
            host: heapless::String::new(),
            port,
            context,
            tls_profile: tls,
        };
        endpoint
            .host
            .push_str(host)
            .map_err(|_| SocketError::HostTooLong)?;

        if self.registry.socket(id).is_connected() {
            debug!("socket {} still connected, closing first", id);
            if let Err(e) = self.close_socket(id) {
                warn!("socket {} close before reopen: {}", id, e);
            }
        }

        self.registry.socket_mut(id).begin_open(endpoint);
        let (cmd, prefix) = match tls {
            Some(p) => (
                format!("AT+QSSLOPEN={},{},{},\"{}\",{},0", context, p, id, host, port),
                format!("+QSSLOPEN: {},", id),
            ),
            None => (
                format!("AT+QIOPEN={},{},\"TCP\",\"{}\",{},0,0", context, id, host, port),
                format!("+QIOPEN: {},", id),
            ),
        };

        let timeout = self.config.socket_open_timeout_ms;
        let outcome = self.query_marker(&cmd, &prefix, timeout);
        if self.registry.socket(id).is_connected() {
            return Ok(());
        }

        let err = match outcome {
            Ok(code) => Error::from(SocketError::OpenFailed(num(&code).unwrap_or(u16::MAX))),
            Err(e) => e,
        };
        self.open_failed(id);
        Err(err)
    }

    /// Roll a failed open back and log the module's diagnostic.
    fn open_failed(&mut self, id: SocketId) {
        if let Err(e) = self.close_socket(id) {
            debug!("socket {} close after failed open: {}", id, e);
        }
        let timeout = self.config.query_timeout_ms;
        match self.query("AT+QIGETERROR", "+QIGETERROR: ", timeout) {
            Ok(diag) if !diag.is_empty() => warn!("socket {} open error: {}", id, diag),
            Ok(_) => {}
            Err(e) => debug!("QIGETERROR failed: {}", e),
        }
    }

    /// Close socket `id`. Always clears active/pending; connected is only
    /// cleared (and the close handler only called) when the module
    /// acknowledges.
    pub fn tcp_close(&mut self, id: u8) -> Result<()> {
        let id = SocketId::try_from(id)?;
        self.close_socket(id)
    }

    pub(crate) fn close_socket(&mut self, id: SocketId) -> Result<()> {
        let socket = self.registry.socket_mut(id);
        socket.begin_close();
        let cmd = if socket.is_tls() {
            format!("AT+QSSLCLOSE={}", id)
        } else {
            format!("AT+QICLOSE={}", id)
        };

        let timeout = self.config.socket_close_timeout_ms;
        self.check(&cmd, "OK", timeout)?;
        self.registry.socket_mut(id).close_acked();
        info!("socket {} closed", id);
        if let Some(handler) = self.close_handler.as_mut() {
            handler(id);
        }
        Ok(())
    }

    /// Send `data` on a connected socket.
    pub fn tcp_send(&mut self, id: u8, data: &[u8]) -> Result<()> {
        let id = SocketId::try_from(id)?;
        let socket = self.registry.socket(id);
        if !socket.is_connected() {
            return Err(SocketError::NotConnected.into());
        }
        if data.len() > MAX_SEND_LEN {
            return Err(SocketError::PayloadTooLarge.into());
        }
        let cmd = if socket.is_tls() {
            format!("AT+QSSLSEND={},{}", id, data.len())
        } else {
            format!("AT+QISEND={},{}", id, data.len())
        };

        let timeout = self.config.socket_send_timeout_ms;
        self.in_transaction(|m| {
            m.check_marker(&cmd, ">", timeout)?;
            m.reader.write_raw(data)?;
            m.wait_line("SEND OK", timeout)
        })
    }

    /// Copy buffered bytes into `out`. Never touches the channel.
    pub fn tcp_recv(&mut self, id: u8, out: &mut [u8]) -> Result<usize> {
        let id = SocketId::try_from(id)?;
        Ok(self.registry.socket_mut(id).buffer.consume(out))
    }

    /// Bytes buffered for socket `id`; 0 for an invalid id.
    pub fn tcp_available(&self, id: u8) -> usize {
        SocketId::new(id).map_or(0, |id| self.registry.socket(id).buffer().len())
    }

    /// False for an invalid id.
    pub fn tcp_connected(&self, id: u8) -> bool {
        SocketId::new(id).is_some_and(|id| self.registry.socket(id).is_connected())
    }

    pub fn socket_state(&self, id: u8) -> Option<SocketState> {
        SocketId::new(id).map(|id| self.registry.socket(id).state())
    }

    /// Raw `AT+QISTATE=1,<id>` / `AT+QSSLSTATE=1,<id>` answer.
    pub fn query_socket_state(&mut self, id: u8) -> Result<std::string::String> {
        let id = SocketId::try_from(id)?;
        let timeout = self.config.command_timeout_ms;
        if self.registry.socket(id).is_tls() {
            self.query(&format!("AT+QSSLSTATE=1,{}", id), "+QSSLSTATE: ", timeout)
        } else {
            self.query(&format!("AT+QISTATE=1,{}", id), "+QISTATE: ", timeout)
        }
    }

    /// Drain every socket flagged pending.
    pub fn check_data_pending(&mut self) {
        let pending: heapless::Vec<SocketId, { crate::registry::MAX_SOCKETS }> =
            self.registry.pending_sockets().collect();
        for id in pending {
            if let Err(e) = self.drain(id) {
                warn!("socket {} drain failed: {}", id, e);
            }
        }
    }

    /// Fetch up to the buffer's free space from the module. Pending is
    /// recomputed from the buffered length whatever happens.
    pub(crate) fn drain(&mut self, id: SocketId) -> Result<usize> {
        let socket = self.registry.socket(id);
        let free = socket.buffer().free();
        if free == 0 {
            debug!("socket {} buffer full, drain skipped", id);
            return Ok(0);
        }
        let (cmd, prefix) = if socket.is_tls() {
            (format!("AT+QSSLRECV={},{}", id, free), "+QSSLRECV: ")
        } else {
            (format!("AT+QIRD={},{}", id, free), "+QIRD: ")
        };

        let result = self.in_transaction(|m| m.drain_into(id, &cmd, prefix));
        self.registry.socket_mut(id).buffer.settle();
        result
    }

    fn drain_into(&mut self, id: SocketId, cmd: &str, prefix: &str) -> Result<usize> {
        let timeout = self.config.drain_timeout_ms;
        let poll = self.config.poll_interval_ms;
        let announced = self.query_marker(cmd, prefix, timeout)?;
        let mut remaining: usize = num(&announced).ok_or(AtError::Unexpected)?;

        let mut kept = 0;
        let mut chunk = [0u8; DRAIN_CHUNK];
        while remaining > 0 {
            let want = remaining.min(DRAIN_CHUNK);
            let got = self
                .reader
                .read_raw(&mut chunk[..want], &mut self.clock, timeout, poll)?;
            kept += self.registry.socket_mut(id).buffer.append(&chunk[..got]);
            remaining -= got;
            if got < want {
                warn!("socket {} drain short by {} bytes", id, remaining);
                break;
            }
        }

        self.wait_ok(timeout)?;
        if kept > 0 {
            debug!("socket {} drained {} bytes", id, kept);
        }
        Ok(kept)
    }
}
