//! Per-socket ingress queue.
//!
//! ```text
//!  drain ──append──▶ [ b0 b1 b2 … bn | free … ] ──consume──▶ tcp_recv
//!                     ◀──── shift left on partial consume
//! ```
//!
//! Invariant after every [`IngressBuffer::append`] / [`IngressBuffer::settle`]:
//! `pending == !is_empty()`.

use heapless::Vec;
use log::warn;

/// Bytes buffered per socket.
pub const SOCKET_BUFFER_CAPACITY: usize = 1500;

#[derive(Debug, Default)]
pub struct IngressBuffer {
    data: Vec<u8, SOCKET_BUFFER_CAPACITY>,
    pending: bool,
    connected_since: Option<u64>,
}

impl IngressBuffer {
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            pending: false,
            connected_since: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining capacity; exactly what a drain asks the module for.
    pub fn free(&self) -> usize {
        SOCKET_BUFFER_CAPACITY - self.data.len()
    }

    /// Whether the socket should be drained on the next service tick.
    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn connected_since(&self) -> Option<u64> {
        self.connected_since
    }

    pub(crate) fn set_connected_since(&mut self, now_ms: u64) {
        self.connected_since = Some(now_ms);
    }

    /// A data notification arrived while the channel was busy.
    pub(crate) fn mark_pending(&mut self) {
        self.pending = true;
    }

    /// Append drained bytes; anything beyond capacity is discarded.
    /// Returns how many bytes were kept.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let keep = bytes.len().min(self.free());
        // Cannot fail: keep <= free capacity.
        let _ = self.data.extend_from_slice(&bytes[..keep]);
        if keep < bytes.len() {
            warn!(
                "ingress buffer full, discarded {} bytes",
                bytes.len() - keep
            );
        }
        self.settle();
        keep
    }

    /// Copy up to `out.len()` bytes out in FIFO order and shift the rest left.
    pub fn consume(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len());
        out[..n].copy_from_slice(&self.data[..n]);
        let len = self.data.len();
        self.data.copy_within(n..len, 0);
        self.data.truncate(len - n);
        n
    }

    /// Recompute `pending` from the buffered length.
    pub fn settle(&mut self) {
        self.pending = !self.data.is_empty();
    }

    /// Forget connection metadata (close path). Buffered bytes stay readable.
    pub(crate) fn clear_metadata(&mut self) {
        self.pending = false;
        self.connected_since = None;
    }

    /// Drop everything (new connection on this slot, module reboot).
    pub(crate) fn reset(&mut self) {
        self.data.clear();
        self.clear_metadata();
    }
}
