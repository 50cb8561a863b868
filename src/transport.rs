//! Line framing over the serial port.
//!
//! The module speaks a line protocol with two exceptions the framer has to
//! know about:
//!
//! ```text
//!   "\r\n+QIURC: \"recv\",1\r\n"      → Line("+QIURC: \"recv\",1")
//!   "\r\n> "                           → Line(">")   (no terminator follows)
//!   "+QIRD: 5\r\nhello\r\nOK\r\n"      → Line("+QIRD: 5"), raw 5 bytes, Line("OK")
//! ```
//!
//! Lines are returned as soon as a `\n` arrives. The bare `>` data prompt is
//! returned without waiting for a terminator. Raw payloads that follow a
//! length-announcing line are read with [`LineReader::read_raw`], which never
//! looks at line structure.

use heapless::Vec;
use log::{trace, warn};

use crate::app::ports::{Clock, SerialPort};
use crate::error::TransportError;

/// Longest line kept intact; longer lines are truncated with a warning.
pub const LINE_CAPACITY: usize = 1024;

/// One received line, without its `\n` terminator.
#[derive(Clone, PartialEq, Eq)]
pub struct Line {
    raw: Vec<u8, LINE_CAPACITY>,
    truncated: bool,
}

impl Line {
    /// Build a line from text (tests, fuzzing, synthetic replies).
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let take = bytes.len().min(LINE_CAPACITY);
        let mut raw = Vec::new();
        let _ = raw.extend_from_slice(&bytes[..take]);
        Self {
            raw,
            truncated: take < bytes.len(),
        }
    }

    /// Bytes as received, possibly including a trailing `\r`.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Longest valid UTF-8 prefix, with trailing whitespace removed.
    pub fn as_str(&self) -> &str {
        let text = match core::str::from_utf8(&self.raw) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.raw[..e.valid_up_to()]).unwrap_or_default(),
        };
        text.trim_end()
    }

    pub fn is_prompt(&self) -> bool {
        self.raw.as_slice() == b">"
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

impl core::fmt::Debug for Line {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Line({:?})", self.as_str())
    }
}

/// Streaming line framer that owns the serial port.
pub struct LineReader<S> {
    port: S,
    pending: Vec<u8, LINE_CAPACITY>,
    overflowed: bool,
}

impl<S: SerialPort> LineReader<S> {
    pub fn new(port: S) -> Self {
        Self {
            port,
            pending: Vec::new(),
            overflowed: false,
        }
    }

    pub fn port(&self) -> &S {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    pub fn into_inner(self) -> S {
        self.port
    }

    /// Whether the port has bytes waiting or a partial line is buffered.
    pub fn has_input(&self) -> bool {
        !self.pending.is_empty() || self.port.available()
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) => {
                warn!("serial read failed: {:?}", e);
                Err(TransportError::ReadFailed)
            }
        }
    }

    fn take_line(&mut self) -> Option<Line> {
        let truncated = core::mem::take(&mut self.overflowed);
        let raw = core::mem::take(&mut self.pending);
        let line = Line { raw, truncated };
        if line.as_str().is_empty() && !truncated {
            return None;
        }
        if truncated {
            warn!("line exceeded {} bytes, truncated", LINE_CAPACITY);
        }
        Some(line)
    }

    /// Return the next complete line, or `None` once the port is drained.
    ///
    /// Leading whitespace and empty lines are skipped. Bytes of an
    /// incomplete line stay buffered for the next call.
    pub fn poll_line(&mut self) -> Result<Option<Line>, TransportError> {
        while let Some(byte) = self.read_byte()? {
            match byte {
                b'\n' => {
                    if let Some(line) = self.take_line() {
                        trace!("<< {}", line.as_str());
                        return Ok(Some(line));
                    }
                }
                b' ' | b'\r' | b'\t' if self.pending.is_empty() => {}
                _ => {
                    if self.pending.push(byte).is_err() {
                        self.overflowed = true;
                        continue;
                    }
                    if self.pending.as_slice() == b">" {
                        self.pending.clear();
                        return Ok(Some(Line::new(">")));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Read exactly `out.len()` raw bytes unless `timeout_ms` elapses first.
    /// Returns the number of bytes stored.
    pub fn read_raw<C: Clock>(
        &mut self,
        out: &mut [u8],
        clock: &mut C,
        timeout_ms: u32,
        poll_ms: u32,
    ) -> Result<usize, TransportError> {
        let deadline = clock.now_ms() + u64::from(timeout_ms);
        let mut filled = 0;
        while filled < out.len() {
            match self.read_byte()? {
                Some(b) => {
                    out[filled] = b;
                    filled += 1;
                }
                None => {
                    if clock.now_ms() >= deadline {
                        break;
                    }
                    clock.delay_ms(poll_ms);
                }
            }
        }
        Ok(filled)
    }

    /// Send one command line terminated by `\r\n`.
    pub fn write_line(&mut self, cmd: &str) -> Result<(), TransportError> {
        self.write_all(cmd.as_bytes())?;
        self.write_all(b"\r\n")?;
        self.flush()
    }

    /// Send raw payload bytes (after a `>` or `CONNECT` prompt).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.write_all(data)?;
        self.flush()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut sent = 0;
        while sent < data.len() {
            match self.port.write(&data[sent..]) {
                Ok(0) => return Err(TransportError::ShortWrite),
                Ok(n) => sent += n,
                Err(e) => {
                    warn!("serial write failed: {:?}", e);
                    return Err(TransportError::WriteFailed);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush().map_err(|e| {
            warn!("serial flush failed: {:?}", e);
            TransportError::WriteFailed
        })
    }

    /// Drop any partially received line.
    pub fn discard_partial(&mut self) {
        self.pending.clear();
        self.overflowed = false;
    }
}
