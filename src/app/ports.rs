//! Port traits — the hexagonal boundary between the driver core and the
//! outside world.
//!
//! ```text
//!   UART / clock / PWRKEY adapter ──▶ Port trait ──▶ Modem (driver core)
//!   Modem ──▶ Port trait ──▶ application observer
//! ```
//!
//! The [`Modem`](crate::Modem) consumes the serial and clock ports via
//! generics, so the core never touches a UART register directly and runs
//! unchanged against the scripted mocks in `tests/`.

// ───────────────────────────────────────────────────────────────
// Serial port (driven adapter: UART ↔ driver)
// ───────────────────────────────────────────────────────────────

/// Byte-oriented serial channel to the module.
pub trait SerialPort {
    /// Error type for this port.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the port.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: system timer → driver)
// ───────────────────────────────────────────────────────────────

/// Monotonic time source plus a blocking delay.
///
/// Every wait in the driver is expressed as "poll, then `delay_ms`" until
/// `now_ms` passes a deadline, so a virtual clock that advances inside
/// `delay_ms` makes every timeout deterministic in tests.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed epoch (monotonic).
    fn now_ms(&self) -> u64;

    /// Block the calling task for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Power key port (driven adapter: driver → PWRKEY GPIO)
// ───────────────────────────────────────────────────────────────

/// The module's PWRKEY line.
pub trait PowerKey {
    /// Drive PWRKEY high for `hold_ms`, then release it.
    fn pulse(&mut self, hold_ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Download observer (driving port: driver → application)
// ───────────────────────────────────────────────────────────────

/// Completion notifications for [`Modem::http_get_download`](crate::Modem::http_get_download).
///
/// Exactly one of `finished` / `failed` is delivered per accepted job,
/// possibly preceded by one `pending`.
pub trait DownloadObserver {
    /// The server answered; `content_length` is the announced body size.
    fn pending(&mut self, status: u16, content_length: usize);

    /// The file was written to the module's filesystem.
    fn finished(&mut self);

    /// The download failed at any stage after it was started.
    fn failed(&mut self);
}
