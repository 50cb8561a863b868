//! Quectel BG95/BG96 cellular modem driver.
//!
//! Talks to the module over its AT command port and exposes PDP contexts,
//! TCP/TLS sockets, MQTT sessions, HTTP downloads and SMS as methods on
//! [`Modem`]. The core is generic over the [`app::ports`] traits, so it
//! runs against a UART on ESP-IDF and against scripted mocks on the host.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`.
//!
//! ```text
//!  app tasks ──ModemRequest──▶ actor ──▶ Modem ──▶ engine ──▶ transport ──▶ UART
//!            ◀──ModemEvent───         ◀── dispatch ◀── at::urc ◀──────────┘
//!                                          │
//!                                          ▼
//!                                       registry
//! ```

#![deny(unused_must_use)]

pub mod actor;
pub mod adapters;
pub mod app;
pub mod at;
pub mod config;
pub mod drivers;
pub mod error;
pub mod modem;
pub mod registry;
pub mod transport;

pub use error::{Error, Result};
pub use modem::Modem;
