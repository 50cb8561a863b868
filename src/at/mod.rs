//! AT protocol text handling: parameter tokenizing and URC classification.
//!
//! Both submodules are pure functions over `&str`; the transaction engine
//! and dispatcher in [`crate::modem`] feed them lines from
//! [`crate::transport::LineReader`].

pub mod fields;
pub mod urc;

pub use urc::{RegDomain, RegistrationStatus, Urc};
