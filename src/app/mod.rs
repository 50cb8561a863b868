//! Boundary types between the driver and the application.
//!
//! [`ports`] holds the traits the driver consumes (serial link, clock,
//! PWRKEY) or calls back into (download observer). [`commands`] and
//! [`events`] are the messages exchanged with the
//! [`ModemActor`](crate::actor::ModemActor).

pub mod commands;
pub mod events;
pub mod ports;
