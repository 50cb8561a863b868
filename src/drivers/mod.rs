//! Board-level drivers.

pub mod pwrkey;
