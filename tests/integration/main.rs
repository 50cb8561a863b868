//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives one subsystem of the
//! [`bgxx::Modem`] against the scripted module in `mock_modem`. All tests
//! run on the host with no hardware and in virtual time.

mod dispatcher_tests;
mod lifecycle_tests;
mod mock_modem;
mod socket_tests;
