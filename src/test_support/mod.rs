//! Test-only helpers shared by unit tests.

pub mod socket_guard;
