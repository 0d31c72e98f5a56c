//! Administrator authentication.
//!
//! `session` mints and verifies bearer tokens; `admin` exposes the login
//! endpoint and the checks handlers use to gate writes.
pub mod admin;
pub mod session;
