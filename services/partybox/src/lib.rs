//! Partybox service library crate.
//!
//! # Purpose
//! Exposes the HTTP API surface, admin auth, configuration, the quota ledger,
//! and the storage backends for use by the binary and tests.
//!
//! # Notes
//! Module boundaries mirror the HTTP API and storage backends.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod roster;
pub mod store;
