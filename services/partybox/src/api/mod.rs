//! Partybox HTTP API module.
//!
//! # Purpose
//! Route handlers grouped by resource, plus the shared error type, payload
//! shapes, and the aggregated OpenAPI document.
pub mod error;
pub mod openapi;
pub mod parties;
pub mod participants;
pub mod system;
pub mod types;
