//! HTTP request handlers.
//!
//! - [`ingest`]: submission of ids
//! - [`status`]: request status, per-id results and progress
//! - [`health`]: liveness and load

pub mod health;
pub mod ingest;
pub mod status;
