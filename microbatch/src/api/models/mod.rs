//! API request and response data models.
//!
//! These are distinct from the scheduler's own types so the wire format can stay
//! stable while the internals change.
//!
//! - [`ingest`]: submission body and acknowledgement
//! - [`status`]: request and batch status, per-id results, progress
//! - [`health`]: liveness and load summary

pub mod health;
pub mod ingest;
pub mod status;
