//! Security subsystem.
//!
//! # Responsibilities
//! - Per-client rate limiting of inbound lookups
//!
//! CORS and body limits are plain tower-http layers wired in `http::server`.

pub mod rate_limit;
