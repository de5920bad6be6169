//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream fetch attempt:
//!     → per-attempt timeout (enforced by the HTTP client)
//!     → On 429: retries.rs (attempt budget) + backoff.rs (delay)
//!     → Any other failure: give up immediately
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Only rate-limit responses are retried
//! - Backoff state is local to one fetch, never shared between requests

pub mod backoff;
pub mod retries;
