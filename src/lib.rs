//! Privacy-preserving password breach lookup proxy.
//!
//! Clients send the first 5 hex characters of a password's SHA-1 hash; the
//! service answers with every breached suffix sharing that prefix, fetched
//! from the upstream range API and cached for 24 hours.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod range;
pub mod resilience;
pub mod security;

pub use config::schema::PwnedConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use range::{LookupError, LookupOutcome, PrefixKey, PwnedRangeService};
