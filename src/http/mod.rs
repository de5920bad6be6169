//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, JSON body with a single `prefix`)
//!     → range::PwnedRangeService::lookup
//!     → response.rs (errors to status + `detail`)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{PwnedRangeRequest, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
