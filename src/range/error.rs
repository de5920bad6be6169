//! Error types for the breach-lookup subsystem.

use thiserror::Error;

/// The candidate prefix is not exactly 5 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("prefix must be 5 hex characters")]
pub struct InvalidPrefix;

/// Upstream body could not be turned into suffix records.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A `SUFFIX:COUNT` line whose count is not a base-10 integer.
    #[error("invalid count {value:?} on line {line}")]
    InvalidCount {
        line: usize,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Errors from the upstream range provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection failure, timeout or body read error.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success, non-rate-limit status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Every attempt was answered with a rate limit.
    #[error("upstream still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Body arrived but did not parse.
    #[error("malformed upstream response: {0}")]
    Malformed(#[from] ParseError),

    /// A concurrent fetch of the same prefix failed while this caller waited on it.
    #[error("concurrent fetch failed: {}", .0.message())]
    Coalesced(UpstreamFailure),
}

impl UpstreamError {
    /// Provider-neutral category handed to callers.
    pub fn failure(&self) -> UpstreamFailure {
        match self {
            UpstreamError::RateLimitExhausted { .. } => UpstreamFailure::RateLimited,
            UpstreamError::Malformed(_) => UpstreamFailure::BadResponse,
            UpstreamError::Coalesced(failure) => *failure,
            UpstreamError::Client(_) | UpstreamError::Transport(_) | UpstreamError::Status(_) => {
                UpstreamFailure::Unavailable
            }
        }
    }
}

/// Failures of the backing key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store rejected write for {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Cache problems that are absorbed by the cache layer and only logged.
#[derive(Debug, Error)]
pub enum CacheFault {
    #[error("cached entry for {key} is corrupted: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("cache read failed: {0}")]
    ReadFailed(#[source] StoreError),

    #[error("cache write failed: {0}")]
    WriteFailed(#[source] StoreError),

    /// The entry could not be encoded, so nothing was written.
    #[error("cannot encode entry for {key}: {reason}")]
    Unencodable { key: String, reason: String },
}

impl CacheFault {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheFault::Corrupted { .. } => "corrupted",
            CacheFault::ReadFailed(_) => "read_failed",
            CacheFault::WriteFailed(_) | CacheFault::Unencodable { .. } => "write_failed",
        }
    }
}

/// Why the service could not answer, without provider details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Provider keeps rate limiting us; try again later.
    RateLimited,
    /// Provider unreachable or answered with an error.
    Unavailable,
    /// Provider answered with data we could not read.
    BadResponse,
}

impl UpstreamFailure {
    pub fn message(&self) -> &'static str {
        match self {
            UpstreamFailure::RateLimited => "breach data temporarily unavailable, try again later",
            UpstreamFailure::Unavailable => "breach data provider unavailable",
            UpstreamFailure::BadResponse => "breach data provider returned an unreadable response",
        }
    }
}

/// Errors returned by [`crate::range::PwnedRangeService::lookup`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    InvalidPrefix(#[from] InvalidPrefix),

    #[error("{}", .0.message())]
    UpstreamUnavailable(UpstreamFailure),
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
