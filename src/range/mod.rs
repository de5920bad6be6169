//! Breach-range lookup subsystem.
//!
//! # Data Flow
//! ```text
//! lookup("abcde")
//!     → prefix.rs (validate, uppercase)       → InvalidPrefix, no I/O
//!     → cache.rs (store.get "hibp:ABCDE")     → hit: return
//!     → fetcher.rs (GET /range/ABCDE, 429 backoff)
//!     → parser.rs (SUFFIX:COUNT lines)
//!     → cache.rs (store.set_ex, 24h TTL)
//!     → service.rs (LookupOutcome)
//! ```
//!
//! # Privacy
//! Only the 5-character prefix ever enters this module. Full hashes and
//! passwords have no representation here.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod prefix;
pub mod service;
pub mod store;

pub use cache::{RangeCache, RangeResult};
pub use error::{
    CacheFault, InvalidPrefix, LookupError, ParseError, StoreError, UpstreamError, UpstreamFailure,
};
pub use fetcher::{HttpRangeFetcher, RangeFetcher};
pub use parser::{parse_range, SuffixRecord};
pub use prefix::{validate, PrefixKey};
pub use service::{LookupOutcome, PwnedRangeService};
pub use store::{CacheStore, MemoryStore};
