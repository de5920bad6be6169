//! Parsing of the provider's `SUFFIX:COUNT` range format.

use serde::{Deserialize, Serialize};

use crate::range::error::ParseError;

/// The remainder of a hash after the shared prefix, with its breach count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRecord {
    pub suffix: String,
    pub count: u64,
}

/// Parse a range body into records, keeping line order.
///
/// Lines without a `:` are skipped. A count that is not a base-10 integer
/// fails the whole body.
pub fn parse_range(raw: &str) -> Result<Vec<SuffixRecord>, ParseError> {
    let mut records = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        let Some((suffix, count)) = line.split_once(':') else {
            continue;
        };

        let count = count.trim();
        let count = count.parse::<u64>().map_err(|source| ParseError::InvalidCount {
            line: idx + 1,
            value: count.to_string(),
            source,
        })?;

        records.push(SuffixRecord {
            suffix: suffix.trim().to_ascii_uppercase(),
            count,
        });
    }

    Ok(records)
}
