//! Shapes exchanged while paging through a bucket listing.
//!
//! Group prefixes ("folders") are plain strings ending in the delimiter.
//! They are derived from key structure at listing time and never stored.

use super::object::StorageObject;

/// Parameters of a single ListObjectsV2-style page request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: Option<usize>,
    pub continuation_token: Option<String>,
}

/// One page returned by the listing source.
#[derive(Clone, Debug, Default)]
pub struct ListingPage {
    pub objects: Vec<StorageObject>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Aggregated output of a full listing, in page-arrival order.
#[derive(Clone, Debug, Default)]
pub struct ListingResult {
    pub groups: Vec<String>,
    pub entries: Vec<StorageObject>,
}
