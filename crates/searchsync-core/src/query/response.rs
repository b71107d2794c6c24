//! Engine-neutral search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of hits plus facet counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<Value>,
    /// Total hits reported by the engine (may be an estimate).
    pub total_hits: u64,
    pub offset: u64,
    pub limit: u64,
    /// field → value → count
    #[serde(default)]
    pub facets: BTreeMap<String, BTreeMap<String, u64>>,
    /// Cursor for the following page in deep-pagination mode.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl SearchResponse {
    /// `true` iff another page exists after this one.
    pub fn has_next_page(&self) -> bool {
        self.limit.saturating_add(self.offset) < self.total_hits
    }

    /// Offset of the following page, if any.
    pub fn next_offset(&self) -> Option<u64> {
        self.has_next_page().then(|| self.offset + self.limit)
    }
}
