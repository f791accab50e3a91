//! Per-query result types
//!
//! - ScoredDoc: one candidate produced by a shard, with its encoded sort keys
//! - MergeResult: the globally ordered page plus exact hit count
//! - ShardDiagnostics: what each shard contributed to a merge

use crate::codec::{compare_tuples, SortKeys};
use crate::types::ShardId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// A document reference with the sort keys it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    /// Document id, unique within its index
    pub unique_id: String,
    /// Index the document came from
    pub source_index: String,
    /// Shard number within `source_index`
    pub source_shard: u32,
    /// Relevance score computed by the shard
    pub score: f64,
    /// One key per field of the query's `SortSpec`
    pub sort_keys: SortKeys,
    /// Schema version the sort keys were produced under
    pub schema_version: u64,
}

impl ScoredDoc {
    /// Shard the document came from
    pub fn shard_id(&self) -> ShardId {
        ShardId::new(self.source_index.clone(), self.source_shard)
    }

    /// Total order used by the merge
    ///
    /// Sort keys first, then `unique_id`, `source_index` and `source_shard`
    /// ascending so identical queries always produce identical pages.
    pub fn merge_cmp(&self, other: &ScoredDoc) -> Ordering {
        compare_tuples(&self.sort_keys, &other.sort_keys)
            .then_with(|| self.unique_id.cmp(&other.unique_id))
            .then_with(|| self.source_index.cmp(&other.source_index))
            .then_with(|| self.source_shard.cmp(&other.source_shard))
    }
}

/// Outcome of one shard's participation in a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    /// Responded and streamed to completion (or until the page filled)
    Ok,
    /// Returned an error or produced malformed output
    Failed(String),
    /// Did not answer within the shard timeout
    TimedOut,
}

/// Per-shard accounting for one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDiagnostics {
    /// Shard addressed
    pub shard: ShardId,
    /// Node the request went to
    pub node: String,
    /// Local hit count reported by the shard (0 if it failed before answering)
    pub hit_count: u64,
    /// Documents pulled from the shard's stream
    pub docs_consumed: usize,
    /// Time until the shard answered
    pub response_time: Duration,
    /// Final status
    pub status: ShardStatus,
}

impl ShardDiagnostics {
    /// Whether the shard contributed fully
    pub fn is_ok(&self) -> bool {
        self.status == ShardStatus::Ok
    }
}

/// Globally ordered page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    /// At most `amount` documents, in global sort order
    pub documents: Vec<ScoredDoc>,
    /// Sum of local hit counts of every shard that answered, including
    /// shards whose stream failed afterwards
    pub total_hits: u64,
    /// True when at least one shard failed and the policy allowed degrading
    pub partial: bool,
    /// One entry per dispatched shard
    pub shards: Vec<ShardDiagnostics>,
}

impl MergeResult {
    /// Diagnostics of shards that did not contribute fully
    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardDiagnostics> {
        self.shards.iter().filter(|d| !d.is_ok())
    }
}
