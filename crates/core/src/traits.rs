//! Collaborator contracts consumed by the merge core
//!
//! - ShardExecutor: runs a query on one shard and streams locally sorted results
//! - ReindexTarget: the shard-side half of a reindex
//! - SchemaRegistry: versioned field schemas per index
//! - NodeRegistry: where each shard of an index is served
//!
//! Executors are async (they sit behind the network); registries are
//! synchronous snapshot reads.

use crate::query::Query;
use crate::schema::FieldSchema;
use crate::sort::SortSpec;
use crate::stream::ShardResponse;
use crate::types::ShardTarget;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Executes queries against one shard's local index
///
/// # Contract
///
/// The returned stream must be ordered by `ScoredDoc::merge_cmp` under
/// `spec`, carry exactly `spec.len()` sort keys per document, and tag each
/// document with the schema version `spec` was resolved against for its
/// index. The hit count covers every local match, not only the streamed
/// documents.
#[async_trait]
pub trait ShardExecutor: Send + Sync {
    /// Run `query` on `target`, streaming at most `amount` documents
    async fn search(
        &self,
        target: &ShardTarget,
        query: &Query,
        spec: &SortSpec,
        amount: usize,
    ) -> Result<ShardResponse>;
}

/// Shard-side operations a reindex drives
///
/// Every operation must be idempotent: a resumed reindex repeats the
/// document it was working on when it failed.
#[async_trait]
pub trait ReindexTarget: Send + Sync {
    /// Ids of every document on the shard, in any order
    async fn document_ids(&self, target: &ShardTarget) -> Result<Vec<String>>;

    /// Stage sort-key material for `schema.version` next to existing material
    async fn rewrite_document(
        &self,
        target: &ShardTarget,
        doc_id: &str,
        schema: &FieldSchema,
    ) -> Result<()>;

    /// Drop material of every schema version other than `keep_version`
    async fn reclaim(&self, target: &ShardTarget, keep_version: u64) -> Result<()>;
}

/// Persistent store of index schemas
pub trait SchemaRegistry: Send + Sync {
    /// Register a new index at its initial version
    ///
    /// Fails if the schema is invalid or the index already exists.
    fn create_index(&self, schema: FieldSchema) -> Result<Arc<FieldSchema>>;

    /// Current schema snapshot of `index`
    fn get_schema(&self, index: &str) -> Result<Arc<FieldSchema>>;

    /// Install `schema` as the current version of its index
    ///
    /// Readers observe either the previous or the new snapshot, never a mix.
    fn set_schema(&self, schema: FieldSchema) -> Result<()>;

    /// Names of all registered indices
    fn index_names(&self) -> Vec<String>;
}

/// Cluster membership and shard placement
pub trait NodeRegistry: Send + Sync {
    /// Every shard of `index` and the node serving it
    fn list_shard_locations(&self, index: &str) -> Result<Vec<ShardTarget>>;
}
