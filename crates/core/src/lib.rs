//! Core types and contracts for Tessera
//!
//! This crate defines the foundational types of the cross-shard merge engine:
//! - FieldType / FieldValue: declared field types and raw values
//! - SortKey codec: type-aware, missing-aware comparable keys
//! - SortRequest / SortField / SortSpec: client and resolved sort definitions
//! - FieldSchema: versioned per-index field mappings
//! - ScoredDoc / MergeResult: per-query results
//! - ShardResultStream: bounded, explicitly terminated per-shard streams
//! - Traits: ShardExecutor, ReindexTarget, SchemaRegistry, NodeRegistry
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod doc;
pub mod error;
pub mod field;
pub mod normalize;
pub mod query;
pub mod schema;
pub mod sort;
pub mod stream;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use codec::{compare, compare_tuples, encode, encode_score, KeyValue, SortKey, SortKeys};
pub use doc::{MergeResult, ScoredDoc, ShardDiagnostics, ShardStatus};
pub use error::{Error, Result, ShardFailure};
pub use field::{FieldType, FieldValue, TypeFamily};
pub use normalize::StringHandling;
pub use query::Query;
pub use schema::{
    FieldConfig, FieldSchema, SchemaDiff, SortAlias, SortBinding, SortLookup, SCORE_FIELD,
};
pub use sort::{Direction, MissingPlacement, SortField, SortRequest, SortSpec};
pub use stream::{ShardResponse, ShardResultStream, ShardStreamSender};
pub use traits::{NodeRegistry, ReindexTarget, SchemaRegistry, ShardExecutor};
pub use types::{NodeAddress, ShardId, ShardTarget};
