//! Tessera - cross-shard sort-merge query engine
//!
//! Tessera answers one logical query against indices split into shards:
//! every shard sorts its own hits, and the engine merges the per-shard
//! streams into a single globally ordered page. Sort orders cover strings,
//! numbers, booleans, dates and relevance, with explicit handling of
//! documents that lack the sort field, and schemas can change online
//! through a checkpointed reindex.
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::{EngineConfig, FieldConfig, FieldSchema, FieldType, SearchRequest, SearchService, SortRequest};
//!
//! let service = SearchService::in_memory(EngineConfig::default())?;
//! service.create_index(
//!     FieldSchema::new("titleSort", 3)
//!         .with_field(FieldConfig::new("stars", FieldType::NumericInt).sort()),
//! )?;
//!
//! let page = service
//!     .search(SearchRequest::new(["titleSort"]).sort(SortRequest::new("stars").descending()))
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! `tessera-core` holds the sort-key codec, the schema model and the
//! collaborator contracts; `tessera-engine` holds the resolver, the merge
//! and reindex coordinators, and an in-process cluster. Both are
//! re-exported here.

pub use tessera_core::*;
pub use tessera_engine::*;
