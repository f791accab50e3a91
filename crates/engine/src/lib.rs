//! Query engine for Tessera
//!
//! This crate drives the collaborators defined in `tessera-core`:
//! - Resolver: client sort requests → `SortSpec`, once per query
//! - MergeCoordinator: per-shard fan-out and k-way merge
//! - ReindexCoordinator: online schema changes with checkpoints
//! - Registries: schema snapshots (memory or JSON files) and shard placement
//! - MemoryCluster: in-process shards implementing `ShardExecutor` and
//!   `ReindexTarget`
//! - SearchService: the embedded entry point tying it all together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod memory;
pub mod merge;
pub mod registry;
pub mod reindex;
pub mod resolver;
pub mod service;

pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, ReindexCheckpoint, ShardProgress,
};
pub use config::{EngineConfig, FailurePolicy, CONFIG_FILE_NAME};
pub use memory::{Document, MemoryCluster, ShardFault};
pub use merge::MergeCoordinator;
pub use registry::{FsSchemaRegistry, MemoryNodeRegistry, MemorySchemaRegistry};
pub use reindex::{ReindexCoordinator, ReindexReport, ReindexState};
pub use resolver::resolve;
pub use service::{SearchRequest, SearchService};
