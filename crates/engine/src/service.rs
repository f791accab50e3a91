//! Embedded search service
//!
//! Wires the registries, the in-memory shard cluster, the merge coordinator
//! and the reindex coordinator behind the two caller-facing operations:
//! `search` and `reindex`.
//!
//! # Example
//!
//! ```ignore
//! let service = SearchService::in_memory(EngineConfig::default())?;
//! service.create_index(schema)?;
//! service.index_document("titleSort", "1", doc)?;
//! let page = service
//!     .search(SearchRequest::new(["titleSort"]).sort(SortRequest::new("stars").descending()))
//!     .await?;
//! ```

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::config::{EngineConfig, CONFIG_FILE_NAME};
use crate::memory::{Document, MemoryCluster};
use crate::merge::MergeCoordinator;
use crate::registry::{FsSchemaRegistry, MemoryNodeRegistry, MemorySchemaRegistry};
use crate::reindex::{ReindexCoordinator, ReindexReport};
use crate::resolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    Error, FieldSchema, MergeResult, Query, Result, SchemaRegistry, ShardId, SortRequest,
};
use tracing::info;

/// Subdirectory of the data directory holding index settings
const INDICES_DIR: &str = "indices";
/// Subdirectory of the data directory holding reindex checkpoints
const CHECKPOINTS_DIR: &str = "checkpoints";

/// One query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Indices searched together
    pub indices: Vec<String>,
    /// Shard-level query
    #[serde(default)]
    pub query: Query,
    /// Compound sort; empty means relevance order
    #[serde(default)]
    pub sort: Vec<SortRequest>,
    /// Page size
    #[serde(default = "default_amount")]
    pub amount: usize,
    /// Deadline for the whole query; the engine default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_amount() -> usize {
    10
}

impl SearchRequest {
    /// Match everything in `indices`, relevance order, ten results
    pub fn new<I, S>(indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchRequest {
            indices: indices.into_iter().map(Into::into).collect(),
            query: Query::MatchAll,
            sort: Vec::new(),
            amount: default_amount(),
            timeout_ms: None,
        }
    }

    /// Builder: set the query
    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// Builder: append a sort field
    pub fn sort(mut self, sort: SortRequest) -> Self {
        self.sort.push(sort);
        self
    }

    /// Builder: set the page size
    pub fn amount(mut self, amount: usize) -> Self {
        self.amount = amount;
        self
    }

    /// Builder: set the deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// Query and reindex entry point over an in-process cluster
pub struct SearchService {
    config: EngineConfig,
    schemas: Arc<dyn SchemaRegistry>,
    nodes: Arc<MemoryNodeRegistry>,
    cluster: Arc<MemoryCluster>,
    merge: MergeCoordinator,
    reindexer: ReindexCoordinator,
}

impl SearchService {
    /// Assemble a service from its parts
    ///
    /// Checkpoints go to `<data_dir>/checkpoints` when the config names a
    /// data directory, otherwise they are kept in memory.
    pub fn new(
        config: EngineConfig,
        schemas: Arc<dyn SchemaRegistry>,
        nodes: Arc<MemoryNodeRegistry>,
        cluster: Arc<MemoryCluster>,
    ) -> Result<Self> {
        config.validate()?;
        let checkpoints: Arc<dyn CheckpointStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileCheckpointStore::open(dir.join(CHECKPOINTS_DIR))?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };
        let merge = MergeCoordinator::new(cluster.clone(), nodes.clone(), &config)?;
        let reindexer = ReindexCoordinator::new(
            Arc::clone(&schemas),
            nodes.clone(),
            cluster.clone(),
            checkpoints,
            config.checkpoint_interval,
        );
        Ok(SearchService {
            config,
            schemas,
            nodes,
            cluster,
            merge,
            reindexer,
        })
    }

    /// Everything in memory
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        let cluster = Arc::new(MemoryCluster::new(config.stream_buffer));
        Self::new(
            config,
            Arc::new(MemorySchemaRegistry::new()),
            Arc::new(MemoryNodeRegistry::single_node()),
            cluster,
        )
    }

    /// Open a data directory with fresh shards
    ///
    /// Writes a default `tessera.toml` on first use.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(
            data_dir,
            Arc::new(MemoryNodeRegistry::single_node()),
            Arc::new(MemoryCluster::default()),
        )
    }

    /// Open a data directory against shards that are already running
    ///
    /// Index settings are reloaded from disk; the shards keep their data.
    pub fn open_with(
        data_dir: impl AsRef<Path>,
        nodes: Arc<MemoryNodeRegistry>,
        cluster: Arc<MemoryCluster>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        let config = EngineConfig::from_file(&config_path)?.with_data_dir(data_dir);

        let schemas = Arc::new(FsSchemaRegistry::open(data_dir.join(INDICES_DIR))?);
        info!(
            target: "tessera::registry",
            dir = %data_dir.display(),
            indices = schemas.index_names().len(),
            "Search service opened"
        );
        Self::new(config, schemas, nodes, cluster)
    }

    /// Create an index and place its shards
    pub fn create_index(&self, schema: FieldSchema) -> Result<Arc<FieldSchema>> {
        let snapshot = self.schemas.create_index(schema)?;
        self.nodes
            .place_index(&snapshot.index_name, snapshot.number_of_shards)?;
        self.cluster.open_index(&snapshot);
        Ok(snapshot)
    }

    /// Store a document under the index's current schema
    pub fn index_document(&self, index: &str, id: &str, doc: Document) -> Result<ShardId> {
        let schema = self.schemas.get_schema(index)?;
        self.cluster.index_document(&schema, id, doc)
    }

    /// Delete a document; returns whether it existed
    pub fn delete_document(&self, index: &str, id: &str) -> Result<bool> {
        self.schemas.get_schema(index)?;
        Ok(self.cluster.delete_document(index, id))
    }

    /// Run one query across its indices
    ///
    /// Sort resolution errors are returned before any shard is contacted.
    pub async fn search(&self, request: SearchRequest) -> Result<MergeResult> {
        if request.indices.is_empty() {
            return Err(Error::invalid_schema("a search needs at least one index"));
        }
        let mut schemas = BTreeMap::new();
        for index in &request.indices {
            schemas.insert(index.clone(), self.schemas.get_schema(index)?);
        }
        let spec = resolver::resolve(&request.sort, &schemas)?;
        let indices: Vec<String> = schemas.into_keys().collect();
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.query_timeout());
        self.merge
            .execute(&indices, &request.query, &spec, request.amount, timeout)
            .await
    }

    /// Move `index` to `new_schema` while queries keep running
    pub async fn reindex(&self, index: &str, new_schema: FieldSchema) -> Result<ReindexReport> {
        self.reindexer.reindex(index, new_schema).await
    }

    /// Latest reindex job report of `index`
    pub fn reindex_status(&self, index: &str) -> Option<ReindexReport> {
        self.reindexer.status(index)
    }

    /// Current schema snapshot of `index`
    pub fn schema(&self, index: &str) -> Result<Arc<FieldSchema>> {
        self.schemas.get_schema(index)
    }

    /// Engine configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Node registry (shard placement)
    pub fn nodes(&self) -> &Arc<MemoryNodeRegistry> {
        &self.nodes
    }

    /// The shards
    pub fn cluster(&self) -> &Arc<MemoryCluster> {
        &self.cluster
    }
}
