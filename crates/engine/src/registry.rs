//! Schema and node registries
//!
//! - MemorySchemaRegistry: versioned schema snapshots behind one lock that is
//!   held only for the pointer read or swap
//! - FsSchemaRegistry: the same, persisted as one JSON settings file per index
//! - MemoryNodeRegistry: cluster membership and round-robin shard placement

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{
    Error, FieldSchema, NodeAddress, NodeRegistry, Result, SchemaRegistry, ShardId, ShardTarget,
};
use tracing::{debug, info, warn};

/// Extension of persisted index settings files
const SETTINGS_EXTENSION: &str = "json";

// ============================================================================
// MemorySchemaRegistry
// ============================================================================

/// In-memory schema registry with atomic snapshot swap
///
/// Readers clone an `Arc<FieldSchema>`; a swap replaces the `Arc`. A query
/// that resolved against the old snapshot keeps using it until it finishes.
#[derive(Debug, Default)]
pub struct MemorySchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<FieldSchema>>>,
}

impl MemorySchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an index, returning its last schema
    pub fn remove_index(&self, index: &str) -> Option<Arc<FieldSchema>> {
        self.schemas.write().remove(index)
    }

    fn check_swap(current: Option<&Arc<FieldSchema>>, schema: &FieldSchema) -> Result<()> {
        match current {
            None => Err(Error::IndexNotFound(schema.index_name.clone())),
            Some(current) if schema.version <= current.version => Err(Error::invalid_schema(
                format!(
                    "schema version {} of '{}' is not newer than {}",
                    schema.version, schema.index_name, current.version
                ),
            )),
            Some(_) => Ok(()),
        }
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn create_index(&self, schema: FieldSchema) -> Result<Arc<FieldSchema>> {
        schema.validate()?;
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&schema.index_name) {
            return Err(Error::invalid_schema(format!(
                "index '{}' already exists",
                schema.index_name
            )));
        }
        let snapshot = Arc::new(schema);
        schemas.insert(snapshot.index_name.clone(), Arc::clone(&snapshot));
        info!(target: "tessera::registry", index = %snapshot.index_name, "Index created");
        Ok(snapshot)
    }

    fn get_schema(&self, index: &str) -> Result<Arc<FieldSchema>> {
        self.schemas
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }

    fn set_schema(&self, schema: FieldSchema) -> Result<()> {
        schema.validate()?;
        let mut schemas = self.schemas.write();
        Self::check_swap(schemas.get(&schema.index_name), &schema)?;
        debug!(
            target: "tessera::registry",
            index = %schema.index_name,
            version = schema.version,
            "Schema swapped"
        );
        schemas.insert(schema.index_name.clone(), Arc::new(schema));
        Ok(())
    }

    fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// FsSchemaRegistry
// ============================================================================

/// Schema registry persisted as `<index>.json` files in a settings directory
///
/// Writes go to disk first (temp file + rename) and are then swapped into
/// memory, so a restart reloads exactly the schemas queries were served with.
#[derive(Debug)]
pub struct FsSchemaRegistry {
    dir: PathBuf,
    inner: MemorySchemaRegistry,
}

impl FsSchemaRegistry {
    /// Open (or create) the settings directory and load every index in it
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let inner = MemorySchemaRegistry::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SETTINGS_EXTENSION) {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let schema: FieldSchema = serde_json::from_str(&content).map_err(|e| {
                Error::Serialization(format!("{}: {}", path.display(), e))
            })?;
            if let Err(e) = schema.validate() {
                warn!(target: "tessera::registry", path = %path.display(), error = %e, "Skipping invalid settings file");
                continue;
            }
            inner
                .schemas
                .write()
                .insert(schema.index_name.clone(), Arc::new(schema));
        }
        info!(
            target: "tessera::registry",
            dir = %dir.display(),
            indices = inner.schemas.read().len(),
            "Schema registry loaded"
        );
        Ok(FsSchemaRegistry { dir, inner })
    }

    /// Remove an index and its settings file
    pub fn remove_index(&self, index: &str) -> Result<Option<Arc<FieldSchema>>> {
        match std::fs::remove_file(self.settings_path(index)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self.inner.remove_index(index))
    }

    fn settings_path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", index, SETTINGS_EXTENSION))
    }

    fn persist(&self, schema: &FieldSchema) -> Result<()> {
        let json = serde_json::to_vec_pretty(schema)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let path = self.settings_path(&schema.index_name);
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

impl SchemaRegistry for FsSchemaRegistry {
    fn create_index(&self, schema: FieldSchema) -> Result<Arc<FieldSchema>> {
        schema.validate()?;
        if self.inner.schemas.read().contains_key(&schema.index_name) {
            return Err(Error::invalid_schema(format!(
                "index '{}' already exists",
                schema.index_name
            )));
        }
        self.persist(&schema)?;
        self.inner.create_index(schema)
    }

    fn get_schema(&self, index: &str) -> Result<Arc<FieldSchema>> {
        self.inner.get_schema(index)
    }

    fn set_schema(&self, schema: FieldSchema) -> Result<()> {
        schema.validate()?;
        MemorySchemaRegistry::check_swap(
            self.inner.schemas.read().get(&schema.index_name),
            &schema,
        )?;
        self.persist(&schema)?;
        self.inner.set_schema(schema)
    }

    fn index_names(&self) -> Vec<String> {
        self.inner.index_names()
    }
}

// ============================================================================
// MemoryNodeRegistry
// ============================================================================

/// Cluster membership plus shard placement
#[derive(Debug, Default)]
pub struct MemoryNodeRegistry {
    nodes: RwLock<Vec<NodeAddress>>,
    placements: RwLock<HashMap<String, Vec<ShardTarget>>>,
}

impl MemoryNodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a single local node
    pub fn single_node() -> Self {
        let registry = Self::new();
        registry.add_node(NodeAddress::local());
        registry
    }

    /// Add or replace a node (keyed by address and port)
    pub fn add_node(&self, node: NodeAddress) {
        let mut nodes = self.nodes.write();
        if !nodes.contains(&node) {
            info!(target: "tessera::registry", node = %node, "Node added");
            nodes.push(node);
            nodes.sort();
        }
    }

    /// Remove a node; fails while it still hosts shards
    pub fn remove_node(&self, node: &NodeAddress) -> Result<()> {
        let hosted: Vec<String> = self
            .placements
            .read()
            .values()
            .flatten()
            .filter(|t| &t.node == node)
            .map(|t| t.shard.to_string())
            .collect();
        if !hosted.is_empty() {
            return Err(Error::invalid_schema(format!(
                "node {} still hosts shards: {}",
                node,
                hosted.join(", ")
            )));
        }
        self.nodes.write().retain(|n| n != node);
        Ok(())
    }

    /// Current members
    pub fn nodes(&self) -> Vec<NodeAddress> {
        self.nodes.read().clone()
    }

    /// Assign every shard of an index to nodes, round robin
    pub fn place_index(&self, index: &str, number_of_shards: u32) -> Result<Vec<ShardTarget>> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return Err(Error::shard(format!(
                "cannot place index '{}': no nodes registered",
                index
            )));
        }
        let targets: Vec<ShardTarget> = (0..number_of_shards)
            .map(|shard| {
                let node = nodes[shard as usize % nodes.len()].clone();
                ShardTarget::new(ShardId::new(index, shard), node)
            })
            .collect();
        self.placements
            .write()
            .insert(index.to_string(), targets.clone());
        Ok(targets)
    }

    /// Forget an index's placement
    pub fn unplace_index(&self, index: &str) {
        self.placements.write().remove(index);
    }
}

impl NodeRegistry for MemoryNodeRegistry {
    fn list_shard_locations(&self, index: &str) -> Result<Vec<ShardTarget>> {
        self.placements
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }
}
