//! Reindex checkpoints
//!
//! A checkpoint records, per shard, the highest document id that already
//! carries sort-key material for the target schema. Shards are walked in
//! ascending id order, so a resumed job continues with the first id above
//! it; documents deleted or added below that point in the meantime cannot
//! shift it. A reindex towards a different target schema discards it.
//!
//! File checkpoints (`<index>.reindex`) are written atomically via temp +
//! rename: 4-byte magic, little-endian format version, MessagePack payload.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tessera_core::{Error, FieldSchema, Result};
use uuid::Uuid;

/// Magic bytes for checkpoint files
const CHECKPOINT_MAGIC: &[u8; 4] = b"TRCK";
/// Current checkpoint format version
const CHECKPOINT_VERSION: u32 = 2;
const CHECKPOINT_EXTENSION: &str = "reindex";

/// Progress of one reindex job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexCheckpoint {
    /// Job that wrote the checkpoint; kept when the job resumes
    pub job_id: Uuid,
    /// Target schema, version already assigned
    pub target: FieldSchema,
    /// Shard number → progress
    pub completed: BTreeMap<u32, ShardProgress>,
}

/// How far a reindex got on one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardProgress {
    /// Highest document id rewritten
    pub last_id: Option<String>,
    /// Documents rewritten
    pub rewritten: u64,
}

impl ShardProgress {
    /// Record that `id` was rewritten
    pub fn advance(&mut self, id: &str) {
        self.last_id = Some(id.to_string());
        self.rewritten += 1;
    }

    /// Where rewriting picks up in ascending `ids`
    pub fn resume_at(&self, ids: &[String]) -> usize {
        match &self.last_id {
            Some(last) => ids.partition_point(|id| id.as_str() <= last.as_str()),
            None => 0,
        }
    }
}

impl ReindexCheckpoint {
    /// Fresh checkpoint with no progress
    pub fn new(target: FieldSchema) -> Self {
        ReindexCheckpoint {
            job_id: Uuid::new_v4(),
            target,
            completed: BTreeMap::new(),
        }
    }

    /// Index the checkpoint belongs to
    pub fn index(&self) -> &str {
        &self.target.index_name
    }

    /// Whether `schema` asks for the same mappings this checkpoint targets
    ///
    /// Versions are ignored: the coordinator assigns them.
    pub fn same_target(&self, schema: &FieldSchema) -> bool {
        self.target.fields == schema.fields
            && self.target.number_of_shards == schema.number_of_shards
    }

    /// Progress saved for `shard`
    pub fn progress(&self, shard: u32) -> ShardProgress {
        self.completed.get(&shard).cloned().unwrap_or_default()
    }

    /// Total documents rewritten across shards
    pub fn rewritten(&self) -> u64 {
        self.completed.values().map(|p| p.rewritten).sum()
    }
}

/// Where reindex checkpoints live
pub trait CheckpointStore: Send + Sync {
    /// Checkpoint of `index`, if one was left behind
    fn load(&self, index: &str) -> Result<Option<ReindexCheckpoint>>;

    /// Replace the checkpoint of its index
    fn save(&self, checkpoint: &ReindexCheckpoint) -> Result<()>;

    /// Forget the checkpoint of `index`
    fn clear(&self, index: &str) -> Result<()>;
}

/// Checkpoints kept in memory, lost on restart
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: DashMap<String, ReindexCheckpoint>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, index: &str) -> Result<Option<ReindexCheckpoint>> {
        Ok(self.checkpoints.get(index).map(|c| c.value().clone()))
    }

    fn save(&self, checkpoint: &ReindexCheckpoint) -> Result<()> {
        self.checkpoints
            .insert(checkpoint.index().to_string(), checkpoint.clone());
        Ok(())
    }

    fn clear(&self, index: &str) -> Result<()> {
        self.checkpoints.remove(index);
        Ok(())
    }
}

/// Checkpoints persisted as one file per index
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(FileCheckpointStore { dir })
    }

    fn path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", index, CHECKPOINT_EXTENSION))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, index: &str) -> Result<Option<ReindexCheckpoint>> {
        let path = self.path(index);
        if !path.exists() {
            return Ok(None);
        }
        let buf = std::fs::read(&path)?;
        if buf.len() < 8 {
            return Err(Error::Serialization(format!(
                "checkpoint '{}' too small",
                path.display()
            )));
        }
        if &buf[0..4] != CHECKPOINT_MAGIC {
            return Err(Error::Serialization(format!(
                "bad checkpoint magic in '{}'",
                path.display()
            )));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&buf[4..8]);
        let version = u32::from_le_bytes(version);
        if version != CHECKPOINT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported checkpoint version {}",
                version
            )));
        }
        let checkpoint = rmp_serde::from_slice(&buf[8..])
            .map_err(|e| Error::Serialization(format!("checkpoint decode error: {}", e)))?;
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &ReindexCheckpoint) -> Result<()> {
        let payload = rmp_serde::to_vec(checkpoint)
            .map_err(|e| Error::Serialization(format!("checkpoint encode error: {}", e)))?;

        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(CHECKPOINT_MAGIC);
        buf.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
        buf.extend_from_slice(&payload);

        let path = self.path(checkpoint.index());
        let tmp_path = path.with_extension("reindex.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn clear(&self, index: &str) -> Result<()> {
        let path = self.path(index);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
