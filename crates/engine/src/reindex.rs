//! Online reindexing
//!
//! Moves an index to a new schema while queries keep running:
//!
//! ```text
//! Planning ──▶ Rewriting ──▶ Swapped ──▶ Done
//!                  │
//!                  ▼
//!               Failed   (resumable from the last checkpoint)
//! ```
//!
//! Rewriting stages sort-key material for the new version next to the old
//! one, so queries resolved against the old snapshot stay correct until the
//! registry pointer flips. Old material is reclaimed only after the swap.
//! Swapped and Done are never rolled back; undoing a bad schema takes a
//! second, corrective reindex.

use crate::checkpoint::{CheckpointStore, ReindexCheckpoint, ShardProgress};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tessera_core::{
    Error, FieldSchema, NodeRegistry, ReindexTarget, Result, SchemaDiff, SchemaRegistry,
    ShardTarget,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of one reindex job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReindexState {
    /// Diffing and validating the target schema
    Planning,
    /// Staging material for the new version on every shard
    Rewriting,
    /// Registry points at the new version
    Swapped,
    /// Old material reclaimed
    Done,
    /// Rewriting failed; a retry resumes from the checkpoint
    Failed,
}

impl ReindexState {
    /// Whether a job in this state blocks another reindex of the same index
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ReindexState::Planning | ReindexState::Rewriting | ReindexState::Swapped
        )
    }
}

impl fmt::Display for ReindexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReindexState::Planning => "planning",
            ReindexState::Rewriting => "rewriting",
            ReindexState::Swapped => "swapped",
            ReindexState::Done => "done",
            ReindexState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Status of the latest reindex job of an index
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexReport {
    /// Job id; a resumed job keeps the id of the run that failed
    pub job_id: Uuid,
    /// Index being reindexed
    pub index: String,
    /// Current state
    pub state: ReindexState,
    /// Version serving queries when the job started
    pub from_version: u64,
    /// Version installed by the swap
    pub to_version: u64,
    /// Sort-relevant changes between the two versions
    pub diff: SchemaDiff,
    /// Documents rewritten (as of the last checkpoint while running)
    pub rewritten: u64,
    /// Whether this run resumed a failed one
    pub resumed: bool,
}

/// Marks an unfinished job as failed if its future is dropped mid-flight
struct JobGuard<'a> {
    jobs: &'a DashMap<String, ReindexReport>,
    index: String,
    finished: bool,
}

impl JobGuard<'_> {
    fn update(&self, f: impl FnOnce(&mut ReindexReport)) {
        if let Some(mut report) = self.jobs.get_mut(&self.index) {
            f(report.value_mut());
        }
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.update(|report| match report.state {
            ReindexState::Planning | ReindexState::Rewriting => {
                report.state = ReindexState::Failed;
            }
            // The swap is committed; only the reclaim was cut short
            ReindexState::Swapped => {
                warn!(
                    target: "tessera::reindex",
                    index = %report.index,
                    "Reindex dropped after the swap, old material left in place"
                );
                report.state = ReindexState::Done;
            }
            ReindexState::Done | ReindexState::Failed => {}
        });
    }
}

/// Drives reindex jobs; at most one active job per index
pub struct ReindexCoordinator {
    schemas: Arc<dyn SchemaRegistry>,
    nodes: Arc<dyn NodeRegistry>,
    target: Arc<dyn ReindexTarget>,
    checkpoints: Arc<dyn CheckpointStore>,
    checkpoint_interval: u64,
    jobs: DashMap<String, ReindexReport>,
}

impl ReindexCoordinator {
    /// Create a coordinator
    pub fn new(
        schemas: Arc<dyn SchemaRegistry>,
        nodes: Arc<dyn NodeRegistry>,
        target: Arc<dyn ReindexTarget>,
        checkpoints: Arc<dyn CheckpointStore>,
        checkpoint_interval: usize,
    ) -> Self {
        ReindexCoordinator {
            schemas,
            nodes,
            target,
            checkpoints,
            checkpoint_interval: checkpoint_interval.max(1) as u64,
            jobs: DashMap::new(),
        }
    }

    /// Latest job report of `index`
    pub fn status(&self, index: &str) -> Option<ReindexReport> {
        self.jobs.get(index).map(|r| r.value().clone())
    }

    /// Whether `index` has a job in flight
    pub fn is_active(&self, index: &str) -> bool {
        self.jobs
            .get(index)
            .map(|r| r.state.is_active())
            .unwrap_or(false)
    }

    /// Move `index` to `new_schema`
    ///
    /// The new version number is assigned here (current + 1); the version
    /// carried by `new_schema` is ignored.
    ///
    /// # Errors
    ///
    /// - `SchemaConflict` if another reindex of the index is in flight
    /// - `InvalidSchema` / `IndexNotFound` from planning, before any rewrite
    /// - `ReindexFailed` if rewriting failed; calling again with the same
    ///   schema resumes from the last checkpoint
    pub async fn reindex(&self, index: &str, new_schema: FieldSchema) -> Result<ReindexReport> {
        if new_schema.index_name != index {
            return Err(Error::invalid_schema(format!(
                "schema names index '{}', reindex targets '{}'",
                new_schema.index_name, index
            )));
        }

        let previous = self.claim(index)?;
        let mut guard = JobGuard {
            jobs: &self.jobs,
            index: index.to_string(),
            finished: false,
        };

        let (checkpoint, targets) = match self.plan(index, new_schema, &guard) {
            Ok(planned) => planned,
            Err(e) => {
                // Planning changed nothing; forget this attempt
                guard.finished = true;
                match previous {
                    Some(report) => self.jobs.insert(index.to_string(), report),
                    None => self.jobs.remove(index).map(|(_, r)| r),
                };
                return Err(e);
            }
        };

        let result = self.run(index, checkpoint, &targets, &guard).await;
        guard.finished = true;
        result?;
        self.status(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }

    /// Reserve the index for a new job
    fn claim(&self, index: &str) -> Result<Option<ReindexReport>> {
        let placeholder = ReindexReport {
            job_id: Uuid::nil(),
            index: index.to_string(),
            state: ReindexState::Planning,
            from_version: 0,
            to_version: 0,
            diff: SchemaDiff::default(),
            rewritten: 0,
            resumed: false,
        };
        match self.jobs.entry(index.to_string()) {
            Entry::Occupied(entry) if entry.get().state.is_active() => {
                warn!(target: "tessera::reindex", index, "Reindex already in progress");
                Err(Error::SchemaConflict {
                    index: index.to_string(),
                })
            }
            Entry::Occupied(mut entry) => Ok(Some(entry.insert(placeholder))),
            Entry::Vacant(entry) => {
                entry.insert(placeholder);
                Ok(None)
            }
        }
    }

    fn plan(
        &self,
        index: &str,
        new_schema: FieldSchema,
        guard: &JobGuard<'_>,
    ) -> Result<(ReindexCheckpoint, Vec<ShardTarget>)> {
        let current = self.schemas.get_schema(index)?;
        if new_schema.number_of_shards != current.number_of_shards {
            return Err(Error::invalid_schema(format!(
                "reindex of '{}' cannot change the shard count ({} -> {})",
                index, current.number_of_shards, new_schema.number_of_shards
            )));
        }
        let to_version = current.version + 1;
        let new_schema = new_schema.with_version(to_version);
        new_schema.validate()?;
        let diff = SchemaDiff::between(&current, &new_schema);

        let (checkpoint, resumed) = match self.checkpoints.load(index)? {
            Some(checkpoint)
                if checkpoint.same_target(&new_schema)
                    && checkpoint.target.version == to_version =>
            {
                (checkpoint, true)
            }
            Some(_) => {
                info!(target: "tessera::reindex", index, "Discarding checkpoint for a different target schema");
                self.discard_checkpoint(index);
                (ReindexCheckpoint::new(new_schema), false)
            }
            None => (ReindexCheckpoint::new(new_schema), false),
        };
        let targets = self.nodes.list_shard_locations(index)?;

        info!(
            target: "tessera::reindex",
            index,
            job_id = %checkpoint.job_id,
            from_version = current.version,
            to_version,
            added = diff.added_sort_fields.len(),
            removed = diff.removed_sort_fields.len(),
            changed = diff.changed_sort_fields.len(),
            resumed,
            "Reindex planned"
        );

        guard.update(|report| {
            report.job_id = checkpoint.job_id;
            report.from_version = current.version;
            report.to_version = to_version;
            report.diff = diff;
            report.rewritten = checkpoint.rewritten();
            report.resumed = resumed;
        });
        Ok((checkpoint, targets))
    }

    async fn run(
        &self,
        index: &str,
        mut checkpoint: ReindexCheckpoint,
        targets: &[ShardTarget],
        guard: &JobGuard<'_>,
    ) -> Result<()> {
        guard.update(|report| report.state = ReindexState::Rewriting);

        for target in targets {
            if let Err(e) = self.rewrite_shard(target, &mut checkpoint, guard).await {
                let rewritten = checkpoint.rewritten();
                guard.update(|report| report.state = ReindexState::Failed);
                warn!(
                    target: "tessera::reindex",
                    index,
                    shard = %target.shard,
                    rewritten,
                    error = %e,
                    "Reindex failed"
                );
                return Err(Error::ReindexFailed {
                    index: index.to_string(),
                    rewritten,
                    reason: e.to_string(),
                });
            }
        }

        let to_version = checkpoint.target.version;
        if let Err(e) = self.schemas.set_schema(checkpoint.target.clone()) {
            guard.update(|report| report.state = ReindexState::Failed);
            return Err(e);
        }
        guard.update(|report| report.state = ReindexState::Swapped);
        info!(target: "tessera::reindex", index, version = to_version, "Schema swapped");
        self.discard_checkpoint(index);

        for target in targets {
            if let Err(e) = self.target.reclaim(target, to_version).await {
                warn!(
                    target: "tessera::reindex",
                    shard = %target.shard,
                    error = %e,
                    "Failed to reclaim old sort material"
                );
            }
        }
        guard.update(|report| report.state = ReindexState::Done);
        info!(target: "tessera::reindex", index, version = to_version, "Reindex done");
        Ok(())
    }

    /// Forget the checkpoint of `index`
    ///
    /// A leftover checkpoint is harmless: it no longer matches the next
    /// target version and is replaced by that job's first save.
    fn discard_checkpoint(&self, index: &str) {
        if let Err(e) = self.checkpoints.clear(index) {
            warn!(
                target: "tessera::reindex",
                index,
                error = %e,
                "Failed to clear reindex checkpoint"
            );
        }
    }

    /// Stage material for every document of one shard, checkpointing as it goes
    ///
    /// Documents are visited in ascending id order and progress is saved as
    /// the last id done. On failure the checkpoint keeps the last saved
    /// progress; documents rewritten after it are repeated on resume.
    async fn rewrite_shard(
        &self,
        target: &ShardTarget,
        checkpoint: &mut ReindexCheckpoint,
        guard: &JobGuard<'_>,
    ) -> Result<()> {
        let shard = target.shard.shard;
        let mut ids = self.target.document_ids(target).await?;
        ids.sort_unstable();
        let mut progress = checkpoint.progress(shard);
        let start = progress.resume_at(&ids);
        if start >= ids.len() {
            return Ok(());
        }

        debug!(
            target: "tessera::reindex",
            shard = %target.shard,
            documents = ids.len(),
            skip = start,
            "Rewriting shard"
        );

        for id in &ids[start..] {
            self.target
                .rewrite_document(target, id, &checkpoint.target)
                .await?;
            progress.advance(id);
            if progress.rewritten % self.checkpoint_interval == 0 {
                self.save_progress(checkpoint, shard, &progress, guard)?;
            }
        }
        self.save_progress(checkpoint, shard, &progress, guard)
    }

    fn save_progress(
        &self,
        checkpoint: &mut ReindexCheckpoint,
        shard: u32,
        progress: &ShardProgress,
        guard: &JobGuard<'_>,
    ) -> Result<()> {
        checkpoint.completed.insert(shard, progress.clone());
        self.checkpoints.save(checkpoint)?;
        let rewritten = checkpoint.rewritten();
        guard.update(|report| report.rewritten = rewritten);
        Ok(())
    }
}
