//! Cross-shard k-way merge
//!
//! The `MergeCoordinator` fans a query out to every shard of every target
//! index (one tokio task per shard), then merges the locally ordered
//! `ShardResultStream`s through a frontier holding exactly one head per live
//! stream. The frontier is request-scoped: nothing is shared across queries.
//!
//! A document is emitted only once every live stream has offered a head, so
//! the page depends on data and `SortSpec` alone, never on which shard
//! answered first.
//!
//! # Failure handling
//!
//! A shard that errors, times out, or streams malformed documents (wrong key
//! count, wrong schema version, out of local order) is failed. Under
//! `FailurePolicy::FailFast` the query returns `PartialShardFailure`; under
//! `FailurePolicy::Degrade` the merge continues without it and the result is
//! flagged partial. The caller's deadline aborts everything with
//! `DeadlineExceeded` regardless of policy.
//!
//! `total_hits` sums the hit counts of every shard that answered, so it never
//! falls below the number of documents a degraded page kept from a shard whose
//! stream broke.

use crate::config::{EngineConfig, FailurePolicy};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    Error, MergeResult, NodeRegistry, Query, Result, ScoredDoc, ShardDiagnostics, ShardExecutor,
    ShardFailure, ShardResultStream, ShardStatus, ShardTarget, SortSpec,
};
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Frontier entry: the current head of one shard stream
struct Head {
    doc: ScoredDoc,
    slot: usize,
}

// Reversed so the max-heap pops the globally smallest document
impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other.doc.merge_cmp(&self.doc)
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// Merge-side state of one dispatched shard
struct ShardCursor {
    target: ShardTarget,
    stream: Option<ShardResultStream>,
    last: Option<ScoredDoc>,
    /// Returned a response in phase one, whatever happened to its stream later
    answered: bool,
    diag: ShardDiagnostics,
}

impl ShardCursor {
    fn new(target: ShardTarget) -> Self {
        let diag = ShardDiagnostics {
            shard: target.shard.clone(),
            node: target.node.to_string(),
            hit_count: 0,
            docs_consumed: 0,
            response_time: Duration::ZERO,
            status: ShardStatus::Failed("shard task aborted".to_string()),
        };
        ShardCursor {
            target,
            stream: None,
            last: None,
            answered: false,
            diag,
        }
    }

    fn failure(&self) -> Option<ShardFailure> {
        let reason = match &self.diag.status {
            ShardStatus::Ok => return None,
            ShardStatus::Failed(reason) => reason.clone(),
            ShardStatus::TimedOut => "timed out".to_string(),
        };
        Some(ShardFailure {
            shard: self.diag.shard.clone(),
            reason,
        })
    }

    /// Reject documents a well-behaved shard could not have produced
    fn check(&self, doc: &ScoredDoc, spec: &SortSpec) -> std::result::Result<(), String> {
        let shard = &self.target.shard;
        if doc.source_index != shard.index || doc.source_shard != shard.shard {
            return Err(format!(
                "document '{}' claims to come from {}/{}",
                doc.unique_id, doc.source_index, doc.source_shard
            ));
        }
        if doc.sort_keys.len() != spec.len() {
            return Err(format!(
                "document '{}' has {} sort keys, expected {}",
                doc.unique_id,
                doc.sort_keys.len(),
                spec.len()
            ));
        }
        if let Some(expected) = spec.schema_version(&doc.source_index) {
            if doc.schema_version != expected {
                return Err(format!(
                    "document '{}' was keyed under schema version {}, query resolved version {}",
                    doc.unique_id, doc.schema_version, expected
                ));
            }
        }
        if let Some(last) = &self.last {
            if last.merge_cmp(doc) == Ordering::Greater {
                return Err(format!(
                    "document '{}' arrived out of local order",
                    doc.unique_id
                ));
            }
        }
        Ok(())
    }
}

/// Fans queries out to shards and merges their ordered streams
pub struct MergeCoordinator {
    executor: Arc<dyn ShardExecutor>,
    nodes: Arc<dyn NodeRegistry>,
    shard_timeout: Duration,
    policy: FailurePolicy,
}

impl MergeCoordinator {
    /// Create a coordinator; fails if `config` is invalid
    pub fn new(
        executor: Arc<dyn ShardExecutor>,
        nodes: Arc<dyn NodeRegistry>,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(MergeCoordinator {
            executor,
            nodes,
            shard_timeout: config.shard_timeout(),
            policy: config.failure_policy()?,
        })
    }

    /// Failure policy in effect
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `query` over every shard of `indices` and merge the top `amount`
    ///
    /// `spec` must have been resolved against the same indices. `timeout` is
    /// the caller's deadline for the whole query.
    pub async fn execute(
        &self,
        indices: &[String],
        query: &Query,
        spec: &SortSpec,
        amount: usize,
        timeout: Duration,
    ) -> Result<MergeResult> {
        let mut targets = Vec::new();
        for index in indices {
            targets.extend(self.nodes.list_shard_locations(index)?);
        }
        self.execute_on(targets, query, spec, amount, timeout).await
    }

    /// Like `execute`, against an explicit shard list
    pub async fn execute_on(
        &self,
        targets: Vec<ShardTarget>,
        query: &Query,
        spec: &SortSpec,
        amount: usize,
        timeout: Duration,
    ) -> Result<MergeResult> {
        let started = Instant::now();
        let deadline = started + timeout;
        let timeout_ms = timeout.as_millis() as u64;

        debug!(
            target: "tessera::merge",
            shards = targets.len(),
            amount,
            sort_fields = spec.len(),
            "Dispatching query"
        );

        let mut cursors: Vec<ShardCursor> = targets.into_iter().map(ShardCursor::new).collect();
        if !self.dispatch(&mut cursors, query, spec, amount, deadline).await {
            warn!(target: "tessera::merge", timeout_ms, "Deadline exceeded waiting for shards");
            return Err(Error::DeadlineExceeded { timeout_ms });
        }
        self.enforce_policy(&cursors)?;

        let mut documents = Vec::with_capacity(amount.min(1024));
        if amount > 0 {
            let mut frontier = BinaryHeap::with_capacity(cursors.len());
            for slot in 0..cursors.len() {
                self.advance(&mut cursors, slot, spec, deadline, timeout_ms, &mut frontier)
                    .await?;
            }
            while documents.len() < amount {
                let Some(head) = frontier.pop() else { break };
                let slot = head.slot;
                documents.push(head.doc);
                if documents.len() < amount {
                    self.advance(&mut cursors, slot, spec, deadline, timeout_ms, &mut frontier)
                        .await?;
                }
            }
        }

        let partial = cursors.iter().any(|c| !c.diag.is_ok());
        // Shards that broke mid-stream still contributed their first documents
        let total_hits = cursors
            .iter()
            .filter(|c| c.answered)
            .map(|c| c.diag.hit_count)
            .sum();
        let shards: Vec<ShardDiagnostics> = cursors.into_iter().map(|c| c.diag).collect();

        debug!(
            target: "tessera::merge",
            total_hits,
            returned = documents.len(),
            partial,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Merge complete"
        );

        Ok(MergeResult {
            documents,
            total_hits,
            partial,
            shards,
        })
    }

    /// Phase one: one task per shard, collect every answer
    ///
    /// Returns `false` when the deadline elapsed first; outstanding tasks
    /// are aborted.
    async fn dispatch(
        &self,
        cursors: &mut [ShardCursor],
        query: &Query,
        spec: &SortSpec,
        amount: usize,
        deadline: Instant,
    ) -> bool {
        let query = Arc::new(query.clone());
        let spec = Arc::new(spec.clone());
        let mut tasks = JoinSet::new();

        for (slot, cursor) in cursors.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let target = cursor.target.clone();
            let query = Arc::clone(&query);
            let spec = Arc::clone(&spec);
            let shard_timeout = self.shard_timeout;
            tasks.spawn(async move {
                let sent = Instant::now();
                let outcome =
                    timeout(shard_timeout, executor.search(&target, &query, &spec, amount)).await;
                (slot, sent.elapsed(), outcome)
            });
        }

        let collected = timeout_at(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                // A panicked task leaves its cursor in the aborted state
                let Ok((slot, elapsed, outcome)) = joined else {
                    continue;
                };
                let cursor = &mut cursors[slot];
                cursor.diag.response_time = elapsed;
                match outcome {
                    Ok(Ok(response)) => {
                        cursor.diag.hit_count = response.hit_count;
                        cursor.diag.status = ShardStatus::Ok;
                        cursor.answered = true;
                        cursor.stream = Some(response.stream);
                    }
                    Ok(Err(e)) => {
                        warn!(target: "tessera::merge", shard = %cursor.diag.shard, error = %e, "Shard failed");
                        cursor.diag.status = ShardStatus::Failed(e.to_string());
                    }
                    Err(_) => {
                        warn!(target: "tessera::merge", shard = %cursor.diag.shard, "Shard timed out");
                        cursor.diag.status = ShardStatus::TimedOut;
                    }
                }
            }
        })
        .await;

        if collected.is_err() {
            tasks.abort_all();
            return false;
        }
        true
    }

    fn enforce_policy(&self, cursors: &[ShardCursor]) -> Result<()> {
        let failures: Vec<ShardFailure> = cursors.iter().filter_map(ShardCursor::failure).collect();
        if failures.is_empty() {
            return Ok(());
        }
        match self.policy {
            FailurePolicy::FailFast => Err(Error::PartialShardFailure { failures }),
            FailurePolicy::Degrade => {
                warn!(
                    target: "tessera::merge",
                    failed = failures.len(),
                    "Continuing with partial results"
                );
                Ok(())
            }
        }
    }

    /// Pull the next head of `slot` onto the frontier
    ///
    /// Ends the cursor on explicit end of stream. A stream error, stall or
    /// malformed document fails the shard.
    async fn advance(
        &self,
        cursors: &mut [ShardCursor],
        slot: usize,
        spec: &SortSpec,
        deadline: Instant,
        timeout_ms: u64,
        frontier: &mut BinaryHeap<Head>,
    ) -> Result<()> {
        let cursor = &mut cursors[slot];
        let Some(stream) = cursor.stream.as_mut() else {
            return Ok(());
        };

        let wait_until = deadline.min(Instant::now() + self.shard_timeout);
        let next = timeout_at(wait_until, stream.next()).await;
        let status = match next {
            Ok(None) => {
                cursor.stream = None;
                return Ok(());
            }
            Ok(Some(Ok(doc))) => match cursor.check(&doc, spec) {
                Ok(()) => {
                    cursor.diag.docs_consumed += 1;
                    cursor.last = Some(doc.clone());
                    frontier.push(Head { doc, slot });
                    return Ok(());
                }
                Err(reason) => ShardStatus::Failed(reason),
            },
            Ok(Some(Err(e))) => ShardStatus::Failed(e.to_string()),
            Err(_) if Instant::now() >= deadline => {
                warn!(target: "tessera::merge", timeout_ms, "Deadline exceeded while merging");
                return Err(Error::DeadlineExceeded { timeout_ms });
            }
            Err(_) => ShardStatus::TimedOut,
        };

        warn!(
            target: "tessera::merge",
            shard = %cursor.diag.shard,
            status = ?status,
            "Shard stream failed"
        );
        cursor.diag.status = status;
        // Dropping the stream tells the producer to stop
        cursor.stream = None;

        match self.policy {
            FailurePolicy::FailFast => Err(Error::PartialShardFailure {
                failures: cursor.failure().into_iter().collect(),
            }),
            FailurePolicy::Degrade => Ok(()),
        }
    }
}
