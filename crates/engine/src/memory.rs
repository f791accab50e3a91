//! In-memory shard executor
//!
//! `MemoryCluster` hosts every shard of every index in process memory and
//! implements both collaborator halves the core drives: `ShardExecutor` for
//! queries and `ReindexTarget` for reindexing. It backs the embedded
//! `SearchService` and the test-suites.
//!
//! Each shard keeps its documents plus sort-key material per schema
//! version: for every sort name of that version, the value in sort form
//! (normalized strings, float-quantized numbers). A query reads the material
//! of the version its `SortSpec` was resolved against. Material that was
//! never staged (documents indexed mid-reindex) or already reclaimed is
//! derived from the stored document on the fly.
//!
//! Faults can be injected per shard for failure-path testing.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tessera_core::{
    encode, encode_score, Direction, Error, FieldSchema, FieldType, FieldValue, MissingPlacement,
    Query, ReindexTarget, Result, ScoredDoc, ShardExecutor, ShardId, ShardResponse,
    ShardResultStream, ShardTarget, SortBinding, SortKeys, SortSpec,
};
use tokio::sync::watch;
use tracing::debug;

/// A stored document: field name → value
pub type Document = BTreeMap<String, FieldValue>;

/// Sort name → sort-form value, for one document at one schema version
type Material = HashMap<String, FieldValue>;

const DEFAULT_STREAM_BUFFER: usize = 64;

/// Injected misbehaviour of one shard
#[derive(Debug, Clone, PartialEq)]
pub enum ShardFault {
    /// Every query fails immediately
    Unavailable,
    /// Queries answer after a delay
    Delay(Duration),
    /// The stream errors after this many documents
    BreakStreamAfter(usize),
}

#[derive(Debug, Default)]
struct ShardData {
    docs: BTreeMap<String, Document>,
    /// Schema version → document id → material
    material: BTreeMap<u64, HashMap<String, Material>>,
}

/// Every shard of every index, in memory
#[derive(Debug)]
pub struct MemoryCluster {
    shards: RwLock<HashMap<ShardId, ShardData>>,
    faults: DashMap<ShardId, ShardFault>,
    /// Rewrites allowed before they start failing; negative is unlimited
    rewrite_budget: AtomicI64,
    rewrites: AtomicU64,
    /// `true` parks every rewrite until released
    rewrites_held: watch::Sender<bool>,
    stream_buffer: usize,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        MemoryCluster::new(DEFAULT_STREAM_BUFFER)
    }
}

impl MemoryCluster {
    /// Create an empty cluster whose result streams buffer `stream_buffer` docs
    pub fn new(stream_buffer: usize) -> Self {
        MemoryCluster {
            shards: RwLock::new(HashMap::new()),
            faults: DashMap::new(),
            rewrite_budget: AtomicI64::new(-1),
            rewrites: AtomicU64::new(0),
            rewrites_held: watch::channel(false).0,
            stream_buffer: stream_buffer.max(1),
        }
    }

    /// Open empty shards for every shard of `schema`'s index
    pub fn open_index(&self, schema: &FieldSchema) {
        let mut shards = self.shards.write();
        for shard in 0..schema.number_of_shards {
            shards
                .entry(ShardId::new(schema.index_name.as_str(), shard))
                .or_default();
        }
    }

    /// Drop every shard of `index`
    pub fn drop_index(&self, index: &str) {
        self.shards.write().retain(|id, _| id.index != index);
    }

    /// Store (or replace) a document under the current schema
    ///
    /// Values of declared fields must match their declared type.
    pub fn index_document(&self, schema: &FieldSchema, id: &str, doc: Document) -> Result<ShardId> {
        for (name, value) in &doc {
            if let Some(config) = schema.fields.get(name) {
                encode(
                    Some(value),
                    config.stored_type,
                    Direction::Asc,
                    MissingPlacement::First,
                )?;
            }
        }

        let shard = ShardId::new(
            schema.index_name.as_str(),
            route(id, schema.number_of_shards),
        );
        let material = material_for(&doc, schema);

        let mut shards = self.shards.write();
        let data = shards
            .get_mut(&shard)
            .ok_or_else(|| Error::shard(format!("shard {} is not open", shard)))?;
        for versions in data.material.values_mut() {
            versions.remove(id);
        }
        data.material
            .entry(schema.version)
            .or_default()
            .insert(id.to_string(), material);
        data.docs.insert(id.to_string(), doc);
        Ok(shard)
    }

    /// Remove a document; returns whether it existed
    pub fn delete_document(&self, index: &str, id: &str) -> bool {
        let mut shards = self.shards.write();
        let mut found = false;
        for (shard, data) in shards.iter_mut() {
            if shard.index != index {
                continue;
            }
            if data.docs.remove(id).is_some() {
                found = true;
                for versions in data.material.values_mut() {
                    versions.remove(id);
                }
            }
        }
        found
    }

    /// Documents stored for `index` across its shards
    pub fn document_count(&self, index: &str) -> usize {
        self.shards
            .read()
            .iter()
            .filter(|(shard, _)| shard.index == index)
            .map(|(_, data)| data.docs.len())
            .sum()
    }

    /// Schema versions with staged material on `shard`
    pub fn material_versions(&self, shard: &ShardId) -> Vec<u64> {
        self.shards
            .read()
            .get(shard)
            .map(|data| data.material.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Make `shard` misbehave
    pub fn inject_fault(&self, shard: ShardId, fault: ShardFault) {
        self.faults.insert(shard, fault);
    }

    /// Heal `shard`
    pub fn clear_fault(&self, shard: &ShardId) {
        self.faults.remove(shard);
    }

    /// Fail every rewrite after the next `n`
    pub fn fail_rewrites_after(&self, n: u64) {
        self.rewrite_budget
            .store(i64::try_from(n).unwrap_or(i64::MAX), Ordering::SeqCst);
    }

    /// Stop failing rewrites
    pub fn allow_rewrites(&self) {
        self.rewrite_budget.store(-1, Ordering::SeqCst);
    }

    /// Park rewrites until `release_rewrites`; a reindex stays in Rewriting
    pub fn hold_rewrites(&self) {
        self.rewrites_held.send_replace(true);
    }

    /// Let parked rewrites continue
    pub fn release_rewrites(&self) {
        self.rewrites_held.send_replace(false);
    }

    /// Successful document rewrites so far
    pub fn rewrite_count(&self) -> u64 {
        self.rewrites.load(Ordering::SeqCst)
    }

    fn take_rewrite_permit(&self) -> bool {
        self.rewrite_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                b if b < 0 => Some(b),
                0 => None,
                b => Some(b - 1),
            })
            .is_ok()
    }
}

/// Stable shard routing by document id
fn route(id: &str, number_of_shards: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % u64::from(number_of_shards.max(1))) as u32
}

/// Sort form of one binding's source value
fn sort_form(doc: &Document, binding: &SortBinding) -> Option<FieldValue> {
    let raw = doc.get(&binding.source_field)?;
    let value = match (raw, binding.stored_type) {
        (FieldValue::String(s), _) => FieldValue::String(binding.handling.apply(s)),
        (FieldValue::Double(v), FieldType::NumericFloat) => FieldValue::Float(*v as f32),
        (FieldValue::Int(v), FieldType::NumericFloat) => FieldValue::Float(*v as f32),
        (FieldValue::Long(v), FieldType::NumericFloat) => FieldValue::Float(*v as f32),
        (FieldValue::Long(v), FieldType::NumericInt) => {
            i32::try_from(*v).map_or_else(|_| raw.clone(), FieldValue::Int)
        }
        _ => raw.clone(),
    };
    Some(value)
}

fn material_for(doc: &Document, schema: &FieldSchema) -> Material {
    schema
        .sort_bindings()
        .into_iter()
        .filter_map(|binding| sort_form(doc, &binding).map(|v| (binding.sort_field_name, v)))
        .collect()
}

/// Relevance of `doc` for `query`; `None` when it does not match
fn score(query: &Query, doc: &Document) -> Option<f64> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::AnyTerm { field, terms } => {
            let text = doc.get(field)?.as_str()?.to_lowercase();
            let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
            let matched = text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|token| !token.is_empty() && terms.iter().any(|t| t == token))
                .count();
            (matched > 0).then_some(matched as f64)
        }
    }
}

fn sort_keys(
    spec: &SortSpec,
    index: &str,
    doc: &Document,
    material: Option<&Material>,
    score: f64,
) -> Result<SortKeys> {
    spec.fields()
        .iter()
        .map(|field| {
            if field.is_score() {
                return Ok(encode_score(score, field.direction));
            }
            let value = match field.binding(index) {
                None => None,
                Some(binding) => match material {
                    Some(material) => material.get(&binding.sort_field_name).cloned(),
                    None => sort_form(doc, binding),
                },
            };
            encode(
                value.as_ref(),
                field.effective_type,
                field.direction,
                field.missing,
            )
        })
        .collect()
}

#[async_trait]
impl ShardExecutor for MemoryCluster {
    async fn search(
        &self,
        target: &ShardTarget,
        query: &Query,
        spec: &SortSpec,
        amount: usize,
    ) -> Result<ShardResponse> {
        let fault = self.faults.get(&target.shard).map(|f| f.value().clone());
        match &fault {
            Some(ShardFault::Unavailable) => {
                return Err(Error::shard(format!("{} is unavailable", target.shard)));
            }
            Some(ShardFault::Delay(delay)) => tokio::time::sleep(*delay).await,
            _ => {}
        }

        let index = target.shard.index.as_str();
        let version = spec.schema_version(index).ok_or_else(|| {
            Error::shard(format!("sort was not resolved for index '{}'", index))
        })?;

        let (hit_count, docs) = {
            let shards = self.shards.read();
            let data = shards
                .get(&target.shard)
                .ok_or_else(|| Error::shard(format!("shard {} is not open", target.shard)))?;
            let staged = data.material.get(&version);

            let mut hits = Vec::new();
            for (id, doc) in &data.docs {
                let Some(score) = score(query, doc) else {
                    continue;
                };
                let material = staged.and_then(|m| m.get(id));
                hits.push(ScoredDoc {
                    unique_id: id.clone(),
                    source_index: index.to_string(),
                    source_shard: target.shard.shard,
                    score,
                    sort_keys: sort_keys(spec, index, doc, material, score)?,
                    schema_version: version,
                });
            }
            let hit_count = hits.len() as u64;
            hits.sort_by(|a, b| a.merge_cmp(b));
            hits.truncate(amount);
            (hit_count, hits)
        };

        debug!(
            target: "tessera::merge",
            shard = %target.shard,
            hit_count,
            streamed = docs.len(),
            "Shard answered"
        );

        let break_after = match fault {
            Some(ShardFault::BreakStreamAfter(n)) => Some(n),
            _ => None,
        };
        let shard = target.shard.clone();
        let (tx, stream) = ShardResultStream::channel(self.stream_buffer);
        tokio::spawn(async move {
            for (sent, doc) in docs.into_iter().enumerate() {
                if break_after == Some(sent) {
                    tx.fail(Error::shard(format!("{} stream broke", shard))).await;
                    return;
                }
                if !tx.send(doc).await {
                    return;
                }
            }
        });
        Ok(ShardResponse::new(hit_count, stream))
    }
}

#[async_trait]
impl ReindexTarget for MemoryCluster {
    async fn document_ids(&self, target: &ShardTarget) -> Result<Vec<String>> {
        self.shards
            .read()
            .get(&target.shard)
            .map(|data| data.docs.keys().cloned().collect())
            .ok_or_else(|| Error::shard(format!("shard {} is not open", target.shard)))
    }

    async fn rewrite_document(
        &self,
        target: &ShardTarget,
        doc_id: &str,
        schema: &FieldSchema,
    ) -> Result<()> {
        let mut held = self.rewrites_held.subscribe();
        if held.wait_for(|held| !*held).await.is_err() {
            return Err(Error::shard(format!("{} is shutting down", target.shard)));
        }
        if !self.take_rewrite_permit() {
            return Err(Error::shard(format!(
                "{} rejected rewrite of '{}'",
                target.shard, doc_id
            )));
        }
        let mut shards = self.shards.write();
        let data = shards
            .get_mut(&target.shard)
            .ok_or_else(|| Error::shard(format!("shard {} is not open", target.shard)))?;
        // Deleted since the id list was taken
        let Some(doc) = data.docs.get(doc_id) else {
            return Ok(());
        };
        let material = material_for(doc, schema);
        data.material
            .entry(schema.version)
            .or_default()
            .insert(doc_id.to_string(), material);
        self.rewrites.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reclaim(&self, target: &ShardTarget, keep_version: u64) -> Result<()> {
        if let Some(data) = self.shards.write().get_mut(&target.shard) {
            data.material.retain(|version, _| *version == keep_version);
        }
        Ok(())
    }
}
