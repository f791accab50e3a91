//! Per-shard result streams
//!
//! A shard executor answers a query with its local hit count and a
//! `ShardResultStream`: a bounded channel of `ScoredDoc`s already ordered by
//! the query's `SortSpec`. The stream ends explicitly when the producer
//! drops its sender; the merge never infers end-of-stream from silence.

use crate::doc::ScoredDoc;
use crate::{Error, Result};
use tokio::sync::mpsc;

/// Default channel capacity used by `ShardResultStream::from_docs`
const MIN_CAPACITY: usize = 1;

/// Producer half of a shard stream
#[derive(Debug, Clone)]
pub struct ShardStreamSender {
    tx: mpsc::Sender<Result<ScoredDoc>>,
}

impl ShardStreamSender {
    /// Send the next document, waiting for buffer space
    ///
    /// Returns `false` once the consumer has gone away (page filled or query
    /// cancelled); producers should stop at that point.
    pub async fn send(&self, doc: ScoredDoc) -> bool {
        self.tx.send(Ok(doc)).await.is_ok()
    }

    /// Abort the stream with an error
    pub async fn fail(&self, error: Error) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Whether the consumer dropped the stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half: a lazily produced, locally ordered document sequence
#[derive(Debug)]
pub struct ShardResultStream {
    rx: mpsc::Receiver<Result<ScoredDoc>>,
}

impl ShardResultStream {
    /// Create a bounded stream; memory per shard is capped at `capacity` docs
    pub fn channel(capacity: usize) -> (ShardStreamSender, ShardResultStream) {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_CAPACITY));
        (ShardStreamSender { tx }, ShardResultStream { rx })
    }

    /// A stream over already materialized, already ordered documents
    pub fn from_docs(docs: Vec<ScoredDoc>) -> Self {
        let (tx, rx) = mpsc::channel(docs.len().max(MIN_CAPACITY));
        for doc in docs {
            // Capacity equals the document count, so this cannot fill up
            let _ = tx.try_send(Ok(doc));
        }
        ShardResultStream { rx }
    }

    /// A stream that ends immediately
    pub fn empty() -> Self {
        ShardResultStream::from_docs(Vec::new())
    }

    /// Next document; `None` is the explicit end-of-stream signal
    pub async fn next(&mut self) -> Option<Result<ScoredDoc>> {
        self.rx.recv().await
    }
}

/// A shard's answer to a query
#[derive(Debug)]
pub struct ShardResponse {
    /// Number of local documents matching the query (not just those streamed)
    pub hit_count: u64,
    /// Locally ordered top documents
    pub stream: ShardResultStream,
}

impl ShardResponse {
    /// Create a new ShardResponse
    pub fn new(hit_count: u64, stream: ShardResultStream) -> Self {
        ShardResponse { hit_count, stream }
    }
}
