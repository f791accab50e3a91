//! Addressing types for indices, shards and nodes
//!
//! - ShardId: an index name plus the shard number within that index
//! - NodeAddress: where a shard is served from
//! - ShardTarget: a shard together with the node currently hosting it

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one shard of one index
///
/// Ordering is by index name, then shard number. The merge uses this
/// ordering as part of its final deterministic tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    /// Owning index
    pub index: String,
    /// Shard number, `0..number_of_shards`
    pub shard: u32,
}

impl ShardId {
    /// Create a new ShardId
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        ShardId {
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.shard)
    }
}

/// Network location of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host name or IP
    pub server_address: String,
    /// Port serving shard requests
    pub service_port: u16,
}

impl NodeAddress {
    /// Create a new NodeAddress
    pub fn new(server_address: impl Into<String>, service_port: u16) -> Self {
        NodeAddress {
            server_address: server_address.into(),
            service_port,
        }
    }

    /// Address used by single-process deployments
    pub fn local() -> Self {
        NodeAddress::new("localhost", 0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_address, self.service_port)
    }
}

/// A shard and the node it is dispatched to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardTarget {
    /// Shard being addressed
    pub shard: ShardId,
    /// Node hosting the shard
    pub node: NodeAddress,
}

impl ShardTarget {
    /// Create a new ShardTarget
    pub fn new(shard: ShardId, node: NodeAddress) -> Self {
        ShardTarget { shard, node }
    }
}
