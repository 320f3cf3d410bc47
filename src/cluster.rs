// src/cluster.rs
//! Broadcast/collect over node contexts.
//!
//! `Broadcast` is the seam to a distributed runtime: ship one query to every
//! node and hand back what each answered, in arrival order. `LocalCluster`
//! is the in-process implementation used by the binary and the tests; every
//! node is queried on the blocking pool under a per-node deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::debug;

use crate::accumulator::AccumulatorSnapshot;
use crate::node::{FetchLocalAccumulator, NodeContext, NodeId};

/// One node's answer to a `FetchLocalAccumulator` query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum NodeReply {
    Value {
        node: NodeId,
        snapshot: AccumulatorSnapshot,
    },
    /// The node answered but holds nothing under the key yet.
    Absent { node: NodeId },
    /// No answer this cycle (timeout, partition, local failure).
    Unreachable { node: NodeId, reason: String },
}

impl NodeReply {
    pub fn node(&self) -> NodeId {
        match self {
            NodeReply::Value { node, .. }
            | NodeReply::Absent { node }
            | NodeReply::Unreachable { node, .. } => *node,
        }
    }
}

#[async_trait::async_trait]
pub trait Broadcast: Send + Sync {
    /// Send `query` to every known node and collect one reply per node.
    async fn collect_from_all_nodes(&self, query: &FetchLocalAccumulator) -> Vec<NodeReply>;

    fn node_count(&self) -> usize;
}

#[derive(Debug)]
struct Member {
    ctx: Arc<NodeContext>,
    reachable: AtomicBool,
}

/// A set of node contexts living in this process.
#[derive(Debug)]
pub struct LocalCluster {
    members: Vec<Member>,
    timeout: Duration,
}

impl LocalCluster {
    /// Build `nodes` fresh contexts with ids `0..nodes`.
    pub fn new(nodes: usize, window_capacity: usize, timeout: Duration) -> Self {
        let ctxs = (0..nodes)
            .map(|id| Arc::new(NodeContext::new(id, window_capacity)))
            .collect();
        Self::from_nodes(ctxs, timeout)
    }

    pub fn from_nodes(nodes: Vec<Arc<NodeContext>>, timeout: Duration) -> Self {
        let members = nodes
            .into_iter()
            .map(|ctx| Member {
                ctx,
                reachable: AtomicBool::new(true),
            })
            .collect();
        Self { members, timeout }
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<NodeContext>> {
        self.members.iter().find(|m| m.ctx.id() == id).map(|m| &m.ctx)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<NodeContext>> {
        self.members.iter().map(|m| &m.ctx)
    }

    /// Simulate a partition: an unreachable node is skipped by the fan-out.
    pub fn set_reachable(&self, id: NodeId, reachable: bool) -> bool {
        match self.members.iter().find(|m| m.ctx.id() == id) {
            Some(m) => {
                m.reachable.store(reachable, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl Broadcast for LocalCluster {
    async fn collect_from_all_nodes(&self, query: &FetchLocalAccumulator) -> Vec<NodeReply> {
        let mut replies = Vec::with_capacity(self.members.len());
        let mut set = JoinSet::new();

        for m in &self.members {
            let node = m.ctx.id();
            if !m.reachable.load(Ordering::SeqCst) {
                replies.push(NodeReply::Unreachable {
                    node,
                    reason: "partitioned".to_string(),
                });
                continue;
            }

            let ctx = Arc::clone(&m.ctx);
            let query = query.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let call = tokio::task::spawn_blocking(move || ctx.fetch(&query));
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(Ok(Some(snapshot)))) => NodeReply::Value { node, snapshot },
                    Ok(Ok(Ok(None))) => NodeReply::Absent { node },
                    Ok(Ok(Err(err))) => NodeReply::Unreachable {
                        node,
                        reason: err.to_string(),
                    },
                    Ok(Err(join_err)) => NodeReply::Unreachable {
                        node,
                        reason: join_err.to_string(),
                    },
                    Err(_) => NodeReply::Unreachable {
                        node,
                        reason: format!("no answer within {}ms", timeout.as_millis()),
                    },
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(reply) => replies.push(reply),
                Err(err) => debug!(target: "reduce", error = %err, "query task lost"),
            }
        }
        replies
    }

    fn node_count(&self) -> usize {
        self.members.len()
    }
}
