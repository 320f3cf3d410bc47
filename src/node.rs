// src/node.rs
//! Node-scoped aggregation context: the node's local space plus the stage
//! that feeds it. Ingestion and query handling both go through this type, so
//! several nodes can live side by side in one process.

use serde::{Deserialize, Serialize};

use crate::accumulator::AccumulatorSnapshot;
use crate::error::{SpaceError, StageError};
use crate::space::{LocalSpace, AVG_KEY};
use crate::stage::{AggregationStage, ProcessOutcome};

pub type NodeId = usize;

/// Read-only query sent to every node during a global reduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLocalAccumulator {
    pub key: String,
}

impl Default for FetchLocalAccumulator {
    fn default() -> Self {
        Self {
            key: AVG_KEY.to_string(),
        }
    }
}

/// Local view of one node, as served by `GET /nodes/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub node: NodeId,
    pub total: i64,
    pub count: i64,
    pub avg: Option<f64>,
    pub window_len: usize,
    pub window_capacity: usize,
}

#[derive(Debug)]
pub struct NodeContext {
    id: NodeId,
    space: LocalSpace,
    stage: AggregationStage,
}

impl NodeContext {
    pub fn new(id: NodeId, window_capacity: usize) -> Self {
        Self {
            id,
            space: LocalSpace::new(),
            stage: AggregationStage::new(window_capacity),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn space(&self) -> &LocalSpace {
        &self.space
    }

    pub fn stage(&self) -> &AggregationStage {
        &self.stage
    }

    /// Fold a batch of events into this node's running state.
    pub fn process(&self, events: &[i64]) -> Result<ProcessOutcome, StageError> {
        self.stage.process(&self.space, events)
    }

    /// Answer a reduce query with a copy of the requested accumulator, or
    /// `None` when this node has not stored one yet.
    pub fn fetch(
        &self,
        query: &FetchLocalAccumulator,
    ) -> Result<Option<AccumulatorSnapshot>, SpaceError> {
        Ok(self.space.get(&query.key)?.map(|acc| acc.snapshot()))
    }

    pub fn status(&self) -> Result<NodeStatus, SpaceError> {
        let snap = self
            .fetch(&FetchLocalAccumulator::default())?
            .unwrap_or_default();
        Ok(NodeStatus {
            node: self.id,
            total: snap.total,
            count: snap.count,
            avg: snap.average().ok(),
            window_len: self.stage.window().len(),
            window_capacity: self.stage.window().capacity(),
        })
    }
}
