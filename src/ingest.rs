// src/ingest.rs
//! Ingestion path for one node: a bounded queue in front of the aggregation
//! stage, drained in batches by a single worker task.
//!
//! `submit` never blocks; a full queue is reported as `IngestError::Rejected`
//! and the caller picks retry or drop. `submit_wait` is the backpressure
//! variant for producers that would rather wait.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::lifecycle::TaskHandle;
use crate::metrics::{
    ensure_described, EVENTS_EVICTED, EVENTS_PROCESSED, EVENTS_REJECTED, EVENTS_SUBMITTED,
    STAGE_FAILURES,
};
use crate::node::{NodeContext, NodeId};

#[derive(Clone, Copy, Debug)]
pub struct IngestCfg {
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_size: 64,
        }
    }
}

/// Cloneable submission handle for one node.
#[derive(Clone, Debug)]
pub struct Ingestor {
    node: NodeId,
    tx: mpsc::Sender<i64>,
}

impl Ingestor {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn submit(&self, value: i64) -> Result<(), IngestError> {
        match self.tx.try_send(value) {
            Ok(()) => {
                counter!(EVENTS_SUBMITTED, "node" => self.node.to_string()).increment(1);
                Ok(())
            }
            Err(TrySendError::Full(value)) => Err(self.rejected(IngestError::Rejected { value })),
            Err(TrySendError::Closed(value)) => Err(self.rejected(IngestError::Closed { value })),
        }
    }

    /// Waits for queue space instead of rejecting. Fails only once ingestion
    /// has stopped.
    pub async fn submit_wait(&self, value: i64) -> Result<(), IngestError> {
        match self.tx.send(value).await {
            Ok(()) => {
                counter!(EVENTS_SUBMITTED, "node" => self.node.to_string()).increment(1);
                Ok(())
            }
            Err(mpsc::error::SendError(value)) => {
                Err(self.rejected(IngestError::Closed { value }))
            }
        }
    }

    fn rejected(&self, err: IngestError) -> IngestError {
        counter!(EVENTS_REJECTED, "node" => self.node.to_string()).increment(1);
        debug!(target: "ingest", node = self.node, error = %err, "submission refused");
        err
    }
}

/// Start the ingestion worker for `ctx`.
///
/// On stop the queue is closed to new submissions and whatever was already
/// accepted is still folded in before the worker returns.
pub fn spawn_ingestion(ctx: Arc<NodeContext>, cfg: IngestCfg) -> (Ingestor, TaskHandle) {
    ensure_described();

    let (tx, mut rx) = mpsc::channel::<i64>(cfg.queue_capacity.max(1));
    let batch_size = cfg.batch_size.max(1);
    let ingestor = Ingestor { node: ctx.id(), tx };

    let handle = TaskHandle::spawn("ingest", move |mut shutdown| async move {
        let mut batch = Vec::with_capacity(batch_size);
        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                v = rx.recv() => match v {
                    Some(v) => v,
                    None => break,
                },
            };
            batch.push(first);
            while batch.len() < batch_size {
                match rx.try_recv() {
                    Ok(v) => batch.push(v),
                    Err(_) => break,
                }
            }
            apply_batch(&ctx, &mut batch);
        }

        rx.close();
        let mut drained = 0usize;
        while let Some(v) = rx.recv().await {
            batch.push(v);
            drained += 1;
            if batch.len() >= batch_size {
                apply_batch(&ctx, &mut batch);
            }
        }
        apply_batch(&ctx, &mut batch);
        debug!(target: "ingest", node = ctx.id(), drained, "ingestion stopped");
    });

    (ingestor, handle)
}

fn apply_batch(ctx: &NodeContext, batch: &mut Vec<i64>) {
    if batch.is_empty() {
        return;
    }
    let node = ctx.id().to_string();
    match ctx.process(batch.as_slice()) {
        Ok(outcome) => {
            counter!(EVENTS_PROCESSED, "node" => node.clone()).increment(outcome.processed as u64);
            counter!(EVENTS_EVICTED, "node" => node).increment(outcome.evicted as u64);
        }
        Err(err) => {
            counter!(STAGE_FAILURES, "node" => node).increment(1);
            warn!(
                target: "ingest",
                node = ctx.id(),
                error = %err,
                dropped = batch.len(),
                "batch not applied"
            );
        }
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::AccumulatorSnapshot;
    use crate::node::FetchLocalAccumulator;

    fn snapshot(ctx: &NodeContext) -> Option<AccumulatorSnapshot> {
        ctx.fetch(&FetchLocalAccumulator::default()).unwrap()
    }

    #[tokio::test]
    async fn accepted_values_are_applied_by_stop() {
        let ctx = Arc::new(NodeContext::new(0, 10));
        let (ingestor, handle) = spawn_ingestion(
            Arc::clone(&ctx),
            IngestCfg {
                queue_capacity: 100,
                batch_size: 4,
            },
        );

        for v in 1..=10 {
            ingestor.submit(v).unwrap();
        }
        handle.stop().await;

        assert_eq!(snapshot(&ctx), Some(AccumulatorSnapshot::new(55, 10)));
    }

    #[tokio::test]
    async fn submit_after_stop_is_closed() {
        let ctx = Arc::new(NodeContext::new(3, 10));
        let (ingestor, handle) = spawn_ingestion(Arc::clone(&ctx), IngestCfg::default());
        handle.stop().await;

        assert_eq!(ingestor.submit(9), Err(IngestError::Closed { value: 9 }));
        assert_eq!(
            ingestor.submit_wait(8).await,
            Err(IngestError::Closed { value: 8 })
        );
        assert_eq!(snapshot(&ctx), None);
    }

    #[tokio::test]
    async fn worker_survives_a_refused_batch() {
        let ctx = Arc::new(NodeContext::new(1, 2));
        let (ingestor, handle) = spawn_ingestion(
            Arc::clone(&ctx),
            IngestCfg {
                queue_capacity: 16,
                batch_size: 1,
            },
        );

        // The second value would overflow the running total and is dropped.
        for v in [i64::MAX, 1, -5] {
            ingestor.submit(v).unwrap();
        }
        handle.stop().await;

        assert_eq!(
            snapshot(&ctx),
            Some(AccumulatorSnapshot::new(i64::MAX - 5, 2))
        );
        assert_eq!(ctx.stage().window().snapshot(), vec![i64::MAX, -5]);
    }
}
