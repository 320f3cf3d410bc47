//! # Global Reduce
//! Periodically folds every node's accumulator into one global average.
//!
//! A cycle broadcasts `FetchLocalAccumulator`, merges every present reply
//! into a fresh accumulator, and averages the result. Absent and unreachable
//! nodes contribute nothing; the cycle only fails when no node contributed.
//! The loop runs beside ingestion and only ever reads copies, so it never
//! holds a node lock for longer than one snapshot.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::accumulator::Accumulator;
use crate::cluster::{Broadcast, NodeReply};
use crate::error::ReduceError;
use crate::lifecycle::TaskHandle;
use crate::metrics::{
    ensure_described, GLOBAL_AVERAGE, REDUCE_DURATION_MS, REDUCE_LAST_RUN_TS, REDUCE_NO_DATA,
    REDUCE_RUNS, REDUCE_UNREACHABLE,
};
use crate::node::FetchLocalAccumulator;

/// Result of one successful reduce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalAverage {
    pub avg: f64,
    pub total: i64,
    pub count: i64,
    /// Nodes whose accumulator was merged.
    pub contributing: usize,
    pub unreachable: usize,
}

/// Streaming fold over per-node replies.
#[derive(Debug, Default)]
pub struct AverageReducer {
    acc: Accumulator,
    nodes: usize,
    contributing: usize,
    unreachable: usize,
}

impl AverageReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one reply into the fold. Returns whether more replies are wanted;
    /// this reducer always wants all of them.
    pub fn collect(&mut self, reply: &NodeReply) -> bool {
        self.nodes += 1;
        match reply {
            NodeReply::Value { node, snapshot } => match self.acc.merge_snapshot(*snapshot) {
                Ok(()) => self.contributing += 1,
                Err(err) => warn!(target: "reduce", node, error = %err, "reply not merged"),
            },
            NodeReply::Absent { .. } => {}
            NodeReply::Unreachable { node, reason } => {
                self.unreachable += 1;
                warn!(target: "reduce", node, reason = %reason, "node did not answer");
            }
        }
        true
    }

    pub fn reduce(self) -> Result<GlobalAverage, ReduceError> {
        let snap = self.acc.snapshot();
        let no_data = ReduceError::NoData {
            nodes: self.nodes,
            unreachable: self.unreachable,
        };
        let avg = snap.average().map_err(|_| no_data)?;
        Ok(GlobalAverage {
            avg,
            total: snap.total,
            count: snap.count,
            contributing: self.contributing,
            unreachable: self.unreachable,
        })
    }
}

pub struct GlobalReducer {
    broadcast: Arc<dyn Broadcast>,
    query: FetchLocalAccumulator,
}

impl GlobalReducer {
    pub fn new(broadcast: Arc<dyn Broadcast>) -> Self {
        Self::with_query(broadcast, FetchLocalAccumulator::default())
    }

    pub fn with_query(broadcast: Arc<dyn Broadcast>, query: FetchLocalAccumulator) -> Self {
        Self { broadcast, query }
    }

    pub async fn reduce(&self) -> Result<GlobalAverage, ReduceError> {
        let started = Instant::now();
        let replies = self.broadcast.collect_from_all_nodes(&self.query).await;
        histogram!(REDUCE_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let mut reducer = AverageReducer::new();
        for reply in &replies {
            if !reducer.collect(reply) {
                break;
            }
        }
        counter!(REDUCE_UNREACHABLE).increment(reducer.unreachable as u64);
        reducer.reduce()
    }
}

/// What an operator sees after each cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readout {
    Ok {
        avg: f64,
        ideal_avg: f64,
        total: i64,
        count: i64,
        /// Nodes whose accumulator went into `avg`.
        contributing: usize,
        unreachable: usize,
        at: DateTime<Utc>,
    },
    NoData {
        ideal_avg: f64,
        /// Every node in the fan-out, unreachable ones included.
        nodes: usize,
        unreachable: usize,
        at: DateTime<Utc>,
    },
}

impl Readout {
    pub fn from_result(
        result: &Result<GlobalAverage, ReduceError>,
        ideal_avg: f64,
        at: DateTime<Utc>,
    ) -> Self {
        match result {
            Ok(g) => Readout::Ok {
                avg: g.avg,
                ideal_avg,
                total: g.total,
                count: g.count,
                contributing: g.contributing,
                unreachable: g.unreachable,
                at,
            },
            Err(ReduceError::NoData { nodes, unreachable }) => Readout::NoData {
                ideal_avg,
                nodes: *nodes,
                unreachable: *unreachable,
                at,
            },
        }
    }

    pub fn avg(&self) -> Option<f64> {
        match self {
            Readout::Ok { avg, .. } => Some(*avg),
            Readout::NoData { .. } => None,
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readout::Ok { avg, ideal_avg, .. } => {
                write!(f, "Got query result [avg={avg}, idealAvg={ideal_avg}]")
            }
            Readout::NoData { ideal_avg, .. } => {
                write!(f, "Got query result [no data yet, idealAvg={ideal_avg}]")
            }
        }
    }
}

/// Midpoint of `[0, range)` in the integer sense the operator expects.
pub fn ideal_average(range: i64) -> f64 {
    (range / 2) as f64
}

#[derive(Clone, Copy, Debug)]
pub struct ReduceLoopCfg {
    pub interval: Duration,
    pub ideal_avg: f64,
}

/// Run `reducer` every `cfg.interval`, publishing each readout on `publish`.
/// The first cycle runs one interval after start. Printing is left to
/// whoever holds the receiver.
pub fn spawn_reduce_loop(
    reducer: Arc<GlobalReducer>,
    cfg: ReduceLoopCfg,
    publish: watch::Sender<Option<Readout>>,
) -> TaskHandle {
    ensure_described();

    TaskHandle::spawn("reduce", move |mut shutdown| async move {
        let start = tokio::time::Instant::now() + cfg.interval;
        let mut ticker = tokio::time::interval_at(start, cfg.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let result = reducer.reduce().await;
                    let now = Utc::now();
                    counter!(REDUCE_RUNS).increment(1);
                    gauge!(REDUCE_LAST_RUN_TS).set(now.timestamp() as f64);

                    match &result {
                        Ok(g) => {
                            gauge!(GLOBAL_AVERAGE).set(g.avg);
                            info!(
                                target: "reduce",
                                avg = g.avg,
                                ideal_avg = cfg.ideal_avg,
                                count = g.count,
                                contributing = g.contributing,
                                unreachable = g.unreachable,
                                "reduce cycle"
                            );
                        }
                        Err(err) => {
                            counter!(REDUCE_NO_DATA).increment(1);
                            warn!(target: "reduce", error = %err, "reduce cycle without data");
                        }
                    }

                    let readout = Readout::from_result(&result, cfg.ideal_avg, now);
                    publish.send_replace(Some(readout));
                }
            }
        }
    })
}
