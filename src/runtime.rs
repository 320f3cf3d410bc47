// src/runtime.rs
//! Wires a simulated cluster: per-node ingestion (and optionally producers)
//! plus one reduce loop. Must be started from inside a Tokio runtime.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::api::AppState;
use crate::cluster::{Broadcast, LocalCluster};
use crate::config::Config;
use crate::ingest::{spawn_ingestion, Ingestor};
use crate::lifecycle::{stop_all, TaskHandle};
use crate::producer::spawn_producer;
use crate::reduce::{spawn_reduce_loop, GlobalReducer, Readout};

pub struct Runtime {
    cluster: Arc<LocalCluster>,
    ingestors: Arc<Vec<Ingestor>>,
    ingest_tasks: Vec<TaskHandle>,
    producer_tasks: Vec<TaskHandle>,
    reduce_task: TaskHandle,
    readout: watch::Receiver<Option<Readout>>,
}

impl Runtime {
    /// Start every node with its own random producer.
    pub fn start(cfg: &Config) -> Self {
        Self::launch(cfg, true)
    }

    /// Start nodes without producers; events arrive only through `submit`.
    pub fn start_idle(cfg: &Config) -> Self {
        Self::launch(cfg, false)
    }

    fn launch(cfg: &Config, with_producers: bool) -> Self {
        let cluster = Arc::new(LocalCluster::new(
            cfg.nodes,
            cfg.window_capacity,
            cfg.node_timeout(),
        ));

        let mut ingestors = Vec::with_capacity(cfg.nodes);
        let mut ingest_tasks = Vec::with_capacity(cfg.nodes);
        let mut producer_tasks = Vec::new();
        for node in cluster.nodes() {
            let (ingestor, task) = spawn_ingestion(Arc::clone(node), cfg.ingest());
            if with_producers {
                producer_tasks.push(spawn_producer(ingestor.clone(), cfg.producer(node.id())));
            }
            ingestors.push(ingestor);
            ingest_tasks.push(task);
        }

        let broadcast: Arc<dyn Broadcast> = Arc::clone(&cluster) as Arc<dyn Broadcast>;
        let reducer = Arc::new(GlobalReducer::new(broadcast));
        let (tx, readout) = watch::channel(None);
        let reduce_task = spawn_reduce_loop(reducer, cfg.reduce_loop(), tx);

        info!(
            nodes = cfg.nodes,
            window = cfg.window_capacity,
            producers = with_producers,
            "runtime started"
        );

        Self {
            cluster,
            ingestors: Arc::new(ingestors),
            ingest_tasks,
            producer_tasks,
            reduce_task,
            readout,
        }
    }

    pub fn cluster(&self) -> &Arc<LocalCluster> {
        &self.cluster
    }

    pub fn ingestor(&self, node: usize) -> Option<&Ingestor> {
        self.ingestors.iter().find(|i| i.node() == node)
    }

    pub fn readout(&self) -> watch::Receiver<Option<Readout>> {
        self.readout.clone()
    }

    pub fn state(&self) -> AppState {
        AppState {
            cluster: Arc::clone(&self.cluster),
            ingestors: Arc::clone(&self.ingestors),
            readout: self.readout.clone(),
        }
    }

    /// Producers first, then ingestion (accepted values are still applied),
    /// then the reduce loop.
    pub async fn shutdown(self) {
        stop_all(self.producer_tasks).await;
        stop_all(self.ingest_tasks).await;
        self.reduce_task.stop().await;
        info!("runtime stopped");
    }
}
