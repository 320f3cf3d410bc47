// src/producer.rs
//! Synthetic event source: uniform random integers in `[0, range)` pushed
//! into one node's ingestion queue until stopped.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::lifecycle::TaskHandle;

#[derive(Clone, Copy, Debug)]
pub struct ProducerCfg {
    /// Exclusive upper bound of generated values.
    pub range: i64,
    /// Pause between submissions; zero means "as fast as the queue allows".
    pub pause: Duration,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ProducerCfg {
    fn default() -> Self {
        Self {
            range: 100,
            pause: Duration::ZERO,
            seed: None,
        }
    }
}

/// Spawn a producer feeding `ingestor`. The producer waits on a full queue
/// rather than dropping values, and exits on stop or once ingestion closes.
pub fn spawn_producer(ingestor: Ingestor, cfg: ProducerCfg) -> TaskHandle {
    TaskHandle::spawn("producer", move |mut shutdown| async move {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let range = cfg.range.max(1);
        let mut sent: u64 = 0;

        loop {
            let value = rng.random_range(0..range);
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                res = ingestor.submit_wait(value) => match res {
                    Ok(()) => sent += 1,
                    Err(IngestError::Closed { .. }) => break,
                    Err(err) => debug!(target: "producer", error = %err, "value dropped"),
                },
            }

            if cfg.pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(cfg.pause) => {}
                }
            }
        }
        debug!(target: "producer", node = ingestor.node(), sent, "producer stopped");
    })
}
