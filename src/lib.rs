// src/lib.rs
// Public library surface for the binary and integration tests.

// Aggregation core
pub mod accumulator;
pub mod window;
pub mod space;
pub mod stage;
pub mod node;

// Ingestion and query fan-out
pub mod ingest;
pub mod producer;
pub mod cluster;
pub mod reduce;

// Background tasks, configuration & service surface
pub mod lifecycle;
pub mod config;
pub mod error;
pub mod metrics;
pub mod api;
pub mod runtime;

// ---- Re-exports for stable public API ----
pub use crate::accumulator::{Accumulator, AccumulatorSnapshot};
pub use crate::api::create_router;
pub use crate::cluster::{Broadcast, LocalCluster, NodeReply};
pub use crate::config::Config;
pub use crate::error::{AverageError, IngestError, ReduceError, SpaceError, StageError};
pub use crate::node::{FetchLocalAccumulator, NodeContext, NodeId};
pub use crate::reduce::{GlobalAverage, GlobalReducer, Readout};
pub use crate::runtime::Runtime;
pub use crate::space::{LocalSpace, AVG_KEY};
pub use crate::stage::AggregationStage;
pub use crate::window::SlidingWindow;
