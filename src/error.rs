// src/error.rs
//! Error taxonomy for the aggregation core.
//!
//! Nothing here is fatal to the process: every variant describes a degraded
//! outcome the caller is expected to report, retry, or skip.

use thiserror::Error;

/// Raised by accumulator arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AverageError {
    /// An average was requested from an empty accumulator.
    #[error("no data yet: accumulator count is zero")]
    NoDataYet,
    /// An update would leave `total` or `count` outside `i64`. The
    /// accumulator keeps its previous state.
    #[error("accumulator overflow")]
    Overflow,
}

/// The per-node key/value space could not be accessed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    #[error("local space unavailable: {0}")]
    Unavailable(String),
}

/// A batch could not be folded into a node's state. Neither the window nor
/// the accumulator was changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("batch of {events} event(s) would overflow the running total")]
    Overflow { events: usize },
}

/// A value handed to the ingestion interface was not accepted.
///
/// The value is carried back so the caller can decide to retry or drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("ingestion rejected value {value}: queue is full")]
    Rejected { value: i64 },
    #[error("ingestion closed: value {value} not accepted")]
    Closed { value: i64 },
}

impl IngestError {
    /// The value that was not ingested.
    pub fn value(&self) -> i64 {
        match *self {
            IngestError::Rejected { value } | IngestError::Closed { value } => value,
        }
    }
}

/// A global reduce produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("no data yet across {nodes} node(s), {unreachable} unreachable")]
    NoData { nodes: usize, unreachable: usize },
}
