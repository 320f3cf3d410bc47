//! # Accumulator
//! Thread-safe running `(total, count)` pair.
//!
//! Both fields live behind one mutex so a reader never observes a total from
//! one update paired with a count from another. `merge` snapshots the other
//! accumulator and releases its lock before taking our own, so two callers
//! merging `a <- b` and `b <- a` at the same time cannot deadlock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::AverageError;

/// Plain copy of an accumulator's state. This is what crosses node
/// boundaries; live accumulators never do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    pub total: i64,
    pub count: i64,
}

impl AccumulatorSnapshot {
    pub fn new(total: i64, count: i64) -> Self {
        Self { total, count }
    }

    /// `total / count`, or `NoDataYet` when nothing has been counted.
    pub fn average(&self) -> Result<f64, AverageError> {
        if self.count == 0 {
            return Err(AverageError::NoDataYet);
        }
        Ok(self.total as f64 / self.count as f64)
    }

    /// Both deltas applied, or `Overflow` if either field leaves `i64`.
    pub fn checked_add(self, delta_total: i64, delta_count: i64) -> Result<Self, AverageError> {
        match (
            self.total.checked_add(delta_total),
            self.count.checked_add(delta_count),
        ) {
            (Some(total), Some(count)) => Ok(Self { total, count }),
            _ => Err(AverageError::Overflow),
        }
    }
}

#[derive(Debug, Default)]
pub struct Accumulator {
    inner: Mutex<AccumulatorSnapshot>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: AccumulatorSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    // Every update completes under the lock, so a poisoned guard still holds
    // a consistent pair.
    fn lock(&self) -> MutexGuard<'_, AccumulatorSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds both deltas in one step. On overflow nothing changes.
    pub fn add(&self, delta_total: i64, delta_count: i64) -> Result<(), AverageError> {
        let mut state = self.lock();
        *state = state.checked_add(delta_total, delta_count)?;
        Ok(())
    }

    /// Folds a consistent snapshot of `other` into `self`.
    pub fn merge(&self, other: &Accumulator) -> Result<(), AverageError> {
        let snapshot = other.snapshot();
        self.merge_snapshot(snapshot)
    }

    pub fn merge_snapshot(&self, snapshot: AccumulatorSnapshot) -> Result<(), AverageError> {
        self.add(snapshot.total, snapshot.count)
    }

    pub fn snapshot(&self) -> AccumulatorSnapshot {
        *self.lock()
    }

    pub fn average(&self) -> Result<f64, AverageError> {
        self.snapshot().average()
    }
}
