//! # Local Aggregation Stage
//! Folds one batch of new events into a node's windowed running average.
//!
//! Per batch, every event is added to the accumulator and every event the
//! window displaced is subtracted. The subtraction is what turns the
//! cumulative sum into a windowed one. Both happen as one step under the
//! window lock, so a batch that would overflow the total changes neither the
//! window nor the accumulator.

use crate::error::StageError;
use crate::space::{LocalSpace, AVG_KEY};
use crate::window::SlidingWindow;

/// What one `process` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub processed: usize,
    pub evicted: usize,
}

#[derive(Debug)]
pub struct AggregationStage {
    window: SlidingWindow,
    key: String,
}

impl AggregationStage {
    pub fn new(window_capacity: usize) -> Self {
        Self::with_key(window_capacity, AVG_KEY)
    }

    pub fn with_key(window_capacity: usize, key: impl Into<String>) -> Self {
        Self {
            window: SlidingWindow::with_capacity(window_capacity),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Apply `events` to the accumulator stored in `space`.
    ///
    /// Fails when the space is unavailable or the batch would overflow the
    /// running total. Nothing is applied in either case and the caller
    /// decides whether to retry.
    pub fn process(
        &self,
        space: &LocalSpace,
        events: &[i64],
    ) -> Result<ProcessOutcome, StageError> {
        let avg = space.get_or_create(&self.key)?;
        let overflow = || StageError::Overflow {
            events: events.len(),
        };

        let evicted = self.window.try_enqueue_all(events, |evicted| {
            let (total, count) = net_delta(events, evicted).ok_or_else(overflow)?;
            avg.add(total, count).map_err(|_| overflow())
        })?;

        Ok(ProcessOutcome {
            processed: events.len(),
            evicted: evicted.len(),
        })
    }
}

/// `(sum(added) - sum(evicted), added - evicted)`, if both fit in `i64`.
fn net_delta(added: &[i64], evicted: &[i64]) -> Option<(i64, i64)> {
    let sum = |xs: &[i64]| xs.iter().map(|&x| i128::from(x)).sum::<i128>();
    let total = i64::try_from(sum(added) - sum(evicted)).ok()?;
    let count = i64::try_from(added.len()).ok()? - i64::try_from(evicted.len()).ok()?;
    Some((total, count))
}
