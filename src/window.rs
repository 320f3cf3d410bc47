//! # Sliding Window
//! Bounded FIFO buffer over the most recent events.
//!
//! Pushing past capacity evicts the oldest resident first. Evictions are
//! either handed back synchronously (`enqueue`, `enqueue_all`) or parked in a
//! pending queue for `poll_evicted` (`offer`, `offer_all`).

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Default number of events kept per window.
pub const DEFAULT_CAPACITY: usize = 500;

/// Thread-safe count-bounded window over integer events.
#[derive(Debug)]
pub struct SlidingWindow {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug)]
struct Inner {
    /// Residents, oldest at the front.
    buf: VecDeque<i64>,
    /// Evictions not yet drained by `poll_evicted`.
    evicted: VecDeque<i64>,
}

fn push(buf: &mut VecDeque<i64>, capacity: usize, value: i64, out: &mut impl Extend<i64>) {
    buf.push_back(value);
    while buf.len() > capacity {
        if let Some(old) = buf.pop_front() {
            out.extend(Some(old));
        }
    }
}

impl SlidingWindow {
    /// Create a window holding at most `capacity` events.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "sliding window capacity must be positive");
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity.min(4096)),
                evicted: VecDeque::new(),
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one event, returning the event it displaced (if any).
    pub fn enqueue(&self, value: i64) -> Option<i64> {
        let mut evicted = Vec::with_capacity(1);
        push(&mut self.lock().buf, self.capacity, value, &mut evicted);
        evicted.pop()
    }

    /// Append a batch in order. Returns every displaced event, oldest first.
    pub fn enqueue_all<I>(&self, values: I) -> Vec<i64>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut evicted = Vec::new();
        let mut inner = self.lock();
        for v in values {
            push(&mut inner.buf, self.capacity, v, &mut evicted);
        }
        evicted
    }

    /// Append a batch only if `admit` accepts the events it would displace
    /// (oldest first). `admit` runs under the window lock; when it fails the
    /// window is left exactly as it was.
    pub fn try_enqueue_all<E, F>(&self, values: &[i64], admit: F) -> Result<Vec<i64>, E>
    where
        F: FnOnce(&[i64]) -> Result<(), E>,
    {
        let mut inner = self.lock();
        let excess = (inner.buf.len() + values.len()).saturating_sub(self.capacity);
        let evicted: Vec<i64> = inner
            .buf
            .iter()
            .chain(values)
            .copied()
            .take(excess)
            .collect();
        admit(&evicted)?;

        let mut sink = Vec::with_capacity(excess);
        for &v in values {
            push(&mut inner.buf, self.capacity, v, &mut sink);
        }
        debug_assert_eq!(sink, evicted);
        Ok(evicted)
    }

    /// Like `enqueue`, but parks the eviction for `poll_evicted`.
    pub fn offer(&self, value: i64) {
        self.offer_all(std::iter::once(value));
    }

    /// Like `enqueue_all`, but parks evictions for `poll_evicted`.
    pub fn offer_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = i64>,
    {
        let mut guard = self.lock();
        let Inner { buf, evicted } = &mut *guard;
        for v in values {
            push(buf, self.capacity, v, evicted);
        }
    }

    /// Take the oldest parked eviction, `None` once drained.
    pub fn poll_evicted(&self) -> Option<i64> {
        self.lock().evicted.pop_front()
    }

    /// Copy of the residents, oldest first.
    pub fn snapshot(&self) -> Vec<i64> {
        self.lock().buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_below_capacity_evicts_nothing() {
        let w = SlidingWindow::with_capacity(3);
        assert_eq!(w.enqueue(1), None);
        assert_eq!(w.enqueue(2), None);
        assert_eq!(w.enqueue(3), None);
        assert_eq!(w.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn one_at_a_time_keeps_last_w_and_returns_k_oldest_first() {
        const W: usize = 5;
        const K: usize = 4;
        let w = SlidingWindow::with_capacity(W);

        let mut evicted = Vec::new();
        for v in 0..(W + K) as i64 {
            evicted.extend(w.enqueue(v));
        }

        assert_eq!(evicted, vec![0, 1, 2, 3]);
        assert_eq!(w.snapshot(), vec![4, 5, 6, 7, 8]);
        assert_eq!(w.len(), W);
    }

    #[test]
    fn batch_larger_than_capacity_evicts_in_fifo_order() {
        let w = SlidingWindow::with_capacity(2);
        w.enqueue(100);
        let evicted = w.enqueue_all([1, 2, 3]);
        assert_eq!(evicted, vec![100, 1]);
        assert_eq!(w.snapshot(), vec![2, 3]);
    }

    #[test]
    fn offered_evictions_drain_through_poll() {
        let w = SlidingWindow::with_capacity(3);
        w.offer_all([10, 20, 30, 40]);
        w.offer(50);

        assert_eq!(w.poll_evicted(), Some(10));
        assert_eq!(w.poll_evicted(), Some(20));
        assert_eq!(w.poll_evicted(), None);
        assert_eq!(w.snapshot(), vec![30, 40, 50]);
    }

    #[test]
    fn duplicate_values_are_kept_separately() {
        let w = SlidingWindow::with_capacity(2);
        assert_eq!(w.enqueue_all([7, 7, 7]), vec![7]);
        assert_eq!(w.snapshot(), vec![7, 7]);
    }

    #[test]
    fn refused_batch_leaves_window_untouched() {
        let w = SlidingWindow::with_capacity(3);
        w.enqueue_all([1, 2]);

        let mut seen = Vec::new();
        let res: Result<Vec<i64>, &str> = w.try_enqueue_all(&[3, 4, 5], |evicted| {
            seen.extend_from_slice(evicted);
            Err("no")
        });
        assert_eq!(res, Err("no"));
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(w.snapshot(), vec![1, 2]);

        let ok: Result<Vec<i64>, ()> = w.try_enqueue_all(&[3, 4, 5, 6], |_| Ok(()));
        assert_eq!(ok, Ok(vec![1, 2, 3]));
        assert_eq!(w.snapshot(), vec![4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_is_rejected() {
        let _ = SlidingWindow::with_capacity(0);
    }
}
