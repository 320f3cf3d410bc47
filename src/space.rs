// src/space.rs
//! Per-node keyed storage for live accumulators.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::accumulator::Accumulator;
use crate::error::SpaceError;

/// Key under which a node keeps its running average.
pub const AVG_KEY: &str = "avg";

#[derive(Debug, Default)]
pub struct LocalSpace {
    entries: RwLock<HashMap<String, Arc<Accumulator>>>,
}

fn unavailable<E: std::fmt::Display>(e: E) -> SpaceError {
    SpaceError::Unavailable(e.to_string())
}

impl LocalSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<Option<Arc<Accumulator>>, SpaceError> {
        let map = self.entries.read().map_err(unavailable)?;
        Ok(map.get(key).cloned())
    }

    /// Stores `value` only if `key` is vacant. Returns the resident entry when
    /// there already was one, `None` when `value` was stored.
    pub fn put_if_absent(
        &self,
        key: &str,
        value: Arc<Accumulator>,
    ) -> Result<Option<Arc<Accumulator>>, SpaceError> {
        let mut map = self.entries.write().map_err(unavailable)?;
        if let Some(existing) = map.get(key) {
            return Ok(Some(Arc::clone(existing)));
        }
        map.insert(key.to_string(), value);
        Ok(None)
    }

    /// Fetch the accumulator under `key`, creating it on first use. Concurrent
    /// first callers all end up with the same instance.
    pub fn get_or_create(&self, key: &str) -> Result<Arc<Accumulator>, SpaceError> {
        if let Some(acc) = self.get(key)? {
            return Ok(acc);
        }
        let fresh = Arc::new(Accumulator::new());
        match self.put_if_absent(key, Arc::clone(&fresh))? {
            Some(existing) => Ok(existing),
            None => Ok(fresh),
        }
    }

    pub fn len(&self) -> Result<usize, SpaceError> {
        Ok(self.entries.read().map_err(unavailable)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SpaceError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
impl LocalSpace {
    /// Hold the write lock until the guard drops; readers block meanwhile.
    pub(crate) fn stall(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Accumulator>>> {
        self.entries.write().unwrap()
    }

    /// Poison the lock by panicking while holding it.
    pub(crate) fn poison(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.entries.write().unwrap();
                    panic!("poison the space");
                })
                .join();
        });
    }
}
