use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Backend;

use super::AffinityError;

/// Static ordered pool of pad backends with a round-robin cursor.
///
/// No health awareness and no removal: a backend that is down is still
/// assigned, failure handling belongs to the forwarding layer.
pub struct BackendPool {
    backends: Vec<Backend>,
    cursor: AtomicUsize,
}

impl BackendPool {
    /// Config validation already rejects an empty pool; this re-checks so
    /// `next` and `first` can never panic.
    pub fn new(backends: Vec<Backend>) -> Result<Self, AffinityError> {
        if backends.is_empty() {
            return Err(AffinityError::EmptyBackendPool);
        }
        Ok(Self {
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Returns the backend at the cursor and advances it by one, wrapping
    /// modulo the pool size.
    pub fn next(&self) -> &Backend {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        &self.backends[idx]
    }

    /// Fixed default backend for traffic with no affinity requirement.
    pub fn first(&self) -> &Backend {
        &self.backends[0]
    }

    /// Looks a configured backend up by its address string.
    pub fn find(&self, addr: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.addr() == addr)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
