use log::{debug, warn};

use crate::config::Backend;

use super::classify::{Classifier, PathClass};
use super::pool::BackendPool;
use super::table::RoutingTable;
use super::AffinityError;

/// Decides which backend owns a request.
///
/// Composes routing-table lookups, round-robin assignment for brand-new
/// sessions, and referer-based recovery for sub-resources that do not carry
/// the pad id in their own path. Holds no per-request state; the shared
/// table and cursor are the only mutable structures.
pub struct AffinityResolver {
    pool: BackendPool,
    table: RoutingTable,
    classifier: Classifier,
}

impl AffinityResolver {
    pub fn new(pool: BackendPool, table: RoutingTable, classifier: Classifier) -> Self {
        Self {
            pool,
            table,
            classifier,
        }
    }

    pub fn resolve(
        &self,
        path: &str,
        referer: Option<&str>,
    ) -> Result<Backend, AffinityError> {
        // Established affinity, session root or previously seen path alike.
        if let Some(addr) = self.table.lookup(path) {
            debug!("Table hit: {path} -> {addr}");
            return Ok(self.backend_for(&addr));
        }

        match self.classifier.classify(path) {
            PathClass::SessionRoot(key) => {
                // The only path that grows the table and advances the
                // cursor. assign_with serializes concurrent first visits so
                // exactly one assignment wins and is persisted.
                let addr = self.table.assign_with(&key, || self.pool.next().addr())?;
                Ok(self.backend_for(&addr))
            }
            PathClass::AffinityDependent => {
                let referer = referer.ok_or(AffinityError::MissingReferer)?;
                let known = self
                    .classifier
                    .session_key_from_referer(referer)
                    .and_then(|key| self.table.lookup(&key));
                match known {
                    Some(addr) => {
                        debug!("Referer recovery: {path} -> {addr}");
                        Ok(self.backend_for(&addr))
                    }
                    None => {
                        // Referer never seen or malformed. Falling back to
                        // the default backend may misroute a live session;
                        // kept as the documented behavior.
                        debug!("Referer recovery missed for {path}, using default backend");
                        Ok(self.pool.first().clone())
                    }
                }
            }
            PathClass::Ordinary => Ok(self.pool.first().clone()),
        }
    }

    /// Maps a persisted address string back to its configured backend. The
    /// table only ever stores configured addresses; a mismatch means the
    /// file predates a pool change.
    fn backend_for(&self, addr: &str) -> Backend {
        match self.pool.find(addr) {
            Some(backend) => backend.clone(),
            None => {
                warn!("Routing table points at unconfigured backend {addr}, using default");
                self.pool.first().clone()
            }
        }
    }
}
