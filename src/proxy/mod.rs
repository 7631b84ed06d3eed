pub mod classify;
pub mod pool;
pub mod resolver;
pub mod table;

use std::time::Instant;

use thiserror::Error;

use crate::config::Backend;

/// Proxy context.
///
/// Holds the routing decision for each request.
pub struct ProxyContext {
    pub backend: Option<Backend>,
    pub request_start: Instant,
}

impl Default for ProxyContext {
    fn default() -> Self {
        Self {
            backend: None,
            request_start: Instant::now(),
        }
    }
}

/// Failures of the affinity routing layer.
///
/// Forwarding failures (backend unreachable, timeouts) are pingora's concern
/// and never surface here.
#[derive(Debug, Error)]
pub enum AffinityError {
    /// An affinity-dependent request arrived without a Referer header, so
    /// the owning session cannot be recovered. Recovered at the service
    /// boundary with a client-visible 4xx.
    #[error("affinity-dependent request carries no Referer header")]
    MissingReferer,

    /// Fatal at startup.
    #[error("backend pool is empty")]
    EmptyBackendPool,

    /// The routing table file exists but cannot be parsed. Fatal at startup:
    /// the process must not serve with ambiguous routing state.
    #[error("routing table {path} is malformed: {source}")]
    MalformedTable {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to read routing table {path}: {source}")]
    TableRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to persist routing table {path}: {source}")]
    TableWrite {
        path: String,
        source: std::io::Error,
    },
}
