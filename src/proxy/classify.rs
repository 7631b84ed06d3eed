use http::Uri;

use crate::config::Affinity;

/// Classification of a request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathClass {
    /// Canonical pad URL. Carries the routing-table key, the path verbatim.
    SessionRoot(String),
    /// Sub-resource that belongs to a session's backend but does not encode
    /// the pad id itself (realtime transport, locales, plugin assets).
    AffinityDependent,
    /// No affinity requirement; served by the default backend.
    Ordinary,
}

/// Pure path classification. Stateless and deterministic.
pub struct Classifier {
    session_marker: String,
    sticky_paths: Vec<String>,
}

impl From<Affinity> for Classifier {
    fn from(value: Affinity) -> Self {
        Self {
            session_marker: value.session_marker,
            sticky_paths: value.sticky_paths,
        }
    }
}

impl Classifier {
    pub fn classify(&self, path: &str) -> PathClass {
        if self.is_session_root(path) {
            return PathClass::SessionRoot(path.to_string());
        }
        if self
            .sticky_paths
            .iter()
            .any(|marker| path.contains(marker.as_str()))
        {
            return PathClass::AffinityDependent;
        }
        PathClass::Ordinary
    }

    /// A session root contains a `/<marker>/<id>` segment pair with a
    /// non-empty id, e.g. `/p/mypad` or `/p/mypad/export`.
    fn is_session_root(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').collect();
        segments
            .windows(2)
            .any(|pair| pair[0] == self.session_marker && !pair[1].is_empty())
    }

    /// Derives the probable session-root path from a full referer URL by
    /// taking its first two path segments. Returns `None` unless the derived
    /// path itself looks like a session root; a referer of
    /// `http://host/p/mypad/whatever` yields `/p/mypad`.
    pub fn session_key_from_referer(&self, referer: &str) -> Option<String> {
        let uri: Uri = referer.parse().ok()?;
        let mut segments = uri.path().split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let second = segments.next()?;
        let key = format!("/{first}/{second}");
        match self.classify(&key) {
            PathClass::SessionRoot(key) => Some(key),
            _ => None,
        }
    }
}
