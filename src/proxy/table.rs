use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};

use super::AffinityError;

/// Persistent map from session path to backend address.
///
/// Loaded once at startup, rewritten to disk in full after every assignment.
/// Entries are never removed; the table grows with the number of distinct
/// sessions ever created.
pub struct RoutingTable {
    entries: Mutex<HashMap<String, String>>,
    path: PathBuf,
}

impl RoutingTable {
    /// Loads the table from `path`, starting empty if the file does not
    /// exist. A file that is present but unparsable is a hard error: the
    /// proxy must not start with ambiguous routing state.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AffinityError> {
        let path = path.as_ref().to_path_buf();
        let entries: HashMap<String, String> = match fs::read_to_string(&path) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|source| AffinityError::MalformedTable {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(AffinityError::TableRead {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        debug!("Routing table loaded with {} entries", entries.len());
        Ok(Self {
            entries: Mutex::new(entries),
            path,
        })
    }

    pub fn lookup(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Inserts `key` with the backend picked by `pick`, unless another
    /// request already won the assignment, in which case `pick` is not
    /// called and the existing address is returned. The whole table is
    /// snapshotted to disk before this returns, so an assignment observed
    /// by the caller survives a restart.
    pub fn assign_with<F>(&self, key: &str, pick: F) -> Result<String, AffinityError>
    where
        F: FnOnce() -> String,
    {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(key) {
            return Ok(existing.clone());
        }

        let addr = pick();
        entries.insert(key.to_string(), addr.clone());
        if let Err(e) = self.persist(&entries) {
            entries.remove(key);
            return Err(e);
        }
        info!("Assigned {key} -> {addr}");
        Ok(addr)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), AffinityError> {
        let write = || -> std::io::Result<()> {
            let raw = serde_json::to_string_pretty(entries)?;
            fs::write(&self.path, raw)
        };
        write().map_err(|source| AffinityError::TableWrite {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = RoutingTable::load(dir.path().join("routing_table.json")).unwrap();
        assert!(table.is_empty());
        assert_eq!(None, table.lookup("/p/mypad"));
    }

    #[test]
    fn test_assign_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing_table.json");

        let table = RoutingTable::load(&path).unwrap();
        let addr = table
            .assign_with("/p/mypad", || "10.0.0.1:9001".to_string())
            .unwrap();
        assert_eq!("10.0.0.1:9001", addr);

        // snapshot must be durable before assign_with returns
        let reloaded = RoutingTable::load(&path).unwrap();
        assert_eq!(Some("10.0.0.1:9001".to_string()), reloaded.lookup("/p/mypad"));
        assert_eq!(1, reloaded.len());
    }

    #[test]
    fn test_first_assignment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let table = RoutingTable::load(dir.path().join("routing_table.json")).unwrap();

        let first = table
            .assign_with("/p/mypad", || "10.0.0.1:9001".to_string())
            .unwrap();
        let second = table
            .assign_with("/p/mypad", || panic!("pick must not run for a known key"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(1, table.len());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing_table.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            RoutingTable::load(&path),
            Err(AffinityError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_persisted_layout_is_key_value_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing_table.json");

        let table = RoutingTable::load(&path).unwrap();
        table
            .assign_with("/p/mypad", || "10.0.0.1:9001".to_string())
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(Some(&"10.0.0.1:9001".to_string()), parsed.get("/p/mypad"));
    }
}
