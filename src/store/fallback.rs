/// JSON-file fallback store
///
/// The degraded-but-always-available backend: a single JSON document,
/// rewritten atomically (write to a sibling temp file, then rename). No
/// native engine, no schema, nothing to compile - it must open under
/// strictly weaker preconditions than the primary.
use super::{StateStore, StoreKind};
use crate::capability::{Availability, Capability};
use crate::{SetupError, SetupResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open the store file, creating an empty one on first use
    pub fn open(path: &Path) -> SetupResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| {
                SetupError::StoreOpen(format!(
                    "fallback store {} is not valid JSON: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), "fallback store opened");

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> SetupResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Fallback
    }

    fn get(&self, key: &str) -> SetupResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> SetupResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&mut self, key: &str) -> SetupResult<()> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn keys(&self) -> SetupResult<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn flush(&mut self) -> SetupResult<()> {
        self.persist()
    }
}

/// Capability adapter: available whenever the directory is writable
pub struct JsonBackend {
    dir: PathBuf,
}

impl JsonBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Capability for JsonBackend {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn probe(&self) -> Availability {
        let check = || -> std::io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            let probe_file = self.dir.join(".write-probe");
            fs::write(&probe_file, b"probe")?;
            fs::remove_file(&probe_file)?;
            Ok(())
        };

        match check() {
            Ok(()) => Availability::Available,
            Err(e) => Availability::Unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.put("schema_version", "1").unwrap();
            store.put("mode", "fallback").unwrap();
            assert_eq!(store.keys().unwrap(), vec!["mode", "schema_version"]);
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("mode").unwrap().as_deref(), Some("fallback"));
    }

    #[test]
    fn persisted_file_is_valid_json_with_no_temp_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        store.put("k", "v").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get("k").map(String::as_str), Some("v"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, SetupError::StoreOpen(_)));
    }

    #[test]
    fn remove_missing_key_does_not_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let mut store = JsonFileStore::open(&path).unwrap();

        store.remove("absent").unwrap();
        // Nothing was ever written
        assert!(!path.exists());
    }

    #[test]
    fn backend_probe_available_in_writable_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(JsonBackend::new(tmp.path()).probe().is_available());
    }
}
