//! Persisted job properties
//!
//! A small YAML key→value sidecar next to the job file. Whatever it
//! holds is merged into the base binding context at run start (so jobs
//! can filter on `{{last_index_time}}`), and the run updates the
//! timestamp on completion of each graph. Debug runs neither read a
//! missing file into existence nor write one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::ImportError;

/// Key updated after every successfully committed graph
pub const LAST_INDEX_TIME: &str = "last_index_time";

#[derive(Debug, Clone)]
pub struct PropertiesStore {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl PropertiesStore {
    /// Store for a given job file: `jobs/crm.yaml` → `jobs/crm.properties.yaml`
    pub fn for_job(job_path: &Path) -> Result<Self, ImportError> {
        Self::load(job_path.with_extension("properties.yaml"))
    }

    /// Load from an explicit path; a missing file is an empty store
    pub fn load(path: PathBuf) -> Result<Self, ImportError> {
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&text)?
        } else {
            debug!(path = %path.display(), "no properties file yet");
            HashMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Snapshot of all properties, for seeding the binding context
    pub fn as_map(&self) -> HashMap<String, Value> {
        self.values.clone()
    }

    pub fn save(&self) -> Result<(), ImportError> {
        let text = serde_yaml::to_string(&self.values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PropertiesStore::for_job(&dir.path().join("crm.yaml")).unwrap();
        assert!(store.as_map().is_empty());
        assert!(store.path().ends_with("crm.properties.yaml"));
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let job = dir.path().join("crm.yaml");

        let mut store = PropertiesStore::for_job(&job).unwrap();
        store.set(LAST_INDEX_TIME, json!("2026-08-06T10:00:00"));
        store.set("cursor_offset", json!(42));
        store.save().unwrap();

        let reloaded = PropertiesStore::for_job(&job).unwrap();
        assert_eq!(
            reloaded.get(LAST_INDEX_TIME),
            Some(&json!("2026-08-06T10:00:00"))
        );
        assert_eq!(reloaded.get("cursor_offset"), Some(&json!(42)));
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let job = dir.path().join("crm.yaml");

        let mut store = PropertiesStore::for_job(&job).unwrap();
        store.set(LAST_INDEX_TIME, json!("first"));
        store.save().unwrap();
        store.set(LAST_INDEX_TIME, json!("second"));
        store.save().unwrap();

        let reloaded = PropertiesStore::for_job(&job).unwrap();
        assert_eq!(reloaded.get(LAST_INDEX_TIME), Some(&json!("second")));
    }
}
