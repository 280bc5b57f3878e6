//! Applied-snapshot persistence: identity continuity and one-step undo.
//!
//! MIT License
//!
//! Copyright (c) 2026 66f94eae
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy
//! of this software and associated documentation files (the "Software"), to deal
//! in the Software without restriction, including without limitation the rights
//! to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//! copies of the Software, and to permit persons to whom the Software is
//! furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all
//! copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//! IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//! AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//! LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//! OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//! SOFTWARE.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Manifest schema version written by this implementation
const SCHEMA_VERSION: u32 = 1;

/// One applied entry with its identity record
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ManifestEntry {
    #[serde(default)]
    pub uid: String,
    pub id: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub identity: Value,
    /// The full scheduler entry as written
    #[serde(default)]
    pub payload: Value,
}

/// The state of one applied plan
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Snapshot {
    #[serde(rename = "appliedAt", default)]
    pub applied_at: String,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
    /// Manifest ids in planner order
    #[serde(default)]
    pub order: Vec<String>,
}

/// Persisted manifest: the current snapshot plus at most one previous
/// snapshot for undo
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Manifest {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: u32,
    /// Calendar URL the snapshots were computed from
    #[serde(default)]
    pub calendar: String,
    #[serde(default)]
    pub current: Option<Snapshot>,
    #[serde(default)]
    pub previous: Option<Snapshot>,
}

/// Owns the manifest file. Nothing else reads or writes it.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ManifestStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the manifest; a missing or corrupt file is an empty one.
    /// Unknown keys in the file are ignored.
    pub fn load(&self) -> Manifest {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return Manifest::default(),
        };
        match serde_json::from_str(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "manifest unreadable, starting fresh");
                Manifest::default()
            }
        }
    }

    /// Commits a new snapshot: the current one becomes the undo target.
    pub fn commit(&self, calendar: &str, snapshot: Snapshot) -> SyncResult<()> {
        let mut manifest = self.load();
        manifest.schema_version = SCHEMA_VERSION;
        manifest.calendar = calendar.to_string();
        manifest.previous = manifest.current.take();
        manifest.current = Some(snapshot);
        self.persist(&manifest)
    }

    /// Swaps the previous snapshot back into place and clears it.
    ///
    /// # Returns
    /// * the restored snapshot, for the caller to rebuild the scheduler
    ///   file from
    pub fn rollback(&self) -> SyncResult<Snapshot> {
        let mut manifest = self.load();
        let Some(previous) = manifest.previous.take() else {
            return Err(SyncError::NothingToRollback);
        };
        manifest.current = Some(previous.clone());
        self.persist(&manifest)?;
        Ok(previous)
    }

    fn persist(&self, manifest: &Manifest) -> SyncResult<()> {
        let mut body = serde_json::to_string_pretty(manifest)?;
        body.push('\n');
        let tmp = self.path.with_extension("json.tmp");
        let result = (|| -> SyncResult<()> {
            fs::write(&tmp, &body)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(|e| SyncError::ManifestCommit(e.to_string()))
    }
}

/// Builds a snapshot from the desired entries of an applied plan.
///
/// Duplicate ids are forbidden in a snapshot; later duplicates are
/// dropped, mirroring the diff's keep-first rule.
pub fn snapshot_from_desired(applied_at: &str, desired: &[Value]) -> Snapshot {
    let mut entries = Vec::new();
    let mut order = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for payload in desired {
        let sidecar = &payload["_manifest"];
        let Some(id) = sidecar["id"].as_str() else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }
        entries.push(ManifestEntry {
            uid: sidecar["uid"].as_str().unwrap_or_default().to_string(),
            id: id.to_string(),
            hash: sidecar["hash"].as_str().unwrap_or_default().to_string(),
            identity: sidecar["identity"].clone(),
            payload: payload.clone(),
        });
        order.push(id.to_string());
    }

    Snapshot {
        applied_at: applied_at.to_string(),
        entries,
        order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> Value {
        json!({
            "playlist": "Show",
            "_manifest": {"id": id, "uid": "u1", "hash": "h", "identity": {"type": "playlist"}},
        })
    }

    #[test]
    fn commit_promotes_current_to_previous() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path().join("manifest.json"));

        let first = snapshot_from_desired("2025-01-01T00:00:00Z", &[entry("a")]);
        store.commit("https://cal.test/x.ics", first).expect("commit");
        let second = snapshot_from_desired("2025-01-02T00:00:00Z", &[entry("b")]);
        store.commit("https://cal.test/x.ics", second).expect("commit");

        let manifest = store.load();
        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.calendar, "https://cal.test/x.ics");
        assert_eq!(
            manifest.current.as_ref().map(|s| s.order.clone()),
            Some(vec!["b".to_string()])
        );
        assert_eq!(
            manifest.previous.as_ref().map(|s| s.order.clone()),
            Some(vec!["a".to_string()])
        );
    }

    #[test]
    fn rollback_restores_previous_and_clears_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path().join("manifest.json"));

        store
            .commit("cal", snapshot_from_desired("t1", &[entry("a")]))
            .expect("commit");
        store
            .commit("cal", snapshot_from_desired("t2", &[entry("b")]))
            .expect("commit");

        let restored = store.rollback().expect("rollback");
        assert_eq!(restored.order, vec!["a".to_string()]);

        let manifest = store.load();
        assert_eq!(
            manifest.current.as_ref().map(|s| s.order.clone()),
            Some(vec!["a".to_string()])
        );
        assert!(manifest.previous.is_none());
        // Only one undo level exists
        assert!(matches!(
            store.rollback(),
            Err(SyncError::NothingToRollback)
        ));
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path().join("manifest.json"));
        assert!(store.load().current.is_none());

        fs::write(store.path(), "garbage").expect("write");
        assert!(store.load().current.is_none());
    }

    #[test]
    fn load_ignores_unknown_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"schemaVersion": 1, "calendar": "c", "futureKey": {"x": 1}, "current": null, "previous": null}"#,
        )
        .expect("write");
        let manifest = ManifestStore::new(&path).load();
        assert_eq!(manifest.calendar, "c");
    }

    #[test]
    fn snapshot_drops_duplicate_ids() {
        let snapshot = snapshot_from_desired("t", &[entry("a"), entry("a"), entry("b")]);
        assert_eq!(snapshot.order, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(snapshot.entries.len(), 2);
    }
}
