//! Persisted-artifact store: snapshots keyed by version, the current tool
//! inventory and tool-endpoint map, per-version drift reports with a
//! "latest" alias, and the running sync-state record.
//!
//! Every write goes through a temp file persisted into the final path, so
//! a failed stage never leaves a partial artifact a later stage would
//! misread as complete.

use crate::error::SyncError;
use crate::model::{ReleaseVersion, Snapshot, SyncState, ToolEndpointMap, ToolInventoryEntry};
use crate::report::SyncReport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const SNAPSHOT_PREFIX: &str = "snapshot-";
const INVENTORY_FILE: &str = "tool-inventory.json";
const MAP_FILE: &str = "tool-endpoint-map.json";
const SYNC_STATE_FILE: &str = "sync-state.json";

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn snapshot_path(&self, version: &str) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{SNAPSHOT_PREFIX}{version}.json"))
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.root.join(INVENTORY_FILE)
    }

    pub fn map_path(&self) -> PathBuf {
        self.root.join(MAP_FILE)
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.root.join(SYNC_STATE_FILE)
    }

    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        self.write_json(&self.snapshot_path(&snapshot.version), snapshot)
    }

    pub fn load_snapshot(&self, version: &str) -> Result<Snapshot, SyncError> {
        self.read_json(&self.snapshot_path(version), "toolsync sync")
    }

    /// Versions of every persisted snapshot, sorted ascending.
    pub fn snapshot_versions(&self) -> Result<Vec<String>, SyncError> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<String> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(version) = name
                .strip_prefix(SNAPSHOT_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                versions.push(version.to_string());
            }
        }
        versions.sort_by_key(|v| ReleaseVersion::parse(v));
        Ok(versions)
    }

    pub fn latest_snapshot_version(&self) -> Result<Option<String>, SyncError> {
        Ok(self.snapshot_versions()?.into_iter().last())
    }

    /// The closest strict predecessor of `current` among persisted
    /// snapshots, or `None` on a first run.
    pub fn previous_snapshot(&self, current: &str) -> Result<Option<Snapshot>, SyncError> {
        let current_version = ReleaseVersion::parse(current);
        let predecessor = self
            .snapshot_versions()?
            .into_iter()
            .filter(|v| ReleaseVersion::parse(v) < current_version)
            .last();
        match predecessor {
            Some(version) => Ok(Some(self.load_snapshot(&version)?)),
            None => Ok(None),
        }
    }

    pub fn save_inventory(&self, inventory: &[ToolInventoryEntry]) -> Result<(), SyncError> {
        self.write_json(&self.inventory_path(), &inventory)
    }

    pub fn load_inventory(&self) -> Result<Vec<ToolInventoryEntry>, SyncError> {
        self.read_json(&self.inventory_path(), "toolsync sync")
    }

    pub fn map_exists(&self) -> bool {
        self.map_path().is_file()
    }

    pub fn save_map(&self, map: &ToolEndpointMap) -> Result<(), SyncError> {
        self.write_json(&self.map_path(), map)
    }

    pub fn load_map(&self) -> Result<ToolEndpointMap, SyncError> {
        self.read_json(&self.map_path(), "toolsync bootstrap")
    }

    /// Persist a report under its version and refresh the latest alias.
    pub fn save_report(&self, report: &SyncReport) -> Result<(), SyncError> {
        let version = &report.drift.current_version;
        self.write_json(
            &self.reports_dir().join(format!("drift-{version}.json")),
            report,
        )?;
        self.write_json(&self.reports_dir().join("drift-latest.json"), report)
    }

    pub fn save_report_markdown(&self, markdown: &str) -> Result<(), SyncError> {
        let path = self.reports_dir().join("drift-latest.md");
        self.write_atomic(&path, markdown.as_bytes())
    }

    /// Missing sync-state is a normal first-run condition and yields the
    /// default record.
    pub fn load_sync_state(&self) -> Result<SyncState, SyncError> {
        let path = self.sync_state_path();
        if !path.is_file() {
            return Ok(SyncState::default());
        }
        self.read_json(&path, "toolsync sync")
    }

    pub fn save_sync_state(&self, state: &SyncState) -> Result<(), SyncError> {
        self.write_json(&self.sync_state_path(), state)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), SyncError> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("failed to serialize artifact: {e}")))?;
        self.write_atomic(path, &body)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(bytes)?;
        temp.persist(path)
            .map_err(|e| SyncError::Io(e.error))?;
        debug!(path = %path.display(), "artifact written");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(
        &self,
        path: &Path,
        produced_by: &str,
    ) -> Result<T, SyncError> {
        if !path.is_file() {
            return Err(SyncError::MissingArtifact {
                path: path.to_path_buf(),
                produced_by: produced_by.to_string(),
            });
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| SyncError::CorruptArtifact {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
