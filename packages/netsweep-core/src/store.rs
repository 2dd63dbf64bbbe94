//! Durable scan-result store.
//!
//! The whole result set is written after every host. Writes go to a
//! temporary sibling file that is then renamed over the target, so a reader
//! only ever sees the previous or the new snapshot.

use crate::scanner::ScanSnapshot;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const STORE_FILE: &str = "last_scan.json";

pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot.
    fn save(&self, snapshot: &ScanSnapshot) -> Result<()>;

    /// Load the stored snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<ScanSnapshot>>;
}

/// Default location of the snapshot file.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|dir| dir.join("netsweep").join(STORE_FILE))
}

/// Pretty JSON file store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| STORE_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &ScanSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let content =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize scan snapshot")?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::debug!(
            "Saved snapshot: {} records ({}/{})",
            snapshot.records.len(),
            snapshot.progress,
            snapshot.total
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<ScanSnapshot>> {
        if !self.path.exists() {
            tracing::debug!("No snapshot file at {}", self.path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).context("Failed to read snapshot file")?;
        let snapshot: ScanSnapshot =
            serde_json::from_str(&content).context("Failed to parse snapshot file")?;

        tracing::info!(
            "Loaded snapshot: {} records, state {}, updated {}",
            snapshot.records.len(),
            snapshot.state,
            snapshot.updated_at.to_rfc3339()
        );
        Ok(Some(snapshot))
    }
}

/// In-memory store, also handy for consumers that only want the live feed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<ScanSnapshot>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    pub fn write_count(&self) -> u64 {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, snapshot: &ScanSnapshot) -> Result<()> {
        let mut slot = self
            .snapshot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        *slot = Some(snapshot.clone());
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<ScanSnapshot>> {
        let slot = self
            .snapshot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        Ok(slot.clone())
    }
}
