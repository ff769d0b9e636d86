//! Backup Manager (spec.md §3, §4 "Backup Manager", §6)
//!
//! Snapshots on-host state ahead of destructive operations (`remove`,
//! component reinstall) so there is a rollback target. Each backup is a
//! copied directory tree plus a `metadata.json` sidecar, stored under
//! `<mcs_home.parent>/.mcs.backup/<type>-<timestamp>/`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{McsError, Result};
use crate::paths::{atomic_write, Paths};

/// The kind of event that triggered a backup (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Destroy,
    Install,
    Manual,
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Destroy => "destroy",
            Self::Install => "install",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// A backup record (spec.md §3, §6 `metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub timestamp: u64,
    pub source_path: String,
    pub size: u64,
    pub description: String,
}

/// Microsecond-resolution id so two backups created in the same process tick
/// still sort and name uniquely (spec.md §3: "timestamps include
/// microseconds for uniqueness").
fn unix_now_micros() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    if path.is_file() {
        return Ok(std::fs::metadata(path)?.len());
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Creates and enumerates on-host backups.
pub struct BackupManager {
    paths: Paths,
}

impl BackupManager {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    fn backup_root(&self) -> PathBuf {
        self.paths.backup_home()
    }

    /// Copy `source_path` into a new backup directory and record its metadata.
    #[instrument(skip(self))]
    pub fn create(
        &self,
        backup_type: BackupType,
        source_path: &Path,
        description: impl Into<String>,
    ) -> Result<BackupRecord> {
        if !source_path.exists() {
            return Err(McsError::not_found(format!(
                "backup source {} does not exist",
                source_path.display()
            )));
        }

        let timestamp = unix_now_micros();
        let id = format!("{backup_type}-{timestamp}");
        let dest_root = self.backup_root().join(&id);
        std::fs::create_dir_all(&dest_root)?;

        let tree_dest = dest_root.join("tree");
        if source_path.is_dir() {
            copy_tree(source_path, &tree_dest)?;
        } else {
            std::fs::create_dir_all(&tree_dest)?;
            let file_name = source_path.file_name().ok_or_else(|| {
                McsError::validation("backup source path has no file name component")
            })?;
            std::fs::copy(source_path, tree_dest.join(file_name))?;
        }

        let size = dir_size(&tree_dest)?;
        let record = BackupRecord {
            id: id.clone(),
            backup_type,
            timestamp,
            source_path: source_path.to_string_lossy().to_string(),
            size,
            description: description.into(),
        };

        let json = serde_json::to_vec_pretty(&record)?;
        atomic_write(&dest_root.join("metadata.json"), &json)?;
        debug!(id, size, "created backup");
        Ok(record)
    }

    /// All backups, strictly sorted by `timestamp` descending (spec.md §8).
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let root = self.backup_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let metadata_path = entry.path().join("metadata.json");
            if !metadata_path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&metadata_path)?;
            match serde_json::from_str::<BackupRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %metadata_path.display(),
                        error = %e,
                        "skipping unreadable backup metadata"
                    );
                }
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<BackupRecord> {
        self.list()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| McsError::not_found(format!("backup '{id}' not found")))
    }

    pub fn tree_path(&self, id: &str) -> PathBuf {
        self.backup_root().join(id).join("tree")
    }

    /// Delete backups beyond `keep` most recent, returning the count removed.
    #[instrument(skip(self))]
    pub fn enforce_retention(&self, keep: usize) -> Result<usize> {
        let records = self.list()?;
        let mut removed = 0;
        for record in records.into_iter().skip(keep) {
            let dir = self.backup_root().join(&record.id);
            std::fs::remove_dir_all(&dir)?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager() -> (tempfile::TempDir, BackupManager) {
        let dir = tempdir().unwrap();
        let paths = Paths::with_mcs_home(dir.path().join(".mcs"));
        (dir, BackupManager::new(paths))
    }

    #[test]
    fn create_copies_tree_and_records_metadata() {
        let (dir, mgr) = manager();
        let source = dir.path().join("codespaces/demo");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("file.txt"), b"hello").unwrap();

        let record = mgr.create(BackupType::Destroy, &source, "pre-remove snapshot").unwrap();
        assert!(record.id.starts_with("destroy-"));
        assert_eq!(record.size, 5);
        assert!(mgr.tree_path(&record.id).join("file.txt").exists());
    }

    #[test]
    fn list_is_sorted_by_timestamp_descending() {
        let (dir, mgr) = manager();
        let source = dir.path().join("codespaces/demo");
        std::fs::create_dir_all(&source).unwrap();

        let first = mgr.create(BackupType::Manual, &source, "one").unwrap();
        let second = mgr.create(BackupType::Manual, &source, "two").unwrap();
        let third = mgr.create(BackupType::Manual, &source, "three").unwrap();

        let listed = mgr.list().unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, third.id);
        assert_eq!(listed[1].id, second.id);
        assert_eq!(listed[2].id, first.id);
    }

    #[test]
    fn nonexistent_source_is_not_found() {
        let (dir, mgr) = manager();
        let missing = dir.path().join("does-not-exist");
        let result = mgr.create(BackupType::Manual, &missing, "x");
        assert!(matches!(result, Err(McsError::NotFound { .. })));
    }

    #[test]
    fn retention_removes_oldest_first() {
        let (dir, mgr) = manager();
        let source = dir.path().join("codespaces/demo");
        std::fs::create_dir_all(&source).unwrap();
        for i in 0..5 {
            mgr.create(BackupType::Manual, &source, format!("backup {i}")).unwrap();
        }

        let removed = mgr.enforce_retention(2).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(mgr.list().unwrap().len(), 2);
    }

    #[test]
    fn get_returns_not_found_for_unknown_id() {
        let (_dir, mgr) = manager();
        assert!(mgr.get("destroy-0").is_err());
    }
}
