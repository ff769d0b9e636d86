//! Well-known on-host paths
//!
//! `Paths` is a value type constructed once at process startup and threaded
//! explicitly through the engine (spec.md §9 redesign flag: no global path
//! singleton). `MCS_HOME` overrides the base directory; otherwise
//! `directories_next::ProjectDirs` resolves a per-user config directory, the
//! same crate the teacher uses for its own config-dir resolution.

use std::path::{Path, PathBuf};

use crate::errors::{McsError, Result};

/// Resolved on-host layout for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// `<home>/.mcs`
    mcs_home: PathBuf,
    /// `<home>/.mcs.backup`
    backup_home: PathBuf,
    /// `<home>/codespaces`
    codespaces_root: PathBuf,
}

impl Paths {
    /// Resolve paths from `MCS_HOME`/`HOME`, following the precedence in spec.md §6.
    pub fn discover() -> Result<Self> {
        let home = if let Ok(mcs_home) = std::env::var("MCS_HOME") {
            PathBuf::from(mcs_home)
        } else {
            let home = directories_next::UserDirs::new()
                .map(|d| d.home_dir().to_path_buf())
                .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
                .ok_or_else(|| McsError::filesystem("could not determine home directory"))?;
            home.join(".mcs")
        };
        Ok(Self::with_mcs_home(home))
    }

    /// Construct paths rooted at an explicit `.mcs` directory (used by tests).
    pub fn with_mcs_home(mcs_home: impl Into<PathBuf>) -> Self {
        let mcs_home = mcs_home.into();
        let parent = mcs_home.parent().map(Path::to_path_buf).unwrap_or_else(|| mcs_home.clone());
        Self {
            backup_home: parent.join(".mcs.backup"),
            codespaces_root: parent.join("codespaces"),
            mcs_home,
        }
    }

    pub fn mcs_home(&self) -> &Path {
        &self.mcs_home
    }

    pub fn backup_home(&self) -> &Path {
        &self.backup_home
    }

    pub fn codespaces_root(&self) -> &Path {
        &self.codespaces_root
    }

    pub fn config_file(&self) -> PathBuf {
        self.mcs_home.join("config.json")
    }

    pub fn ports_file(&self) -> PathBuf {
        self.mcs_home.join("ports.json")
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.mcs_home.join("tokens")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.mcs_home.join("logs")
    }

    pub fn codespace_dir(&self, name: &str) -> PathBuf {
        self.codespaces_root.join(name)
    }

    /// Create `mcs_home`, `codespaces_root`, and `backup_home` if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.mcs_home, &self.codespaces_root, &self.backup_home] {
            std::fs::create_dir_all(dir)
                .map_err(|e| McsError::filesystem(format!("creating {}: {e}", dir.display())))?;
        }
        Ok(())
    }
}

/// Write `content` to `path` atomically: write to `<path>.tmp`, fsync, then rename.
///
/// Shared by the Config Store, the Port Registry, and the Backup Manager's
/// metadata writes, all of which need identical read-modify-write safety
/// (spec.md §4.1, §4.2).
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_derive_from_mcs_home() {
        let dir = tempdir().unwrap();
        let mcs_home = dir.path().join(".mcs");
        let paths = Paths::with_mcs_home(&mcs_home);
        assert_eq!(paths.mcs_home(), mcs_home.as_path());
        assert_eq!(paths.codespaces_root(), dir.path().join("codespaces"));
        assert_eq!(paths.backup_home(), dir.path().join(".mcs.backup"));
        assert_eq!(paths.config_file(), mcs_home.join("config.json"));
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_mcs_home(dir.path().join(".mcs"));
        paths.ensure_dirs().unwrap();
        assert!(paths.mcs_home().is_dir());
        assert!(paths.codespaces_root().is_dir());
        assert!(paths.backup_home().is_dir());
    }

    #[test]
    fn atomic_write_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        atomic_write(&path, b"{\"a\":1}").unwrap();
        let read = std::fs::read_to_string(&path).unwrap();
        assert_eq!(read, "{\"a\":1}");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn atomic_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ports.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }
}
