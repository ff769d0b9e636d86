//! Path & Config Store (spec.md §4.1)
//!
//! Exposes the single global JSON configuration document: host IP mode,
//! auto-update state, and their timestamps. Reads create the file with
//! defaults if missing; a malformed file is a fatal error rather than a
//! silent overwrite, so an operator's hand-edits are never clobbered by a
//! parse failure.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors::{McsError, Result};
use crate::paths::{atomic_write, Paths};

/// How the access IP is determined (spec.md §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    #[default]
    Localhost,
    Auto,
    Public,
    Custom,
}

impl std::str::FromStr for IpMode {
    type Err = McsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "localhost" => Ok(Self::Localhost),
            "auto" => Ok(Self::Auto),
            "public" => Ok(Self::Public),
            "custom" => Ok(Self::Custom),
            other => Err(McsError::validation(format!("unknown ip_mode: {other}"))),
        }
    }
}

/// Global engine configuration (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub host_ip: String,
    pub ip_mode: IpMode,
    pub auto_detect_ip: bool,

    pub auto_update_enabled: bool,
    pub auto_update_check_interval: u64,
    pub last_update_check: u64,
    pub last_known_version: String,

    pub created_at: u64,
    pub updated_at: u64,

    /// Fields unknown to this version of the engine, preserved verbatim on
    /// round-trip (spec.md §6, "unknown fields preserved").
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

const MIN_UPDATE_CHECK_INTERVAL: u64 = 3600;

impl Default for GlobalConfig {
    fn default() -> Self {
        let now = unix_now();
        Self {
            host_ip: "localhost".to_string(),
            ip_mode: IpMode::Localhost,
            auto_detect_ip: false,
            auto_update_enabled: true,
            auto_update_check_interval: 86_400,
            last_update_check: 0,
            last_known_version: String::new(),
            created_at: now,
            updated_at: now,
            extra: serde_json::Map::new(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Process-wide configuration singleton, backed by a JSON file.
///
/// Read-modify-write is serialized by a process-local mutex and made
/// crash-safe by [`atomic_write`] (write `.tmp`, fsync, rename). Concurrent
/// writes from other processes are out of scope (spec.md §4.1: single-user
/// tool).
pub struct ConfigStore {
    paths: Paths,
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths, lock: Mutex::new(()) }
    }

    /// Read the config file, creating it with defaults if missing.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<GlobalConfig> {
        let _guard = self.lock.lock().map_err(|_| McsError::internal("config lock poisoned"))?;
        self.load_locked()
    }

    fn load_locked(&self) -> Result<GlobalConfig> {
        let path = self.paths.config_file();
        if !path.exists() {
            debug!(path = %path.display(), "config file missing, creating defaults");
            let config = GlobalConfig::default();
            self.save_locked(&config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| McsError::filesystem(format!("reading {}: {e}", path.display())))?;

        serde_json::from_str(&content).map_err(|e| {
            McsError::validation(format!(
                "config file at {} is malformed and will not be overwritten: {e}",
                path.display()
            ))
        })
    }

    /// Atomically rewrite the config file.
    #[instrument(skip(self, config))]
    pub fn save(&self, config: &GlobalConfig) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| McsError::internal("config lock poisoned"))?;
        self.save_locked(config)
    }

    fn save_locked(&self, config: &GlobalConfig) -> Result<()> {
        self.paths.ensure_dirs()?;
        let json = serde_json::to_vec_pretty(config)?;
        atomic_write(&self.paths.config_file(), &json)
    }

    /// Read-modify-write: load, apply `f`, bump `updated_at`, save.
    fn update(&self, f: impl FnOnce(&mut GlobalConfig)) -> Result<GlobalConfig> {
        let _guard = self.lock.lock().map_err(|_| McsError::internal("config lock poisoned"))?;
        let mut config = self.load_locked()?;
        f(&mut config);
        config.updated_at = unix_now();
        self.save_locked(&config)?;
        Ok(config)
    }

    pub fn set_ip_mode(&self, mode: IpMode) -> Result<GlobalConfig> {
        self.update(|c| c.ip_mode = mode)
    }

    pub fn set_host_ip(&self, ip: impl Into<String>) -> Result<GlobalConfig> {
        let ip = ip.into();
        self.update(|c| c.host_ip = ip)
    }

    pub fn set_auto_update_enabled(&self, enabled: bool) -> Result<GlobalConfig> {
        self.update(|c| c.auto_update_enabled = enabled)
    }

    pub fn set_auto_update_check_interval(&self, seconds: u64) -> Result<GlobalConfig> {
        if seconds < MIN_UPDATE_CHECK_INTERVAL {
            return Err(McsError::validation(format!(
                "auto_update_check_interval must be >= {MIN_UPDATE_CHECK_INTERVAL} seconds"
            )));
        }
        self.update(|c| c.auto_update_check_interval = seconds)
    }

    pub fn record_update_check(&self, known_version: impl Into<String>) -> Result<GlobalConfig> {
        let known_version = known_version.into();
        self.update(|c| {
            c.last_update_check = unix_now();
            c.last_known_version = known_version;
        })
    }

    /// True iff auto-update is enabled and the interval has elapsed (spec.md §4.1).
    #[instrument(skip(self))]
    pub fn should_check_for_update(&self) -> Result<bool> {
        let config = self.load()?;
        if !config.auto_update_enabled {
            return Ok(false);
        }
        let now = unix_now();
        Ok(now.saturating_sub(config.last_update_check) >= config.auto_update_check_interval)
    }

    /// Combine `ip_mode` with live network detection (spec.md §4.1).
    #[instrument(skip(self))]
    pub async fn get_access_ip(&self) -> Result<String> {
        let config = self.load()?;
        match config.ip_mode {
            IpMode::Localhost => Ok("localhost".to_string()),
            IpMode::Auto => Ok(crate::net::local_ipv4()?.to_string()),
            IpMode::Custom => Ok(config.host_ip),
            IpMode::Public => match crate::net::public_ip().await {
                Ok(ip) => Ok(ip),
                Err(e) => {
                    warn!(error = %e, "public IP lookup failed, falling back to auto");
                    Ok(crate::net::local_ipv4()?.to_string())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempdir().unwrap();
        let paths = Paths::with_mcs_home(dir.path().join(".mcs"));
        (dir, ConfigStore::new(paths))
    }

    #[test]
    fn load_creates_defaults_when_missing() {
        let (_dir, store) = store();
        let config = store.load().unwrap();
        assert_eq!(config.ip_mode, IpMode::Localhost);
        assert!(store.paths.config_file().exists());
    }

    #[test]
    fn round_trip_preserves_declared_fields() {
        let (_dir, store) = store();
        let config = store.load().unwrap();
        store.save(&config).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn round_trip_preserves_unknown_fields() {
        let (_dir, store) = store();
        let path = store.paths.config_file();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{
                "hostIp": "localhost",
                "ipMode": "localhost",
                "autoDetectIp": false,
                "autoUpdateEnabled": true,
                "autoUpdateCheckInterval": 86400,
                "lastUpdateCheck": 0,
                "lastKnownVersion": "",
                "createdAt": 1,
                "updatedAt": 1,
                "futureField": "keep-me"
            }"#,
        )
        .unwrap();
        let config = store.load().unwrap();
        assert_eq!(config.extra.get("futureField").unwrap(), "keep-me");
        store.save(&config).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.extra.get("futureField").unwrap(), "keep-me");
    }

    #[test]
    fn malformed_file_is_not_overwritten() {
        let (_dir, store) = store();
        let path = store.paths.config_file();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(store.load().is_err());
        // still malformed - we must not have silently overwritten it
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn should_check_for_update_gate() {
        let (_dir, store) = store();
        store.set_auto_update_enabled(true).unwrap();
        store.set_auto_update_check_interval(86_400).unwrap();
        let now = unix_now();
        store
            .update(|c| c.last_update_check = now - 1000)
            .unwrap();
        assert!(!store.should_check_for_update().unwrap());

        store
            .update(|c| c.last_update_check = now - 90_000)
            .unwrap();
        assert!(store.should_check_for_update().unwrap());
    }

    #[test]
    fn interval_below_minimum_rejected() {
        let (_dir, store) = store();
        assert!(store.set_auto_update_check_interval(60).is_err());
    }

    #[tokio::test]
    async fn access_ip_localhost_mode() {
        let (_dir, store) = store();
        store.set_ip_mode(IpMode::Localhost).unwrap();
        assert_eq!(store.get_access_ip().await.unwrap(), "localhost");
    }

    #[tokio::test]
    async fn access_ip_custom_mode_uses_host_ip() {
        let (_dir, store) = store();
        store.set_ip_mode(IpMode::Custom).unwrap();
        store.set_host_ip("10.1.2.3").unwrap();
        assert_eq!(store.get_access_ip().await.unwrap(), "10.1.2.3");
    }
}
