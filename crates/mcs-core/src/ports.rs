//! Port Registry (spec.md §4.2)
//!
//! A persistent map of allocated port -> {codespace, service, timestamp},
//! concurrency-safe via a process-local mutex, with collision avoidance
//! against both the registry file and a live `bind()` probe.

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors::{McsError, Result};
use crate::paths::{atomic_write, Paths};

/// A single port allocation (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub port: u16,
    pub codespace: String,
    pub service: String,
    pub allocated_at: u64,
}

/// Default port ranges per service (spec.md §4.2).
fn range_for_service(service: &str) -> RangeInclusive<u16> {
    match service {
        "vscode" => 8080..=8099,
        "app" => 3000..=3099,
        "api" => 5000..=5099,
        "db" => 5432..=5532,
        _ => 10000..=20000,
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Registry JSON file is keyed by port-as-string (spec.md §6, §9: "must
/// remain bit-compatible for migration").
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(flatten)]
    allocations: BTreeMap<String, Allocation>,
}

/// Persistent, crash-safe port allocator.
pub struct PortRegistry {
    paths: Paths,
    lock: Mutex<()>,
}

impl PortRegistry {
    pub fn new(paths: Paths) -> Self {
        Self { paths, lock: Mutex::new(()) }
    }

    fn load_locked(&self) -> Result<RegistryFile> {
        let path = self.paths.ports_file();
        if !path.exists() {
            return Ok(RegistryFile::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| McsError::filesystem(format!("reading {}: {e}", path.display())))?;
        if content.trim().is_empty() {
            return Ok(RegistryFile::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| McsError::internal(format!("ports.json is malformed: {e}")))
    }

    fn save_locked(&self, file: &RegistryFile) -> Result<()> {
        self.paths.ensure_dirs()?;
        let json = serde_json::to_vec_pretty(file)?;
        atomic_write(&self.paths.ports_file(), &json)
    }

    /// Probe whether `port` is free: absent from the registry AND bindable.
    fn is_free(file: &RegistryFile, port: u16) -> bool {
        if file.allocations.contains_key(&port.to_string()) {
            return false;
        }
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }

    /// Allocate a port for `service`, scanning forward from a random start
    /// within the service's range (spec.md §4.2 algorithm).
    #[instrument(skip(self))]
    pub fn allocate(&self, codespace: &str, service: &str) -> Result<u16> {
        let _guard =
            self.lock.lock().map_err(|_| McsError::internal("port registry lock poisoned"))?;
        let mut file = self.load_locked()?;

        let range = range_for_service(service);
        let span = (*range.end() - *range.start()) as u32 + 1;
        let start_offset = fastrand::u32(..span);

        for i in 0..span {
            let port = range.start() + ((start_offset + i) % span) as u16;
            if Self::is_free(&file, port) {
                file.allocations.insert(
                    port.to_string(),
                    Allocation {
                        port,
                        codespace: codespace.to_string(),
                        service: service.to_string(),
                        allocated_at: unix_now(),
                    },
                );
                self.save_locked(&file)?;
                debug!(port, service, codespace, "allocated port");
                return Ok(port);
            }
        }

        Err(McsError::conflict(format!(
            "no ports available for service '{service}' in range {}-{}",
            range.start(),
            range.end()
        )))
    }

    /// Atomically allocate both `vscode` and `app` ports. If the second
    /// allocation fails, the first is released before returning the error
    /// (spec.md §4.2, §8 scenario 3).
    #[instrument(skip(self))]
    pub fn allocate_codespace(&self, codespace: &str) -> Result<BTreeMap<String, u16>> {
        let vscode = self.allocate(codespace, "vscode")?;
        match self.allocate(codespace, "app") {
            Ok(app) => {
                let mut ports = BTreeMap::new();
                ports.insert("vscode".to_string(), vscode);
                ports.insert("app".to_string(), app);
                Ok(ports)
            }
            Err(e) => {
                if let Err(release_err) = self.release(vscode) {
                    warn!(error = %release_err, "failed to roll back vscode port allocation");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub fn release(&self, port: u16) -> Result<()> {
        let _guard =
            self.lock.lock().map_err(|_| McsError::internal("port registry lock poisoned"))?;
        let mut file = self.load_locked()?;
        file.allocations.remove(&port.to_string());
        self.save_locked(&file)
    }

    #[instrument(skip(self))]
    pub fn release_codespace(&self, codespace: &str) -> Result<usize> {
        let _guard =
            self.lock.lock().map_err(|_| McsError::internal("port registry lock poisoned"))?;
        let mut file = self.load_locked()?;
        let before = file.allocations.len();
        file.allocations.retain(|_, a| a.codespace != codespace);
        let removed = before - file.allocations.len();
        self.save_locked(&file)?;
        Ok(removed)
    }

    pub fn get_codespace(&self, codespace: &str) -> Result<Vec<Allocation>> {
        let _guard =
            self.lock.lock().map_err(|_| McsError::internal("port registry lock poisoned"))?;
        let file = self.load_locked()?;
        Ok(file.allocations.values().filter(|a| a.codespace == codespace).cloned().collect())
    }

    /// Remove allocations whose codespace directory no longer exists.
    /// Never called implicitly from `allocate` (spec.md §4.2: "avoids read
    /// amplification").
    #[instrument(skip(self))]
    pub fn cleanup_stale(&self) -> Result<usize> {
        let _guard =
            self.lock.lock().map_err(|_| McsError::internal("port registry lock poisoned"))?;
        let mut file = self.load_locked()?;
        let root = self.paths.codespaces_root();
        let before = file.allocations.len();
        file.allocations.retain(|_, a| root.join(&a.codespace).is_dir());
        let removed = before - file.allocations.len();
        if removed > 0 {
            self.save_locked(&file)?;
        }
        Ok(removed)
    }
}
