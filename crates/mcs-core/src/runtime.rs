//! Container runtime abstraction (spec.md §4.7, §6 "the engine speaks to a
//! local container runtime via its compose-style CLI and its inspect/stats
//! APIs")
//!
//! Shells out to the configured runtime binary's `compose` subcommand,
//! following the same `Command::new(path).args(...).output()` +
//! `spawn_blocking` pattern the teacher's own Docker client uses, generalized
//! from per-project CLI plumbing to the handful of verbs the Lifecycle
//! Manager needs: `up -d`, `down`, `ps`, `inspect`, `stats`, `exec`.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{McsError, Result};

/// Live status of a codespace's container, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    Running,
    Stopped,
    Missing,
}

/// Resource usage snapshot (spec.md §4.7 `Info`: "container stats (CPU, memory)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
}

/// Result of an `exec` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over the container runtime, so the Lifecycle Manager can be
/// tested against a fake implementation rather than a real daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn up(&self, compose_file: &Path) -> Result<()>;
    async fn down(&self, compose_file: &Path) -> Result<()>;
    async fn status(&self, container_name: &str) -> Result<RuntimeStatus>;
    async fn stats(&self, container_name: &str) -> Result<ContainerStats>;
    async fn exec(&self, container_name: &str, argv: &[String]) -> Result<ExecResult>;
}

/// Drives the runtime via its CLI binary (default `docker`).
pub struct CliRuntime {
    binary: String,
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, args: &[String]) -> Result<std::process::Output> {
        debug!(binary = %self.binary, args = ?args, "invoking container runtime");
        std::process::Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| McsError::runtime(format!("failed to invoke {}: {e}", self.binary)))
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    #[instrument(skip(self))]
    async fn up(&self, compose_file: &Path) -> Result<()> {
        let binary = self.binary.clone();
        let compose_file = compose_file.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let runtime = CliRuntime::new(binary);
            let output = runtime.run(&[
                "compose".to_string(),
                "-f".to_string(),
                compose_file.to_string_lossy().to_string(),
                "up".to_string(),
                "-d".to_string(),
            ])?;
            if !output.status.success() {
                return Err(McsError::runtime(String::from_utf8_lossy(&output.stderr).to_string()));
            }
            Ok(())
        })
        .await
        .map_err(|e| McsError::internal(format!("runtime task join error: {e}")))?
    }

    #[instrument(skip(self))]
    async fn down(&self, compose_file: &Path) -> Result<()> {
        let binary = self.binary.clone();
        let compose_file = compose_file.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let runtime = CliRuntime::new(binary);
            let output = runtime.run(&[
                "compose".to_string(),
                "-f".to_string(),
                compose_file.to_string_lossy().to_string(),
                "down".to_string(),
            ])?;
            if !output.status.success() {
                return Err(McsError::runtime(String::from_utf8_lossy(&output.stderr).to_string()));
            }
            Ok(())
        })
        .await
        .map_err(|e| McsError::internal(format!("runtime task join error: {e}")))?
    }

    #[instrument(skip(self))]
    async fn status(&self, container_name: &str) -> Result<RuntimeStatus> {
        let binary = self.binary.clone();
        let container_name = container_name.to_string();
        tokio::task::spawn_blocking(move || {
            let runtime = CliRuntime::new(binary);
            let output = runtime.run(&[
                "inspect".to_string(),
                "--format".to_string(),
                "{{.State.Status}}".to_string(),
                container_name,
            ])?;
            if !output.status.success() {
                return Ok(RuntimeStatus::Missing);
            }
            let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(match state.as_str() {
                "running" => RuntimeStatus::Running,
                "" => RuntimeStatus::Missing,
                _ => RuntimeStatus::Stopped,
            })
        })
        .await
        .map_err(|e| McsError::internal(format!("runtime task join error: {e}")))?
    }

    #[instrument(skip(self))]
    async fn stats(&self, container_name: &str) -> Result<ContainerStats> {
        let binary = self.binary.clone();
        let container_name = container_name.to_string();
        tokio::task::spawn_blocking(move || {
            let runtime = CliRuntime::new(binary);
            let output = runtime.run(&[
                "stats".to_string(),
                "--no-stream".to_string(),
                "--format".to_string(),
                "{{.CPUPerc}},{{.MemUsage}}".to_string(),
                container_name,
            ])?;
            if !output.status.success() {
                return Err(McsError::runtime(String::from_utf8_lossy(&output.stderr).to_string()));
            }
            parse_stats_line(String::from_utf8_lossy(&output.stdout).trim())
        })
        .await
        .map_err(|e| McsError::internal(format!("runtime task join error: {e}")))?
    }

    #[instrument(skip(self))]
    async fn exec(&self, container_name: &str, argv: &[String]) -> Result<ExecResult> {
        let binary = self.binary.clone();
        let container_name = container_name.to_string();
        let argv = argv.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut args = vec!["exec".to_string(), container_name];
            args.extend(argv);
            let runtime = CliRuntime::new(binary);
            let output = runtime.run(&args)?;
            Ok(ExecResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        })
        .await
        .map_err(|e| McsError::internal(format!("runtime task join error: {e}")))?
    }
}

/// Parse `docker stats` output of the form `12.34%,100MiB / 2GiB`.
fn parse_stats_line(line: &str) -> Result<ContainerStats> {
    let (cpu_part, mem_part) = line
        .split_once(',')
        .ok_or_else(|| McsError::internal(format!("unparseable stats line: {line}")))?;

    let cpu_percent = cpu_part
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| McsError::internal(format!("bad CPU percent '{cpu_part}': {e}")))?;

    let (usage_str, limit_str) = mem_part
        .split_once('/')
        .ok_or_else(|| McsError::internal(format!("unparseable memory field: {mem_part}")))?;

    Ok(ContainerStats {
        cpu_percent,
        memory_usage_bytes: parse_byte_size(usage_str.trim())?,
        memory_limit_bytes: parse_byte_size(limit_str.trim())?,
    })
}

fn parse_byte_size(text: &str) -> Result<u64> {
    text.parse::<bytesize::ByteSize>()
        .map(|b| b.as_u64())
        .map_err(|e| McsError::internal(format!("bad byte size '{text}': {e}")))
}

/// In-memory fake used by `lifecycle.rs`'s unit tests so they don't require a
/// real container runtime on the test machine.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRuntime {
        pub up_calls: Mutex<Vec<std::path::PathBuf>>,
        pub down_calls: Mutex<Vec<std::path::PathBuf>>,
        pub statuses: Mutex<HashMap<String, RuntimeStatus>>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, container_name: impl Into<String>, status: RuntimeStatus) {
            self.statuses.lock().unwrap().insert(container_name.into(), status);
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn up(&self, compose_file: &Path) -> Result<()> {
            self.up_calls.lock().unwrap().push(compose_file.to_path_buf());
            Ok(())
        }

        async fn down(&self, compose_file: &Path) -> Result<()> {
            self.down_calls.lock().unwrap().push(compose_file.to_path_buf());
            Ok(())
        }

        async fn status(&self, container_name: &str) -> Result<RuntimeStatus> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .get(container_name)
                .cloned()
                .unwrap_or(RuntimeStatus::Missing))
        }

        async fn stats(&self, _container_name: &str) -> Result<ContainerStats> {
            Ok(ContainerStats { cpu_percent: 0.0, memory_usage_bytes: 0, memory_limit_bytes: 0 })
        }

        async fn exec(&self, _container_name: &str, _argv: &[String]) -> Result<ExecResult> {
            Ok(ExecResult { exit_code: 0, stdout: String::new(), stderr: String::new() })
        }
    }
}
