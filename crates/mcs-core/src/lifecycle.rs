//! Lifecycle Manager (spec.md §4.7)
//!
//! The orchestration façade every CLI command calls into: turns a
//! `CreateOptions` into a running codespace, drives state transitions via
//! the container runtime, and reconstructs `Codespace` records by reading
//! the on-host directory rather than any in-memory index (spec.md §3: "the
//! on-host directory is the ground truth").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{instrument, warn};

use crate::backup::{BackupManager, BackupType};
use crate::components::ComponentRegistry;
use crate::compose::{CodespaceConfig, CompositionBuilder};
use crate::errors::{McsError, Result};
use crate::language;
use crate::name;
use crate::password;
use crate::paths::Paths;
use crate::ports::PortRegistry;
use crate::progress::{CloneProgress, LifecycleEvent, ProgressSink};
use crate::repo::{CloneOptions, Depth, ExplicitAuth, RepositoryAcquirer};
use crate::retry::{retry_async, JitterStrategy, RetryConfig, RetryDecision};
use crate::runtime::{ContainerRuntime, ContainerStats, ExecResult, RuntimeStatus};
use crate::IndexMap;

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Lifecycle state of a codespace (spec.md §3, §4.7 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodespaceStatus {
    Created,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for CodespaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The public entity (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Codespace {
    pub name: String,
    pub repository: String,
    pub path: PathBuf,
    pub status: CodespaceStatus,
    pub created_at: u64,
    pub vscode_url: String,
    pub app_url: String,
    pub components: Vec<String>,
    pub language: String,
    pub password: String,
    pub ports: BTreeMap<String, u16>,
}

/// Inputs to `Create` (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub repository: String,
    pub branch: Option<String>,
    pub depth: Option<Depth>,
    pub force_shallow: bool,
    pub explicit_auth: Option<ExplicitAuth>,
    pub components: Vec<String>,
    pub env: IndexMap<String, String>,
    pub extra_volumes: Vec<String>,
    pub extra_networks: Vec<String>,
    pub labels: Vec<String>,
    pub healthcheck: bool,
    pub no_start: bool,
    pub force: bool,
    pub password: Option<String>,
    pub start_timeout: Option<Duration>,
}

impl CreateOptions {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            name: None,
            repository: repository.into(),
            branch: None,
            depth: None,
            force_shallow: false,
            explicit_auth: None,
            components: Vec::new(),
            env: IndexMap::new(),
            extra_volumes: Vec::new(),
            extra_networks: Vec::new(),
            labels: Vec::new(),
            healthcheck: true,
            no_start: false,
            force: false,
            password: None,
            start_timeout: None,
        }
    }
}

fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    if !path.is_file() {
        return Ok(map);
    }
    let content = std::fs::read_to_string(path)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.to_string(), value.to_string());
        }
    }
    Ok(map)
}

fn parse_components_manifest(codespace_dir: &Path) -> Result<Vec<String>> {
    let path = codespace_dir.join("init/components.manifest");
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn ports_from_env(env: &BTreeMap<String, String>) -> BTreeMap<String, u16> {
    let mut ports = BTreeMap::new();
    for (key, value) in env {
        if let Some(service) = key.strip_suffix("_PORT") {
            if let Ok(port) = value.parse::<u16>() {
                ports.insert(service.to_lowercase(), port);
            }
        }
    }
    ports
}

fn classify_clone_error(err: &McsError) -> RetryDecision {
    if err.is_retryable() {
        RetryDecision::Retry
    } else {
        RetryDecision::Stop
    }
}

/// Tracks what `Create` has done so far, so a mid-flight failure can be
/// unwound in reverse order (spec.md §4.7: "container removed → composition
/// files deleted → port allocations released → on-host directory removed →
/// clone directory removed"). Composition files and the clone live inside the
/// same codespace directory, so removing it subsumes both.
struct CreateGuard<'a> {
    name: String,
    codespace_dir: PathBuf,
    ports: &'a PortRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    ports_allocated: bool,
    dir_created: bool,
    container_started: bool,
    disarmed: bool,
}

impl<'a> CreateGuard<'a> {
    fn new(
        name: &str,
        codespace_dir: &Path,
        ports: &'a PortRegistry,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            name: name.to_string(),
            codespace_dir: codespace_dir.to_path_buf(),
            ports,
            runtime,
            ports_allocated: false,
            dir_created: false,
            container_started: false,
            disarmed: false,
        }
    }

    fn disarm(&mut self) {
        self.disarmed = true;
    }

    async fn rollback(&self) {
        if self.disarmed {
            return;
        }
        if self.container_started {
            let compose_path = self.codespace_dir.join("docker-compose.yml");
            if let Err(e) = self.runtime.down(&compose_path).await {
                warn!(codespace = %self.name, error = %e, "rollback: failed to stop container");
            }
        }
        if self.dir_created {
            if let Err(e) = std::fs::remove_dir_all(&self.codespace_dir) {
                warn!(codespace = %self.name, error = %e, "rollback: failed to remove codespace directory");
            }
        }
        if self.ports_allocated {
            if let Err(e) = self.ports.release_codespace(&self.name) {
                warn!(codespace = %self.name, error = %e, "rollback: failed to release port allocations");
            }
        }
    }
}

/// The orchestration façade (spec.md §4.7).
pub struct LifecycleManager {
    paths: Paths,
    ports: PortRegistry,
    components: ComponentRegistry,
    repo: RepositoryAcquirer,
    composer: CompositionBuilder,
    backups: BackupManager,
    runtime: Arc<dyn ContainerRuntime>,
    clone_retry: RetryConfig,
}

impl LifecycleManager {
    pub fn new(paths: Paths, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            ports: PortRegistry::new(paths.clone()),
            components: ComponentRegistry::new(),
            repo: RepositoryAcquirer::new(),
            composer: CompositionBuilder::new(),
            backups: BackupManager::new(paths.clone()),
            runtime,
            // spec.md §7: up to 3 attempts total (1 initial + 2 retries), 5s
            // backoff, applies only to Create/Rebuild's clone step.
            clone_retry: RetryConfig::new(
                2,
                Duration::from_secs(5),
                Duration::from_secs(5),
                JitterStrategy::EqualJitter,
            ),
            paths,
        }
    }

    fn require_codespace_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.paths.codespace_dir(name);
        if !dir.join("docker-compose.yml").is_file() {
            return Err(McsError::not_found(format!("codespace '{name}' not found")));
        }
        Ok(dir)
    }

    async fn wait_for_healthcheck(
        &self,
        name: &str,
        progress: &dyn ProgressSink<LifecycleEvent>,
        timeout: Duration,
    ) -> Result<()> {
        let container_name = format!("{name}-dev");
        let deadline = tokio::time::Instant::now() + timeout;
        let mut attempt = 0u32;
        let max_attempts = (timeout.as_secs() / 2).max(1) as u32;

        loop {
            attempt += 1;
            progress.emit(LifecycleEvent::healthcheck_waiting(name, attempt, max_attempts));

            if self.runtime.status(&container_name).await? == RuntimeStatus::Running {
                progress.emit(LifecycleEvent::healthcheck_ready(name, attempt));
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(McsError::cancelled(format!(
                    "codespace '{name}' did not become healthy within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// `Create(opts) -> Codespace` (spec.md §4.7, steps 1-12).
    #[instrument(skip(self, opts, progress, clone_progress))]
    pub async fn create(
        &self,
        opts: CreateOptions,
        progress: &dyn ProgressSink<LifecycleEvent>,
        clone_progress: Arc<dyn ProgressSink<CloneProgress>>,
    ) -> Result<Codespace> {
        // Step 1: sanitize/validate name, reject on collision unless forced.
        let name = match &opts.name {
            Some(raw) => {
                let sanitized = name::sanitize(raw);
                if !name::is_valid(&sanitized) {
                    return Err(McsError::validation(format!("invalid codespace name: {raw}")));
                }
                sanitized
            }
            None => name::generate(),
        };

        let codespace_dir = self.paths.codespace_dir(&name);
        if codespace_dir.exists() && !opts.force {
            return Err(McsError::conflict(format!("codespace '{name}' already exists")));
        }

        // Steps 2-3 are pre-flight: they must succeed before any filesystem
        // work begins (spec.md §4.7 failure semantics).
        progress.emit(LifecycleEvent::phase_begin(&name, "validate"));
        self.repo.validate(&opts.repository)?;
        progress.emit(LifecycleEvent::phase_end(&name, "validate", true));

        progress.emit(LifecycleEvent::phase_begin(&name, "resolve_components"));
        let component_order = self.components.resolve_order(&opts.components)?;
        progress.emit(LifecycleEvent::phase_end(&name, "resolve_components", true));

        let mut guard = CreateGuard::new(&name, &codespace_dir, &self.ports, self.runtime.clone());
        let result = self
            .create_steps(&name, &codespace_dir, &opts, &component_order, progress, clone_progress, &mut guard)
            .await;

        match result {
            Ok(codespace) => {
                guard.disarm();
                Ok(codespace)
            }
            Err(e) => {
                guard.rollback().await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_steps(
        &self,
        name: &str,
        codespace_dir: &Path,
        opts: &CreateOptions,
        component_order: &[String],
        progress: &dyn ProgressSink<LifecycleEvent>,
        clone_progress: Arc<dyn ProgressSink<CloneProgress>>,
        guard: &mut CreateGuard<'_>,
    ) -> Result<Codespace> {
        // Step 4: allocate ports atomically.
        progress.emit(LifecycleEvent::phase_begin(name, "allocate_ports"));
        let ports = self.ports.allocate_codespace(name)?;
        guard.ports_allocated = true;
        progress.emit(LifecycleEvent::phase_end(name, "allocate_ports", true));

        // Step 5: generate (or validate a caller-supplied) password.
        let codespace_password = match &opts.password {
            Some(p) => {
                password::check_strength(p)?;
                p.clone()
            }
            None => password::generate()?,
        };

        // Step 6: create the on-host directory tree.
        std::fs::create_dir_all(codespace_dir)?;
        guard.dir_created = true;
        for sub in ["src", "data", "config", "logs", "init", "components"] {
            std::fs::create_dir_all(codespace_dir.join(sub))?;
        }

        // Step 7: clone into ./src, retrying only on Auth/Network errors.
        progress.emit(LifecycleEvent::phase_begin(name, "clone"));
        let src_dir = codespace_dir.join("src");
        let clone_opts = CloneOptions {
            url: opts.repository.clone(),
            branch: opts.branch.clone(),
            depth: opts.depth,
            force_shallow: opts.force_shallow,
            explicit_auth: opts.explicit_auth.clone(),
        };
        retry_async(
            &self.clone_retry,
            move || {
                let src_dir = src_dir.clone();
                let clone_opts = clone_opts.clone();
                let clone_progress = clone_progress.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        RepositoryAcquirer::new().clone(&clone_opts, &src_dir, clone_progress.as_ref())
                    })
                    .await
                    .map_err(|e| McsError::internal(format!("clone task join error: {e}")))?
                }
            },
            classify_clone_error,
        )
        .await?;
        progress.emit(LifecycleEvent::phase_end(name, "clone", true));

        // Step 8: detect language and image, factoring in Node.js requirements.
        let src_dir = codespace_dir.join("src");
        let detected = language::detect(&src_dir)?;
        if let Some(dockerfile) = &detected.explicit_dockerfile {
            warn!(
                codespace = name,
                dockerfile,
                "devcontainer dockerFile is not resolved by this engine; falling back to language-based image selection"
            );
        }
        let needs_node = component_order
            .iter()
            .any(|id| self.components.get(id).map(|c| c.requires_node).unwrap_or(false));
        let image = language::select_image(&detected, needs_node);

        // Step 9: stage the initialization package.
        progress.emit(LifecycleEvent::phase_begin(name, "stage_components"));
        if !component_order.is_empty() {
            self.components.stage(&opts.components, codespace_dir)?;
        }
        progress.emit(LifecycleEvent::phase_end(name, "stage_components", true));

        // Step 10: emit the composition, .env, and .credentials.
        progress.emit(LifecycleEvent::phase_begin(name, "build_composition"));
        let config = CodespaceConfig {
            name: name.to_string(),
            image: image.clone(),
            password: codespace_password.clone(),
            ports: ports.clone(),
            language: detected.language.clone(),
            components: component_order.to_vec(),
            env: opts.env.clone(),
            extra_volumes: opts.extra_volumes.clone(),
            extra_networks: opts.extra_networks.clone(),
            labels: opts.labels.clone(),
            healthcheck: opts.healthcheck,
            init_script: None,
        };
        self.composer.build(&config, codespace_dir)?;

        // Step 11: persist metadata. The .env file is authoritative; append
        // the repository URL so List/Info can reconstruct it without a
        // separate index (spec.md §3).
        let env_path = codespace_dir.join(".env");
        let mut env_content = std::fs::read_to_string(&env_path)?;
        env_content.push_str(&format!("REPO_URL={}\n", opts.repository));
        std::fs::write(&env_path, env_content)?;
        progress.emit(LifecycleEvent::phase_end(name, "build_composition", true));

        let mut codespace = Codespace {
            name: name.to_string(),
            repository: opts.repository.clone(),
            path: codespace_dir.to_path_buf(),
            status: CodespaceStatus::Created,
            created_at: unix_now(),
            vscode_url: format!("http://localhost:{}", ports.get("vscode").copied().unwrap_or_default()),
            app_url: format!("http://localhost:{}", ports.get("app").copied().unwrap_or_default()),
            components: component_order.to_vec(),
            language: detected.language,
            password: codespace_password,
            ports,
        };

        // Step 12: start unless the caller asked to skip it.
        if opts.no_start {
            return Ok(codespace);
        }

        progress.emit(LifecycleEvent::phase_begin(name, "start_container"));
        self.runtime.up(&codespace_dir.join("docker-compose.yml")).await?;
        guard.container_started = true;
        self.wait_for_healthcheck(name, progress, opts.start_timeout.unwrap_or(Duration::from_secs(60)))
            .await?;
        progress.emit(LifecycleEvent::phase_end(name, "start_container", true));

        codespace.status = CodespaceStatus::Running;
        Ok(codespace)
    }

    async fn codespace_from_dir(&self, dir: &Path) -> Result<Codespace> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| McsError::internal("codespace directory has no valid name"))?
            .to_string();

        let env = parse_env_file(&dir.join(".env"))?;
        let ports = ports_from_env(&env);
        let components = parse_components_manifest(dir)?;

        let container_name = format!("{name}-dev");
        let status = match self.runtime.status(&container_name).await? {
            RuntimeStatus::Running => CodespaceStatus::Running,
            RuntimeStatus::Stopped => CodespaceStatus::Stopped,
            RuntimeStatus::Missing => CodespaceStatus::Error,
        };

        let created_at = std::fs::metadata(dir)
            .and_then(|m| m.created())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Codespace {
            repository: env.get("REPO_URL").cloned().unwrap_or_default(),
            path: dir.to_path_buf(),
            status,
            created_at,
            vscode_url: format!("http://localhost:{}", ports.get("vscode").copied().unwrap_or_default()),
            app_url: format!("http://localhost:{}", ports.get("app").copied().unwrap_or_default()),
            components,
            language: String::new(),
            password: env.get("PASSWORD").cloned().unwrap_or_default(),
            ports,
            name,
        })
    }

    /// `List` — every subdirectory of the codespaces root with a
    /// `docker-compose.yml`, populated from `.env` plus live container status.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Codespace>> {
        let root = self.paths.codespaces_root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut codespaces = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            if !dir.join("docker-compose.yml").is_file() {
                continue;
            }
            codespaces.push(self.codespace_from_dir(&dir).await?);
        }
        codespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(codespaces)
    }

    /// `Info(name)` — one entry from `List` plus live container stats.
    #[instrument(skip(self))]
    pub async fn info(&self, name: &str) -> Result<(Codespace, ContainerStats)> {
        let dir = self.require_codespace_dir(name)?;
        let codespace = self.codespace_from_dir(&dir).await?;
        let stats = self.runtime.stats(&format!("{name}-dev")).await?;
        Ok((codespace, stats))
    }

    #[instrument(skip(self))]
    pub async fn start(&self, name: &str) -> Result<()> {
        let dir = self.require_codespace_dir(name)?;
        self.runtime.up(&dir.join("docker-compose.yml")).await
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<()> {
        let dir = self.require_codespace_dir(name)?;
        self.runtime.down(&dir.join("docker-compose.yml")).await
    }

    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.start(name).await
    }

    /// `Rebuild` — remove the container, regenerate the composition from the
    /// codespace's persisted `.env` and staged components, then start again.
    /// The source tree and bind-mounted data directories are left untouched;
    /// only the generated files (`docker-compose.yml`, `.env`, `.credentials`,
    /// `components/`, `init/`) are regenerated.
    #[instrument(skip(self, progress))]
    pub async fn rebuild(&self, name: &str, progress: &dyn ProgressSink<LifecycleEvent>) -> Result<Codespace> {
        let dir = self.require_codespace_dir(name)?;
        progress.emit(LifecycleEvent::phase_begin(name, "rebuild"));

        self.runtime.down(&dir.join("docker-compose.yml")).await?;

        let env = parse_env_file(&dir.join(".env"))?;
        let image = env
            .get("DOCKER_IMAGE")
            .cloned()
            .ok_or_else(|| McsError::internal("codespace .env is missing DOCKER_IMAGE"))?;
        let password = env
            .get("PASSWORD")
            .cloned()
            .ok_or_else(|| McsError::internal("codespace .env is missing PASSWORD"))?;
        let ports = ports_from_env(&env);
        let components = parse_components_manifest(&dir)?;
        let detected = language::detect(&dir.join("src"))?;

        if !components.is_empty() {
            self.components.stage(&components, &dir)?;
        }

        let config = CodespaceConfig {
            name: name.to_string(),
            image,
            password,
            ports,
            language: detected.language,
            components,
            env: IndexMap::new(),
            extra_volumes: Vec::new(),
            extra_networks: Vec::new(),
            labels: Vec::new(),
            healthcheck: true,
            init_script: None,
        };
        self.composer.build(&config, &dir)?;

        let env_path = dir.join(".env");
        let mut env_content = std::fs::read_to_string(&env_path)?;
        if let Some(repo_url) = env.get("REPO_URL") {
            if !env_content.contains("REPO_URL=") {
                env_content.push_str(&format!("REPO_URL={repo_url}\n"));
            }
        }
        std::fs::write(&env_path, env_content)?;

        self.runtime.up(&dir.join("docker-compose.yml")).await?;
        self.wait_for_healthcheck(name, progress, Duration::from_secs(60)).await?;

        progress.emit(LifecycleEvent::phase_end(name, "rebuild", true));
        self.codespace_from_dir(&dir).await
    }

    /// `Remove(name, {keep_data})` — stop and remove the container, release
    /// ports, and (unless `keep_data`) delete the on-host directory. A backup
    /// is taken first so destructive removal has a rollback target.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str, keep_data: bool) -> Result<()> {
        let dir = self.require_codespace_dir(name)?;

        if let Err(e) = self.backups.create(BackupType::Destroy, &dir, format!("pre-remove snapshot of '{name}'"))
        {
            warn!(codespace = name, error = %e, "failed to create pre-remove backup, continuing with removal");
        }

        if let Err(e) = self.runtime.down(&dir.join("docker-compose.yml")).await {
            warn!(codespace = name, error = %e, "failed to stop container during remove, continuing");
        }

        self.ports.release_codespace(name)?;

        if !keep_data {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// `Exec(name, argv)` — delegate to the container runtime's exec.
    #[instrument(skip(self, argv))]
    pub async fn exec(&self, name: &str, argv: &[String]) -> Result<ExecResult> {
        self.require_codespace_dir(name)?;
        self.runtime.exec(&format!("{name}-dev"), argv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> (LifecycleManager, Arc<FakeRuntime>) {
        let paths = Paths::with_mcs_home(dir.join(".mcs"));
        let runtime = Arc::new(FakeRuntime::new());
        let manager = LifecycleManager::new(paths, runtime.clone());
        (manager, runtime)
    }

    fn write_fake_codespace(dir: &Path, name: &str, vscode_port: u16, app_port: u16) -> PathBuf {
        let codespace_dir = dir.join("codespaces").join(name);
        std::fs::create_dir_all(codespace_dir.join("src")).unwrap();
        std::fs::write(codespace_dir.join("docker-compose.yml"), "services: {}\n").unwrap();
        std::fs::write(
            codespace_dir.join(".env"),
            format!(
                "CODESPACE_NAME={name}\nPASSWORD=Abcdefghij12\nDOCKER_IMAGE=mcs/codespace-base:latest\n\
                 VSCODE_PORT={vscode_port}\nAPP_PORT={app_port}\nREPO_URL=https://example.com/{name}.git\n"
            ),
        )
        .unwrap();
        codespace_dir
    }

    #[test]
    fn create_options_defaults_are_sensible() {
        let opts = CreateOptions::new("https://example.com/repo.git");
        assert!(opts.components.is_empty());
        assert!(opts.healthcheck);
        assert!(!opts.no_start);
        assert!(!opts.force);
    }

    #[tokio::test]
    async fn create_rejects_name_collision_without_force() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        std::fs::create_dir_all(dir.path().join("codespaces/taken")).unwrap();

        let mut opts = CreateOptions::new("https://example.com/repo.git");
        opts.name = Some("taken".to_string());

        let sink: crate::progress::CollectingSink<LifecycleEvent> = crate::progress::CollectingSink::new();
        let clone_sink: Arc<dyn ProgressSink<CloneProgress>> = Arc::new(crate::progress::NullSink);
        let err = manager.create(opts, &sink, clone_sink).await.unwrap_err();
        assert!(matches!(err, McsError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_reconstructs_codespaces_from_env_and_runtime_status() {
        let dir = tempdir().unwrap();
        let (manager, runtime) = manager(dir.path());
        write_fake_codespace(dir.path(), "demo", 8080, 3000);
        runtime.set_status("demo-dev", RuntimeStatus::Running);

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "demo");
        assert_eq!(listed[0].status, CodespaceStatus::Running);
        assert_eq!(listed[0].repository, "https://example.com/demo.git");
        assert_eq!(listed[0].ports.get("vscode"), Some(&8080));
    }

    #[tokio::test]
    async fn list_reports_missing_container_as_error_status() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        write_fake_codespace(dir.path(), "demo", 8080, 3000);

        let listed = manager.list().await.unwrap();
        assert_eq!(listed[0].status, CodespaceStatus::Error);
    }

    #[tokio::test]
    async fn start_stop_restart_delegate_to_runtime() {
        let dir = tempdir().unwrap();
        let (manager, runtime) = manager(dir.path());
        write_fake_codespace(dir.path(), "demo", 8080, 3000);

        manager.start("demo").await.unwrap();
        manager.stop("demo").await.unwrap();
        manager.restart("demo").await.unwrap();

        assert_eq!(runtime.up_calls.lock().unwrap().len(), 2);
        assert_eq!(runtime.down_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn operations_on_unknown_codespace_are_not_found() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        assert!(matches!(manager.start("ghost").await, Err(McsError::NotFound { .. })));
        assert!(matches!(manager.stop("ghost").await, Err(McsError::NotFound { .. })));
        assert!(matches!(manager.info("ghost").await, Err(McsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn remove_releases_ports_and_deletes_directory() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        let codespace_dir = write_fake_codespace(dir.path(), "demo", 8080, 3000);
        manager.ports.allocate("demo", "vscode").unwrap();

        manager.remove("demo", false).await.unwrap();

        assert!(!codespace_dir.exists());
        assert!(manager.ports.get_codespace("demo").unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_with_keep_data_preserves_directory() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        let codespace_dir = write_fake_codespace(dir.path(), "demo", 8080, 3000);

        manager.remove("demo", true).await.unwrap();
        assert!(codespace_dir.exists());
    }

    #[tokio::test]
    async fn rebuild_regenerates_composition_and_restarts() {
        let dir = tempdir().unwrap();
        let (manager, runtime) = manager(dir.path());
        let codespace_dir = write_fake_codespace(dir.path(), "demo", 8080, 3000);
        std::fs::write(codespace_dir.join("src/package.json"), "{}").unwrap();
        runtime.set_status("demo-dev", RuntimeStatus::Running);

        let sink: crate::progress::CollectingSink<LifecycleEvent> = crate::progress::CollectingSink::new();
        let codespace = manager.rebuild("demo", &sink).await.unwrap();

        assert_eq!(codespace.status, CodespaceStatus::Running);
        let yaml = std::fs::read_to_string(codespace_dir.join("docker-compose.yml")).unwrap();
        assert!(yaml.contains("NODE_ENV"));
        assert_eq!(runtime.up_calls.lock().unwrap().len(), 1);
        assert_eq!(runtime.down_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exec_delegates_to_runtime() {
        let dir = tempdir().unwrap();
        let (manager, _runtime) = manager(dir.path());
        write_fake_codespace(dir.path(), "demo", 8080, 3000);

        let result = manager.exec("demo", &["echo".to_string(), "hi".to_string()]).await.unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    #[ignore = "requires network access to validate a real git remote"]
    async fn full_create_flow_against_a_real_remote() {
        let dir = tempdir().unwrap();
        let (manager, runtime) = manager(dir.path());
        runtime.set_status("smoke-test-dev", RuntimeStatus::Running);

        let mut opts = CreateOptions::new("https://github.com/octocat/Hello-World.git");
        opts.name = Some("smoke-test".to_string());
        opts.no_start = false;

        let sink: crate::progress::CollectingSink<LifecycleEvent> = crate::progress::CollectingSink::new();
        let clone_sink: Arc<dyn ProgressSink<CloneProgress>> = Arc::new(crate::progress::NullSink);
        let codespace = manager.create(opts, &sink, clone_sink).await.unwrap();
        assert_eq!(codespace.status, CodespaceStatus::Running);
    }
}
