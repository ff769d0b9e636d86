//! Composition Builder (spec.md §4.6)
//!
//! From a [`CodespaceConfig`], emits `docker-compose.yml`, `.env`, and
//! `.credentials` into the codespace's on-host directory. YAML is hand-built
//! string formatting rather than routed through a generic serializer, for
//! deterministic key order — the same approach the teacher's own
//! compose-override generator uses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::errors::{McsError, Result};

/// Per-language cache volume and environment additions (spec.md §4.6).
struct LanguageExtras {
    volume_name: &'static str,
    container_path: &'static str,
    env: Vec<(&'static str, String)>,
}

fn language_extras_for(language: &str) -> Option<LanguageExtras> {
    match language {
        "node" => Some(LanguageExtras {
            volume_name: "node_modules",
            container_path: "/workspace/node_modules",
            env: vec![("NODE_ENV", "development".to_string())],
        }),
        "python" => Some(LanguageExtras {
            volume_name: "pip_cache",
            container_path: "/home/coder/.cache/pip",
            env: vec![("PYTHONPATH", "/workspace".to_string())],
        }),
        "go" => Some(LanguageExtras {
            volume_name: "go_modules",
            container_path: "/home/coder/go/pkg/mod",
            env: vec![("GOPATH", "/home/coder/go".to_string())],
        }),
        "rust" => Some(LanguageExtras {
            volume_name: "cargo_cache",
            container_path: "/home/coder/.cargo",
            env: vec![("CARGO_HOME", "/home/coder/.cargo".to_string())],
        }),
        "java" => Some(LanguageExtras {
            volume_name: "maven_cache",
            container_path: "/home/coder/.m2",
            env: vec![("JAVA_HOME", "/usr/lib/jvm/default-java".to_string())],
        }),
        _ => None,
    }
}

/// All the inputs the Composition Builder needs (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct CodespaceConfig {
    pub name: String,
    pub image: String,
    pub password: String,
    pub ports: BTreeMap<String, u16>,
    pub language: String,
    pub components: Vec<String>,
    pub env: IndexMap<String, String>,
    pub extra_volumes: Vec<String>,
    pub extra_networks: Vec<String>,
    pub labels: Vec<String>,
    pub healthcheck: bool,
    pub init_script: Option<PathBuf>,
}

/// Container-side port each service's traffic lands on. `vscode` is
/// code-server's own listener; `app`/`api`/`db` are the container-side
/// defaults a devcontainer process is expected to bind to, matching the
/// base of each range `ports::range_for_service` allocates host ports from.
fn container_port_for_service(service: &str) -> u16 {
    match service {
        "vscode" => 8080,
        "app" => 3000,
        "api" => 5000,
        "db" => 5432,
        _ => 8080,
    }
}

fn escape_yaml_value(value: &str) -> String {
    let needs_escaping = value.contains('\\') || value.contains('"') || value.contains('\n');
    if needs_escaping {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
        format!("\"{escaped}\"")
    } else {
        format!("\"{value}\"")
    }
}

/// Emits `docker-compose.yml`, `.env`, and `.credentials` for one codespace.
pub struct CompositionBuilder {
    runtime_binary: String,
}

impl Default for CompositionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionBuilder {
    pub fn new() -> Self {
        Self { runtime_binary: "docker".to_string() }
    }

    pub fn with_runtime_binary(mut self, binary: impl Into<String>) -> Self {
        self.runtime_binary = binary.into();
        self
    }

    /// Write the composition, `.env`, and `.credentials` into `codespace_dir`
    /// and run `compose config` against it when the runtime CLI is on `PATH`.
    #[instrument(skip(self, config))]
    pub fn build(&self, config: &CodespaceConfig, codespace_dir: &Path) -> Result<()> {
        let yaml = self.render_yaml(config);
        let compose_path = codespace_dir.join("docker-compose.yml");
        std::fs::write(&compose_path, &yaml)?;

        let env_content = self.render_env_file(config);
        std::fs::write(codespace_dir.join(".env"), env_content)?;

        let credentials = self.render_credentials(config);
        let credentials_path = codespace_dir.join(".credentials");
        std::fs::write(&credentials_path, credentials)?;
        set_owner_read_write_only(&credentials_path)?;

        self.validate(&compose_path)?;
        Ok(())
    }

    fn render_yaml(&self, config: &CodespaceConfig) -> String {
        let service = format!("{}-dev", config.name);
        let mut yaml = String::from("services:\n");
        yaml.push_str(&format!("  {service}:\n"));
        yaml.push_str(&format!("    image: {}\n", escape_yaml_value(&config.image)));
        yaml.push_str(&format!("    container_name: {}\n", escape_yaml_value(&service)));
        yaml.push_str("    restart: unless-stopped\n");

        yaml.push_str("    environment:\n");
        yaml.push_str(&format!("      PASSWORD: {}\n", escape_yaml_value(&config.password)));
        yaml.push_str("      TZ: \"${TZ:-UTC}\"\n");
        yaml.push_str("      DOCKER_USER: \"${DOCKER_USER:-coder}\"\n");
        if !config.components.is_empty() {
            yaml.push_str(&format!(
                "      CODESPACE_COMPONENTS: {}\n",
                escape_yaml_value(&config.components.join(","))
            ));
        }
        if let Some(extras) = language_extras_for(&config.language) {
            for (key, value) in &extras.env {
                yaml.push_str(&format!("      {key}: {}\n", escape_yaml_value(value)));
            }
        }
        for (key, value) in &config.env {
            yaml.push_str(&format!("      {key}: {}\n", escape_yaml_value(value)));
        }

        if !config.ports.is_empty() {
            yaml.push_str("    ports:\n");
            for (service_name, host_port) in &config.ports {
                let container_port = container_port_for_service(service_name);
                yaml.push_str(&format!("      - \"{host_port}:{container_port}\"\n"));
            }
        }

        yaml.push_str("    volumes:\n");
        let home = format!("/home/coder/{}", config.name);
        yaml.push_str(&format!("      - ./src:{home}\n"));
        yaml.push_str("      - ./data:/home/coder/.local/share/code-server\n");
        yaml.push_str("      - ./config:/home/coder/.config\n");
        yaml.push_str("      - ./logs:/home/coder/logs\n");
        yaml.push_str("      - ~/.ssh:/home/coder/.ssh:ro\n");
        yaml.push_str("      - ${MCS_TOKENS_DIR:-~/.mcs/tokens}:/home/coder/.mcs-tokens:ro\n");
        if !config.components.is_empty() {
            yaml.push_str("      - ./components:/opt/codespace/components:ro\n");
            yaml.push_str("      - ./init:/home/coder/.codespace-init\n");
        }
        if let Some(extras) = language_extras_for(&config.language) {
            yaml.push_str(&format!("      - {}:{}\n", extras.volume_name, extras.container_path));
        }
        for volume in &config.extra_volumes {
            yaml.push_str(&format!("      - {volume}\n"));
        }

        yaml.push_str("    networks:\n");
        yaml.push_str(&format!("      - {}-network\n", config.name));
        for network in &config.extra_networks {
            yaml.push_str(&format!("      - {network}\n"));
        }

        if !config.labels.is_empty() {
            yaml.push_str("    labels:\n");
            for label in &config.labels {
                yaml.push_str(&format!("      - {}\n", escape_yaml_value(label)));
            }
        }

        if !config.components.is_empty() {
            let init_script = config
                .init_script
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "/opt/codespace/components/init.sh".to_string());
            yaml.push_str("    entrypoint:\n");
            yaml.push_str("      - /bin/sh\n");
            yaml.push_str("      - -c\n");
            yaml.push_str(&format!(
                "      - \"sh {init_script} && exec code-server --bind-addr 0.0.0.0:8080 --auth password {home}\"\n"
            ));
        } else {
            yaml.push_str(&format!(
                "    command: [\"--bind-addr\", \"0.0.0.0:8080\", \"--auth\", \"password\", \"{home}\"]\n"
            ));
        }

        if config.healthcheck {
            yaml.push_str("    healthcheck:\n");
            yaml.push_str("      test: [\"CMD\", \"curl\", \"-f\", \"http://localhost:8080/healthz\"]\n");
            yaml.push_str("      interval: 30s\n");
            yaml.push_str("      timeout: 10s\n");
            yaml.push_str("      retries: 3\n");
            yaml.push_str("      start_period: 40s\n");
        }

        yaml.push_str(&format!("\nnetworks:\n  {}-network:\n    driver: bridge\n", config.name));
        for network in &config.extra_networks {
            yaml.push_str(&format!("  {network}:\n    external: true\n"));
        }

        if let Some(extras) = language_extras_for(&config.language) {
            yaml.push_str(&format!("\nvolumes:\n  {}:\n", extras.volume_name));
        }

        yaml
    }

    fn render_env_file(&self, config: &CodespaceConfig) -> String {
        let mut lines = Vec::new();
        lines.push("# Generated by mcs; do not edit by hand".to_string());
        lines.push(format!("CODESPACE_NAME={}", config.name));
        lines.push(format!("CONTAINER_NAME={}-dev", config.name));
        if let Some(vscode_port) = config.ports.get("vscode") {
            lines.push(format!("VS_CODE_PORT={vscode_port}"));
        }
        lines.push(format!("PASSWORD={}", config.password));
        lines.push(format!("DOCKER_IMAGE={}", config.image));
        for (service, port) in &config.ports {
            lines.push(format!("{}_PORT={port}", service.to_uppercase()));
        }
        lines.join("\n") + "\n"
    }

    fn render_credentials(&self, config: &CodespaceConfig) -> String {
        format!(
            "# MCS recovery credentials for '{}'\n# Keep this file private; mode 0600.\npassword={}\nvscode_url=http://localhost:{}\n",
            config.name,
            config.password,
            config.ports.get("vscode").copied().unwrap_or_default(),
        )
    }

    /// Shell out to `<runtime> compose -f <file> config` when the binary is
    /// discoverable on `PATH` (spec.md §4.6's validation step).
    fn validate(&self, compose_path: &Path) -> Result<()> {
        let which = std::process::Command::new("which").arg(&self.runtime_binary).output();
        let available = matches!(which, Ok(out) if out.status.success());
        if !available {
            warn!(runtime = %self.runtime_binary, "runtime binary not on PATH, skipping compose validation");
            return Ok(());
        }

        let output = std::process::Command::new(&self.runtime_binary)
            .args(["compose", "-f"])
            .arg(compose_path)
            .arg("config")
            .output()
            .map_err(|e| McsError::runtime(format!("invoking compose config: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(McsError::validation(format!("generated compose file is invalid: {stderr}")));
        }
        debug!(path = %compose_path.display(), "compose file validated");
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_read_write_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_read_write_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_config(name: &str) -> CodespaceConfig {
        let mut ports = BTreeMap::new();
        ports.insert("vscode".to_string(), 8080);
        ports.insert("app".to_string(), 3000);
        CodespaceConfig {
            name: name.to_string(),
            image: "mcs/codespace-node:latest".to_string(),
            password: "Abcdefghij12".to_string(),
            ports,
            language: "node".to_string(),
            components: vec![],
            env: IndexMap::new(),
            extra_volumes: vec![],
            extra_networks: vec![],
            labels: vec![],
            healthcheck: true,
            init_script: None,
        }
    }

    #[test]
    fn renders_expected_service_name_and_ports() {
        let builder = CompositionBuilder::new();
        let yaml = builder.render_yaml(&sample_config("hello"));
        assert!(yaml.contains("hello-dev:"));
        assert!(yaml.contains("\"8080:8080\""));
        assert!(yaml.contains("\"3000:3000\""));
        assert!(yaml.contains("NODE_ENV"));
    }

    #[test]
    fn components_selected_changes_entrypoint_and_mounts() {
        let builder = CompositionBuilder::new();
        let mut config = sample_config("withcomp");
        config.components = vec!["github-cli".to_string()];
        let yaml = builder.render_yaml(&config);
        assert!(yaml.contains("entrypoint:"));
        assert!(yaml.contains("./components:/opt/codespace/components:ro"));
        assert!(yaml.contains("CODESPACE_COMPONENTS"));
    }

    #[test]
    fn no_components_uses_direct_command() {
        let builder = CompositionBuilder::new();
        let yaml = builder.render_yaml(&sample_config("plain"));
        assert!(yaml.contains("command:"));
        assert!(!yaml.contains("entrypoint:"));
    }

    #[test]
    fn env_file_has_required_keys() {
        let builder = CompositionBuilder::new();
        let env = builder.render_env_file(&sample_config("hello"));
        assert!(env.contains("CODESPACE_NAME=hello"));
        assert!(env.contains("REPO_URL=") == false); // REPO_URL is added by the Lifecycle Manager, not here
        assert!(env.contains("VS_CODE_PORT=8080"));
        assert!(env.contains("PASSWORD=Abcdefghij12"));
        assert!(env.contains("DOCKER_IMAGE=mcs/codespace-node:latest"));
    }

    #[test]
    fn build_writes_all_three_files_and_sets_credentials_mode() {
        let dir = tempdir().unwrap();
        let builder = CompositionBuilder::new().with_runtime_binary("mcs-definitely-not-installed");
        builder.build(&sample_config("hello"), dir.path()).unwrap();

        assert!(dir.path().join("docker-compose.yml").is_file());
        assert!(dir.path().join(".env").is_file());
        let credentials_path = dir.path().join(".credentials");
        assert!(credentials_path.is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&credentials_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn each_service_port_maps_to_its_own_container_port() {
        let builder = CompositionBuilder::new();
        let mut config = sample_config("ports");
        config.ports.insert("api".to_string(), 5001);
        config.ports.insert("db".to_string(), 5433);
        let yaml = builder.render_yaml(&config);
        assert!(yaml.contains("\"8080:8080\""));
        assert!(yaml.contains("\"3000:3000\""));
        assert!(yaml.contains("\"5001:5000\""));
        assert!(yaml.contains("\"5433:5432\""));
    }

    #[test]
    fn escape_yaml_value_quotes_everything_safely() {
        assert_eq!(escape_yaml_value("plain"), "\"plain\"");
        assert_eq!(escape_yaml_value("has\"quote"), "\"has\\\"quote\"");
    }
}
