//! Component Registry & Resolver (spec.md §3, §4.5)
//!
//! A static, compiled-in registry of installable components plus a
//! dependency resolver that turns a user selection into an install-ordered,
//! cycle-free list, and a stager that writes the initialization package
//! consumed by the container's entrypoint.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::{McsError, Result};

/// A static, compiled-in component descriptor (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Relative path under the embedded installer asset store, e.g.
    /// `installers/claude-flow.sh`. Opaque to the engine (spec.md §1).
    pub installer: String,
    pub dependencies: Vec<String>,
    /// Whether this component's closure requires Node.js, used by the
    /// Language Detector's `+node` image variant selection (spec.md §4.4).
    pub requires_node: bool,
}

/// Installer script bodies, embedded at compile time so the registry never
/// depends on files being present on the host running `mcs` (spec.md §4.5).
fn installer_source(id: &str) -> Option<&'static str> {
    match id {
        "claude-flow" => Some(include_str!("../assets/installers/claude-flow.sh")),
        "node-runtime" => Some(include_str!("../assets/installers/node-runtime.sh")),
        "github-cli" => Some(include_str!("../assets/installers/github-cli.sh")),
        "docker-cli" => Some(include_str!("../assets/installers/docker-cli.sh")),
        _ => None,
    }
}

/// The curated default component set.
fn default_registry() -> Vec<Component> {
    vec![
        Component {
            id: "claude-flow".to_string(),
            name: "Claude Flow".to_string(),
            description: "AI coding assistant CLI".to_string(),
            installer: "installers/claude-flow.sh".to_string(),
            dependencies: vec!["node-runtime".to_string()],
            requires_node: true,
        },
        Component {
            id: "node-runtime".to_string(),
            name: "Node.js runtime".to_string(),
            description: "Node.js and npm".to_string(),
            installer: "installers/node-runtime.sh".to_string(),
            dependencies: vec![],
            requires_node: true,
        },
        Component {
            id: "github-cli".to_string(),
            name: "GitHub CLI".to_string(),
            description: "gh command-line tool".to_string(),
            installer: "installers/github-cli.sh".to_string(),
            dependencies: vec![],
            requires_node: false,
        },
        Component {
            id: "docker-cli".to_string(),
            name: "Docker CLI".to_string(),
            description: "Docker client for docker-in-docker workflows".to_string(),
            installer: "installers/docker-cli.sh".to_string(),
            dependencies: vec![],
            requires_node: false,
        },
    ]
}

/// Enumerates and resolves components.
pub struct ComponentRegistry {
    by_id: HashMap<String, Component>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        let by_id = default_registry().into_iter().map(|c| (c.id.clone(), c)).collect();
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.by_id.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Component> {
        self.by_id.values()
    }

    /// Every id in `selection` must be known (spec.md §4.5).
    pub fn validate(&self, selection: &[String]) -> Result<()> {
        for id in selection {
            if !self.by_id.contains_key(id) {
                return Err(McsError::validation(format!("unknown component: {id}")));
            }
        }
        Ok(())
    }

    /// Post-order DFS from each selected id, first-visit wins, cycle and
    /// missing-dependency detection (spec.md §4.5, §8 resolver properties).
    #[instrument(skip(self))]
    pub fn resolve_order(&self, selection: &[String]) -> Result<Vec<String>> {
        self.validate(selection)?;

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = Vec::new();

        for id in selection {
            self.visit(id, &mut order, &mut visited, &mut on_stack)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: &str,
        order: &mut Vec<String>,
        visited: &mut HashSet<String>,
        on_stack: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(id) {
            return Ok(());
        }
        if let Some(pos) = on_stack.iter().position(|s| s == id) {
            let mut cycle: Vec<String> = on_stack[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(McsError::validation(format!(
                "cyclic dependencies: {}",
                cycle.join(" -> ")
            )));
        }

        let component = self
            .by_id
            .get(id)
            .ok_or_else(|| McsError::validation(format!("unknown component: {id}")))?;

        on_stack.push(id.to_string());
        for dep in &component.dependencies {
            self.visit(dep, order, visited, on_stack)?;
        }
        on_stack.pop();

        visited.insert(id.to_string());
        order.push(id.to_string());
        Ok(())
    }

    /// Write the initialization package into `<codespace_path>/init` and
    /// `<codespace_path>/components` (spec.md §4.5, §6 layout).
    #[instrument(skip(self, codespace_dir))]
    pub fn stage(&self, selection: &[String], codespace_dir: &Path) -> Result<Vec<String>> {
        let order = self.resolve_order(selection)?;

        let init_dir = codespace_dir.join("init");
        let components_dir = codespace_dir.join("components");
        let installers_dir = components_dir.join("installers");
        std::fs::create_dir_all(&init_dir)?;
        std::fs::create_dir_all(&installers_dir)?;

        for id in &order {
            let source = installer_source(id).ok_or_else(|| {
                McsError::internal(format!("no embedded installer script for component '{id}'"))
            })?;
            std::fs::write(installers_dir.join(format!("{id}.sh")), source)?;
        }

        let manifest = order.join("\n") + "\n";
        std::fs::write(init_dir.join("components.manifest"), manifest)?;

        let descriptors: Vec<&Component> =
            order.iter().map(|id| self.by_id.get(id).expect("resolved id is in registry")).collect();
        let json = serde_json::json!({
            "count": descriptors.len(),
            "components": descriptors,
        });
        std::fs::write(init_dir.join("components.json"), serde_json::to_vec_pretty(&json)?)?;

        let mut env_lines = Vec::new();
        env_lines.push(format!("CODESPACE_COMPONENTS={}", order.join(",")));
        for id in &order {
            let env_key = id.to_uppercase().replace('-', "_");
            env_lines.push(format!("COMPONENT_{env_key}_ENABLED=true"));
        }
        std::fs::write(init_dir.join("components.env"), env_lines.join("\n") + "\n")?;

        std::fs::write(components_dir.join("init.sh"), INIT_SH_TEMPLATE)?;

        Ok(order)
    }
}

/// Fixed bootstrap script staged verbatim into every codespace with
/// components selected (spec.md §4.5). Reads the manifest `stage()` writes
/// and runs each component's installer, staged alongside it.
const INIT_SH_TEMPLATE: &str = r#"#!/bin/sh
set -eu

MANIFEST="/home/coder/.codespace-init/components.manifest"
MARKER="/home/coder/.codespace-init/.initialized"
INSTALLERS="/opt/codespace/components/installers"

if [ -f "$MARKER" ]; then
    echo "components already initialized, skipping"
    exit 0
fi

while IFS= read -r component; do
    case "$component" in
        ''|'#'*) continue ;;
    esac
    installer="$INSTALLERS/$component.sh"
    if [ ! -f "$installer" ]; then
        echo "missing installer for $component" >&2
        continue
    fi
    echo "installing $component"
    sh "$installer" install
    sh "$installer" configure
    sh "$installer" verify
done < "$MANIFEST"

touch "$MARKER"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_rejects_unknown_ids() {
        let registry = ComponentRegistry::new();
        let err = registry.validate(&["not-a-real-component".to_string()]).unwrap_err();
        assert!(matches!(err, McsError::Validation { .. }));
    }

    #[test]
    fn resolve_order_includes_transitive_dependencies() {
        let registry = ComponentRegistry::new();
        let order = registry.resolve_order(&["claude-flow".to_string()]).unwrap();
        assert_eq!(order, vec!["node-runtime".to_string(), "claude-flow".to_string()]);
    }

    #[test]
    fn resolve_order_is_stable_across_runs() {
        let registry = ComponentRegistry::new();
        let selection = vec!["claude-flow".to_string(), "github-cli".to_string()];
        let first = registry.resolve_order(&selection).unwrap();
        let second = registry.resolve_order(&selection).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn every_id_appears_at_most_once() {
        let registry = ComponentRegistry::new();
        let selection =
            vec!["claude-flow".to_string(), "node-runtime".to_string(), "github-cli".to_string()];
        let order = registry.resolve_order(&selection).unwrap();
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn cyclic_dependencies_are_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.by_id.insert(
            "a".to_string(),
            Component {
                id: "a".to_string(),
                name: "A".to_string(),
                description: String::new(),
                installer: "installers/a.sh".to_string(),
                dependencies: vec!["b".to_string()],
                requires_node: false,
            },
        );
        registry.by_id.insert(
            "b".to_string(),
            Component {
                id: "b".to_string(),
                name: "B".to_string(),
                description: String::new(),
                installer: "installers/b.sh".to_string(),
                dependencies: vec!["a".to_string()],
                requires_node: false,
            },
        );

        let err = registry.resolve_order(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, McsError::Validation { .. }));
    }

    #[test]
    fn stage_writes_expected_files() {
        let registry = ComponentRegistry::new();
        let dir = tempdir().unwrap();
        let order = registry.stage(&["github-cli".to_string()], dir.path()).unwrap();
        assert_eq!(order, vec!["github-cli".to_string()]);

        let manifest = std::fs::read_to_string(dir.path().join("init/components.manifest")).unwrap();
        assert_eq!(manifest.trim(), "github-cli");

        let env = std::fs::read_to_string(dir.path().join("init/components.env")).unwrap();
        assert!(env.contains("CODESPACE_COMPONENTS=github-cli"));
        assert!(env.contains("COMPONENT_GITHUB_CLI_ENABLED=true"));

        assert!(dir.path().join("components/init.sh").is_file());

        let installer = std::fs::read_to_string(dir.path().join("components/installers/github-cli.sh")).unwrap();
        assert!(installer.contains("gh"));
    }

    #[test]
    fn every_registered_component_has_an_embedded_installer() {
        let registry = ComponentRegistry::new();
        for component in registry.all() {
            assert!(
                installer_source(&component.id).is_some(),
                "missing embedded installer for {}",
                component.id
            );
        }
    }
}
