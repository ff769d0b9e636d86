//! Language Detector (spec.md §4.4)
//!
//! Inspects a cloned working tree and returns a language tag plus an
//! optional explicit image, read from a `.devcontainer/devcontainer.json`
//! (or `.devcontainer.json`) override when present.

use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::errors::Result;

/// Mono-repo subdirectories searched in addition to the root, up to depth 2
/// (spec.md §4.4: "api/, backend/, mcs-go/, ...").
const SUBDIR_CANDIDATES: &[&str] =
    &["api", "backend", "frontend", "server", "client", "app", "mcs-go", "packages", "cmd"];

/// Manifest-file rules, evaluated in order; first match wins (spec.md §4.4).
const MANIFEST_RULES: &[(&[&str], &str)] = &[
    (&["package.json"], "node"),
    (&["requirements.txt", "setup.py", "Pipfile", "pyproject.toml"], "python"),
    (&["go.mod", "go.sum"], "go"),
    (&["Cargo.toml", "Cargo.lock"], "rust"),
    (&["pom.xml", "build.gradle", "build.gradle.kts"], "java"),
    (&["Gemfile", "Rakefile"], "ruby"),
    (&["composer.json"], "php"),
];

const DOTNET_EXTENSIONS: &[&str] = &["csproj", "fsproj", "vbproj"];

/// Result of detection: a (possibly empty) language tag and an optional
/// explicit image pulled from a devcontainer override.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectedLanguage {
    pub language: String,
    pub explicit_image: Option<String>,
    pub explicit_dockerfile: Option<String>,
}

fn has_any(dir: &Path, names: &[&str]) -> bool {
    names.iter().any(|n| dir.join(n).is_file())
}

fn has_dotnet_project(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else { return false };
    for entry in entries.flatten() {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            if DOTNET_EXTENSIONS.contains(&ext) {
                return true;
            }
        }
    }
    false
}

fn detect_in_dir(dir: &Path) -> Option<&'static str> {
    for (names, tag) in MANIFEST_RULES {
        if has_any(dir, names) {
            return Some(tag);
        }
    }
    if has_dotnet_project(dir) {
        return Some("dotnet");
    }
    None
}

/// Search `root` then up to two levels of common mono-repo subdirectories.
fn detect_language(root: &Path) -> String {
    if let Some(tag) = detect_in_dir(root) {
        return tag.to_string();
    }

    for sub in SUBDIR_CANDIDATES {
        let dir = root.join(sub);
        if !dir.is_dir() {
            continue;
        }
        if let Some(tag) = detect_in_dir(&dir) {
            return tag.to_string();
        }
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    if let Some(tag) = detect_in_dir(&entry.path()) {
                        return tag.to_string();
                    }
                }
            }
        }
    }

    String::new()
}

/// Minimal devcontainer.json shape we read from; parsed with `json5` since
/// the file permits comments and trailing commas.
#[derive(Debug, Default, serde::Deserialize)]
struct DevContainerOverride {
    image: Option<String>,
    #[serde(rename = "dockerFile")]
    docker_file: Option<String>,
    #[serde(rename = "dockerfile")]
    docker_file_lower: Option<String>,
}

fn read_devcontainer_override(root: &Path) -> Option<DevContainerOverride> {
    for candidate in [".devcontainer/devcontainer.json", ".devcontainer.json"] {
        let path = root.join(candidate);
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match json5::from_str::<DevContainerOverride>(&content) {
                Ok(parsed) => return Some(parsed),
                Err(e) => warn!(path = %path.display(), error = %e, "malformed devcontainer.json"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "could not read devcontainer.json"),
        }
    }
    None
}

/// Inspect `root` and return the detected language tag plus any devcontainer
/// override. `dockerfile` is reported but never resolved here (spec.md
/// §4.4: "reported to the Lifecycle Manager which logs and falls back").
#[instrument]
pub fn detect(root: &Path) -> Result<DetectedLanguage> {
    let language = detect_language(root);
    let overlay = read_devcontainer_override(root);

    let (explicit_image, explicit_dockerfile) = match overlay {
        Some(o) => (o.image, o.docker_file.or(o.docker_file_lower)),
        None => (None, None),
    };

    debug!(language, explicit_image = ?explicit_image, "language detection complete");
    Ok(DetectedLanguage { language, explicit_image, explicit_dockerfile })
}

/// Image tag families per language (spec.md §4.4: "product of {base, +node,
/// full} variants"). The registry/tag prefix is deliberately generic; it
/// names the image family MCS ships, not a specific upstream vendor tag.
fn image_family(language: &str) -> &'static str {
    match language {
        "node" => "mcs/codespace-node",
        "python" => "mcs/codespace-python",
        "go" => "mcs/codespace-go",
        "rust" => "mcs/codespace-rust",
        "java" => "mcs/codespace-java",
        "ruby" => "mcs/codespace-ruby",
        "php" => "mcs/codespace-php",
        "dotnet" => "mcs/codespace-dotnet",
        _ => "mcs/codespace-base",
    }
}

/// Select the final image tag: explicit image wins; otherwise map language
/// to a family and pick the `+node` variant when `needs_node` is set
/// (spec.md §4.4, §4.6).
pub fn select_image(detected: &DetectedLanguage, needs_node: bool) -> String {
    if let Some(image) = &detected.explicit_image {
        return image.clone();
    }

    let family = image_family(&detected.language);
    if needs_node && detected.language != "node" {
        format!("{family}-node:latest")
    } else {
        format!("{family}:latest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_node_from_package_json() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let detected = detect(dir.path()).unwrap();
        assert_eq!(detected.language, "node");
    }

    #[test]
    fn detects_go_from_go_mod() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/x").unwrap();
        let detected = detect(dir.path()).unwrap();
        assert_eq!(detected.language, "go");
    }

    #[test]
    fn detects_in_mono_repo_subdirectory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("backend")).unwrap();
        std::fs::write(dir.path().join("backend/go.mod"), "module example.com/x").unwrap();
        let detected = detect(dir.path()).unwrap();
        assert_eq!(detected.language, "go");
    }

    #[test]
    fn empty_tag_when_nothing_matches() {
        let dir = tempdir().unwrap();
        let detected = detect(dir.path()).unwrap();
        assert_eq!(detected.language, "");
    }

    #[test]
    fn devcontainer_override_wins_and_keeps_language() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/x").unwrap();
        std::fs::create_dir_all(dir.path().join(".devcontainer")).unwrap();
        std::fs::write(
            dir.path().join(".devcontainer/devcontainer.json"),
            r#"{
                // a comment, allowed by JSONC
                "image": "my/custom:1",
            }"#,
        )
        .unwrap();

        let detected = detect(dir.path()).unwrap();
        assert_eq!(detected.language, "go");
        assert_eq!(detected.explicit_image.as_deref(), Some("my/custom:1"));
        assert_eq!(select_image(&detected, false), "my/custom:1");
    }

    #[test]
    fn select_image_falls_back_to_language_family() {
        let detected = DetectedLanguage { language: "python".to_string(), ..Default::default() };
        assert_eq!(select_image(&detected, false), "mcs/codespace-python:latest");
    }

    #[test]
    fn select_image_uses_node_variant_when_required() {
        let detected = DetectedLanguage { language: "python".to_string(), ..Default::default() };
        assert_eq!(select_image(&detected, true), "mcs/codespace-python-node:latest");
    }
}
