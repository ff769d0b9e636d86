//! Repository Acquirer (spec.md §4.3)
//!
//! Clones a remote repository with authentication detection, large-repo-aware
//! shallow cloning, and phase-tagged progress events, built on `git2`
//! (libgit2 bindings) — the transport several repositories in this ecosystem
//! reach for when they need to drive git themselves rather than shell out.

use std::path::{Path, PathBuf};

use git2::{Cred, FetchOptions, RemoteCallbacks};
use tracing::{debug, instrument, warn};

use crate::errors::{McsError, Result};
use crate::progress::{CloneProgress, ProgressSink};

/// Curated set of repositories known to be large enough that a full clone is
/// impractical by default (spec.md §4.3).
const LARGE_REPOS: &[&str] = &["homebrew/homebrew-core", "torvalds/linux", "microsoft/vscode"];

/// Desired clone depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Full history.
    Full,
    /// Shallow clone with the given depth.
    Shallow(u32),
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub url: String,
    pub branch: Option<String>,
    pub depth: Option<Depth>,
    pub force_shallow: bool,
    pub explicit_auth: Option<ExplicitAuth>,
}

#[derive(Debug, Clone)]
pub enum ExplicitAuth {
    SshKey { private_key: PathBuf, public_key: Option<PathBuf> },
    HttpsToken { username: String, token: String },
}

/// Resolve the clone depth per spec.md §4.3: force-shallow or a large-repo
/// match implies `depth=1`, unless the caller explicitly asked for full
/// history.
fn resolve_depth(opts: &CloneOptions) -> Option<u32> {
    match opts.depth {
        Some(Depth::Full) => None,
        Some(Depth::Shallow(d)) => Some(d),
        None => {
            if opts.force_shallow || is_large_repo(&opts.url) {
                Some(1)
            } else {
                None
            }
        }
    }
}

fn is_large_repo(url: &str) -> bool {
    LARGE_REPOS.iter().any(|repo| url.contains(repo))
}

fn is_ssh_url(url: &str) -> bool {
    url.starts_with("git@") || url.starts_with("ssh://")
}

/// Detect credentials from the URL and environment, following spec.md
/// §4.3's precedence: explicit auth, then SSH key discovery, then
/// `GITHUB_TOKEN`/`GITLAB_TOKEN` for HTTPS.
fn detect_credentials(
    url: &str,
    explicit: Option<&ExplicitAuth>,
) -> Box<dyn Fn(&str, Option<&str>, git2::CredentialType) -> std::result::Result<Cred, git2::Error>>
{
    let url = url.to_string();
    let explicit = explicit.cloned();

    Box::new(move |_url, username_from_url, allowed| {
        if let Some(auth) = &explicit {
            return credential_from_explicit(auth, allowed);
        }

        if is_ssh_url(&url) {
            let username = username_from_url.unwrap_or("git");
            let home = dirs_home();
            for key_name in ["id_rsa", "id_ed25519"] {
                let private = home.join(".ssh").join(key_name);
                if private.is_file() {
                    let public = private.with_extension(format!("{key_name}.pub"));
                    let public = if public.is_file() { Some(public) } else { None };
                    return Cred::ssh_key(username, public.as_deref(), &private, None);
                }
            }
            return Err(git2::Error::from_str("no SSH key found at ~/.ssh/id_rsa or id_ed25519"));
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if url.contains("github.com") {
                if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                    return Cred::userpass_plaintext("token", &token);
                }
            } else if url.contains("gitlab.com") {
                if let Ok(token) = std::env::var("GITLAB_TOKEN") {
                    return Cred::userpass_plaintext("oauth2", &token);
                }
            }
        }

        Err(git2::Error::from_str("no credentials available for this URL"))
    })
}

fn credential_from_explicit(
    auth: &ExplicitAuth,
    allowed: git2::CredentialType,
) -> std::result::Result<Cred, git2::Error> {
    match auth {
        ExplicitAuth::SshKey { private_key, public_key } => {
            Cred::ssh_key("git", public_key.as_deref(), private_key, None)
        }
        ExplicitAuth::HttpsToken { username, token } => {
            if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
                Cred::userpass_plaintext(username, token)
            } else {
                Err(git2::Error::from_str("explicit token auth not applicable to this transport"))
            }
        }
    }
}

fn dirs_home() -> PathBuf {
    directories_next::UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Clones repositories and answers pre-flight questions about them.
pub struct RepositoryAcquirer;

impl Default for RepositoryAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryAcquirer {
    pub fn new() -> Self {
        Self
    }

    /// Clone `opts.url` into `target`, creating parent directories as
    /// needed. On failure, the partially created target directory is
    /// removed and a categorized error is returned (spec.md §4.3).
    #[instrument(skip(self, opts, progress))]
    pub fn clone(
        &self,
        opts: &CloneOptions,
        target: &Path,
        progress: &dyn ProgressSink<CloneProgress>,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = self.clone_inner(opts, target, progress);
        if result.is_err() && target.exists() {
            if let Err(e) = std::fs::remove_dir_all(target) {
                warn!(error = %e, path = %target.display(), "failed to clean up partial clone");
            }
        }
        result
    }

    fn clone_inner(
        &self,
        opts: &CloneOptions,
        target: &Path,
        progress: &dyn ProgressSink<CloneProgress>,
    ) -> Result<()> {
        let mut callbacks = RemoteCallbacks::new();
        let cred_fn = detect_credentials(&opts.url, opts.explicit_auth.as_ref());
        callbacks.credentials(move |url, username, allowed| cred_fn(url, username, allowed));

        let mut last_phase: Option<&'static str> = None;
        callbacks.transfer_progress(move |stats| {
            let phase = if stats.total_deltas() > 0 {
                "Resolving deltas"
            } else if stats.indexed_objects() > 0 && stats.indexed_objects() < stats.total_objects()
            {
                "Receiving objects"
            } else if stats.total_objects() > 0 {
                "Counting objects"
            } else {
                "Compressing objects"
            };

            if last_phase != Some(phase) {
                last_phase = Some(phase);
                debug!(phase, "clone progress phase changed");
            }
            progress.emit(CloneProgress {
                phase: phase.to_string(),
                current: stats.received_objects() as u64,
                total: stats.total_objects() as u64,
            });
            true
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        if let Some(depth) = resolve_depth(opts) {
            fetch_options.depth(depth as i32);
        }

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(branch) = &opts.branch {
            builder.branch(branch);
        }

        builder
            .clone(&opts.url, target)
            .map(|_| ())
            .map_err(McsError::from)
    }

    /// List remote refs without cloning, used by `Create`'s pre-flight check.
    #[instrument(skip(self))]
    pub fn validate(&self, url: &str) -> Result<()> {
        let remote_tmp = git2::Repository::init_bare(std::env::temp_dir().join(format!(
            "mcs-validate-{}",
            fastrand::u64(..)
        )))?;
        let mut remote = remote_tmp.remote_anonymous(url)?;
        let mut callbacks = RemoteCallbacks::new();
        let cred_fn = detect_credentials(url, None);
        callbacks.credentials(move |u, username, allowed| cred_fn(u, username, allowed));
        let mut connection = remote.connect_auth(git2::Direction::Fetch, Some(callbacks), None)?;
        let has_refs = connection.list()?.iter().next().is_some();
        connection.disconnect().ok();
        if !has_refs {
            return Err(McsError::not_found(format!("{url} has no refs")));
        }
        Ok(())
    }

    /// Return the remote's default branch, falling back to `main`/`master`.
    #[instrument(skip(self))]
    pub fn default_branch(&self, url: &str) -> Result<String> {
        let tmp = git2::Repository::init_bare(
            std::env::temp_dir().join(format!("mcs-head-{}", fastrand::u64(..))),
        )?;
        let mut remote = tmp.remote_anonymous(url)?;
        let mut callbacks = RemoteCallbacks::new();
        let cred_fn = detect_credentials(url, None);
        callbacks.credentials(move |u, username, allowed| cred_fn(u, username, allowed));
        let mut connection = remote.connect_auth(git2::Direction::Fetch, Some(callbacks), None)?;
        let head = connection
            .list()?
            .iter()
            .find(|r| r.name() == "HEAD")
            .and_then(|r| r.symref_target())
            .map(|s| s.trim_start_matches("refs/heads/").to_string());
        connection.disconnect().ok();

        Ok(head.unwrap_or_else(|| "main".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_repo_forces_shallow_by_default() {
        let opts = CloneOptions {
            url: "https://github.com/torvalds/linux.git".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_depth(&opts), Some(1));
    }

    #[test]
    fn explicit_full_depth_overrides_large_repo_heuristic() {
        let opts = CloneOptions {
            url: "https://github.com/torvalds/linux.git".to_string(),
            depth: Some(Depth::Full),
            ..Default::default()
        };
        assert_eq!(resolve_depth(&opts), None);
    }

    #[test]
    fn small_repo_defaults_to_full_history() {
        let opts = CloneOptions {
            url: "https://github.com/octocat/Hello-World.git".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_depth(&opts), None);
    }

    #[test]
    fn force_shallow_applies_regardless_of_size() {
        let opts = CloneOptions {
            url: "https://github.com/octocat/Hello-World.git".to_string(),
            force_shallow: true,
            ..Default::default()
        };
        assert_eq!(resolve_depth(&opts), Some(1));
    }

    #[test]
    fn ssh_url_detection() {
        assert!(is_ssh_url("git@github.com:octocat/Hello-World.git"));
        assert!(is_ssh_url("ssh://git@github.com/octocat/Hello-World.git"));
        assert!(!is_ssh_url("https://github.com/octocat/Hello-World.git"));
    }

    #[test]
    fn clone_of_nonexistent_host_removes_partial_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("repo");
        let opts = CloneOptions {
            url: "https://mcs-nonexistent-host.invalid/nobody/nothing.git".to_string(),
            ..Default::default()
        };
        let acquirer = RepositoryAcquirer::new();
        let sink = crate::progress::NullSink::default();
        let result = acquirer.clone(&opts, &target, &sink);
        assert!(result.is_err());
        assert!(!target.exists());
    }
}
