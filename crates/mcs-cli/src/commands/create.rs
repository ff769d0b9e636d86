use std::sync::Arc;

use mcs_core::errors::{McsError, Result};
use mcs_core::lifecycle::{CreateOptions, LifecycleManager};
use mcs_core::repo::{Depth, ExplicitAuth};
use mcs_core::IndexMap;

use crate::ui::{CloneSpinner, LifecycleSpinner};

/// CLI-facing request, independent of `clap` so it can be constructed directly in tests.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub repository: String,
    pub name: Option<String>,
    pub branch: Option<String>,
    pub depth: Option<Depth>,
    pub force_shallow: bool,
    pub explicit_auth: Option<ExplicitAuth>,
    pub components: Vec<String>,
    pub env: Vec<String>,
    pub extra_volumes: Vec<String>,
    pub extra_networks: Vec<String>,
    pub labels: Vec<String>,
    pub healthcheck: bool,
    pub no_start: bool,
    pub force: bool,
    pub password: Option<String>,
    pub start_timeout_secs: Option<u64>,
}

fn parse_key_value_pairs(pairs: &[String]) -> Result<IndexMap<String, String>> {
    let mut map = IndexMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| McsError::validation(format!("expected KEY=VALUE, got '{pair}'")))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

pub async fn run(manager: &LifecycleManager, req: CreateRequest) -> Result<()> {
    let env = parse_key_value_pairs(&req.env)?;

    let mut opts = CreateOptions::new(req.repository);
    opts.name = req.name;
    opts.branch = req.branch;
    opts.depth = req.depth;
    opts.force_shallow = req.force_shallow;
    opts.explicit_auth = req.explicit_auth;
    opts.components = req.components;
    opts.env = env;
    opts.extra_volumes = req.extra_volumes;
    opts.extra_networks = req.extra_networks;
    opts.labels = req.labels;
    opts.healthcheck = req.healthcheck;
    opts.no_start = req.no_start;
    opts.force = req.force;
    opts.password = req.password;
    opts.start_timeout = req.start_timeout_secs.map(std::time::Duration::from_secs);

    let progress = LifecycleSpinner::new();
    let clone_progress: Arc<dyn mcs_core::progress::ProgressSink<mcs_core::progress::CloneProgress>> =
        Arc::new(CloneSpinner::new());

    let codespace = manager.create(opts, &progress, clone_progress).await?;
    progress.finish(&format!("codespace '{}' is {}", codespace.name, codespace.status));

    println!("name:       {}", codespace.name);
    println!("repository: {}", codespace.repository);
    println!("status:     {}", codespace.status);
    println!("vscode:     {}", codespace.vscode_url);
    println!("password:   {}", codespace.password);
    if !codespace.components.is_empty() {
        println!("components: {}", codespace.components.join(", "));
    }
    Ok(())
}
