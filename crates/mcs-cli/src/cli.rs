//! Command-line surface (spec.md §6 "external collaborator": the CLI's own
//! help/formatting is out of scope for the engine, but `mcs` still needs a
//! real one to drive it end to end).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mcs_core::errors::Result;
use mcs_core::lifecycle::LifecycleManager;
use mcs_core::paths::Paths;

use crate::commands;

#[derive(Parser, Debug)]
#[command(name = "mcs", version, about = "Michael's Codespaces — codespace lifecycle engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new codespace from a repository.
    Create(CreateArgs),
    /// Start a stopped codespace's container.
    Start(NameArg),
    /// Stop a running codespace's container.
    Stop(NameArg),
    /// Stop then start a codespace's container.
    Restart(NameArg),
    /// Regenerate a codespace's composition and restart it.
    Rebuild(NameArg),
    /// Stop, remove the container, and (by default) delete the codespace's directory.
    Remove(RemoveArgs),
    /// List every codespace known to this host.
    List,
    /// Show one codespace plus live container stats.
    Info(NameArg),
    /// Run a command inside a codespace's container.
    Exec(ExecArgs),
    /// Read or change global configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct NameArg {
    /// Codespace name.
    name: String,
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Repository URL to clone.
    repository: String,

    /// Codespace name (generated if omitted).
    #[arg(long)]
    name: Option<String>,

    /// Branch to check out after cloning.
    #[arg(long)]
    branch: Option<String>,

    /// Clone only the last N commits.
    #[arg(long, value_name = "N")]
    shallow: Option<u32>,

    /// Force a full clone even for repositories this engine would otherwise shallow-clone.
    #[arg(long)]
    full_history: bool,

    /// Force a shallow (depth 1) clone regardless of repository size.
    #[arg(long)]
    force_shallow: bool,

    /// Comma-separated component ids to install, e.g. `node-runtime,github-cli`.
    #[arg(long, value_delimiter = ',')]
    components: Vec<String>,

    /// Extra environment variable, `KEY=VALUE`. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Extra bind mount, in compose `host:container` form. Repeatable.
    #[arg(long = "volume", value_name = "HOST:CONTAINER")]
    extra_volumes: Vec<String>,

    /// Extra Docker network to attach. Repeatable.
    #[arg(long = "network")]
    extra_networks: Vec<String>,

    /// Label to attach to the container, `KEY=VALUE`. Repeatable.
    #[arg(long = "label", value_name = "KEY=VALUE")]
    labels: Vec<String>,

    /// Disable the container healthcheck.
    #[arg(long)]
    no_healthcheck: bool,

    /// Create the codespace but do not start its container.
    #[arg(long)]
    no_start: bool,

    /// Overwrite an existing codespace with the same name.
    #[arg(long)]
    force: bool,

    /// Use this password instead of generating one.
    #[arg(long)]
    password: Option<String>,

    /// Seconds to wait for the healthcheck before giving up (default 60).
    #[arg(long)]
    start_timeout: Option<u64>,

    /// Clone over SSH using this private key instead of auto-detection.
    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Clone over HTTPS using this `username:token` pair instead of auto-detection.
    #[arg(long, value_name = "USERNAME:TOKEN")]
    token: Option<String>,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    /// Codespace name.
    name: String,

    /// Keep the on-host directory instead of deleting it.
    #[arg(long)]
    keep_data: bool,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Codespace name.
    name: String,

    /// Command and arguments to run inside the container.
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the current configuration as JSON.
    Show,
    /// Set how the codespace's access IP is determined (`localhost`, `auto`, `public`, `custom`).
    SetIpMode { mode: String },
    /// Set the IP used when `ip_mode` is `custom`.
    SetHostIp { ip: String },
    /// Enable or disable the self-update check.
    SetAutoUpdate { enabled: bool },
}

impl Cli {
    pub async fn dispatch(self, manager: &LifecycleManager, paths: &Paths) -> Result<()> {
        match self.command {
            Command::Create(args) => commands::create::run(manager, args.into()).await,
            Command::Start(NameArg { name }) => commands::start::run(manager, &name).await,
            Command::Stop(NameArg { name }) => commands::stop::run(manager, &name).await,
            Command::Restart(NameArg { name }) => commands::restart::run(manager, &name).await,
            Command::Rebuild(NameArg { name }) => commands::rebuild::run(manager, &name).await,
            Command::Remove(RemoveArgs { name, keep_data }) => {
                commands::remove::run(manager, &name, keep_data).await
            }
            Command::List => commands::list::run(manager).await,
            Command::Info(NameArg { name }) => commands::info::run(manager, &name).await,
            Command::Exec(ExecArgs { name, command }) => commands::exec::run(manager, &name, command).await,
            Command::Config(cmd) => commands::config::run(paths, cmd.into()).await,
        }
    }
}

// --- Conversions from clap arg structs to core request types, kept here so
// `commands/*.rs` never depends on `clap`. ---

impl From<CreateArgs> for commands::create::CreateRequest {
    fn from(args: CreateArgs) -> Self {
        use mcs_core::repo::{Depth, ExplicitAuth};

        let depth = if args.full_history {
            Some(Depth::Full)
        } else {
            args.shallow.map(Depth::Shallow)
        };

        let explicit_auth = if let Some(key) = args.ssh_key {
            Some(ExplicitAuth::SshKey { private_key: key, public_key: None })
        } else {
            args.token.as_ref().and_then(|pair| {
                pair.split_once(':').map(|(username, token)| ExplicitAuth::HttpsToken {
                    username: username.to_string(),
                    token: token.to_string(),
                })
            })
        };

        commands::create::CreateRequest {
            repository: args.repository,
            name: args.name,
            branch: args.branch,
            depth,
            force_shallow: args.force_shallow,
            explicit_auth,
            components: args.components,
            env: args.env,
            extra_volumes: args.extra_volumes,
            extra_networks: args.extra_networks,
            labels: args.labels,
            healthcheck: !args.no_healthcheck,
            no_start: args.no_start,
            force: args.force,
            password: args.password,
            start_timeout_secs: args.start_timeout,
        }
    }
}

pub(crate) enum ConfigRequest {
    Show,
    SetIpMode(String),
    SetHostIp(String),
    SetAutoUpdate(bool),
}

impl From<ConfigCommand> for ConfigRequest {
    fn from(cmd: ConfigCommand) -> Self {
        match cmd {
            ConfigCommand::Show => ConfigRequest::Show,
            ConfigCommand::SetIpMode { mode } => ConfigRequest::SetIpMode(mode),
            ConfigCommand::SetHostIp { ip } => ConfigRequest::SetHostIp(ip),
            ConfigCommand::SetAutoUpdate { enabled } => ConfigRequest::SetAutoUpdate(enabled),
        }
    }
}
