//! CLI-side error presentation (spec.md §7: "short, category-tagged line plus
//! a one-line actionable hint"). The core crate only ever returns structured
//! `McsError`s; turning those into terminal output is this binary's job,
//! mirroring how the teacher's CLI commands format `DeaconError` rather than
//! letting the core print anything itself.

use console::style;
use mcs_core::errors::McsError;

fn hint_for(err: &McsError) -> Option<&'static str> {
    match err {
        McsError::NotFound { .. } => Some("run `mcs list` to see known codespaces"),
        McsError::Conflict { .. } => Some("pass --force to overwrite, or choose a different name"),
        McsError::Auth { .. } => {
            Some("set GITHUB_TOKEN/GITLAB_TOKEN or pass --ssh-key/--token for this repository")
        }
        McsError::Network { .. } => Some("check connectivity and retry"),
        McsError::Runtime { .. } => Some("confirm the container runtime is installed and running"),
        McsError::Validation { .. } => None,
        McsError::Filesystem { .. } => Some("check permissions and available disk space"),
        McsError::Cancelled { .. } => Some("the operation timed out or was interrupted; retry when ready"),
        McsError::Internal { .. } => Some("this looks like a bug; please report it"),
    }
}

pub fn present_error(err: &McsError) {
    eprintln!("{}", style(format!("error [{}]: {err}", err.category())).red().bold());
    if let Some(hint) = hint_for(err) {
        eprintln!("  {} {hint}", style("hint:").dim());
    }
}
