//! Structured logging initialization
//!
//! Shared by the CLI binary and by test harnesses that want log output.
//! Idempotent: a second call is a no-op rather than panicking, since tests
//! frequently construct more than one `LifecycleManager` per process.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::paths::Paths;

fn unix_now_micros() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
}

/// Initialize the global tracing subscriber from `RUST_LOG` (defaulting to
/// `info`): human-readable output on stdout plus full chained-error context
/// in a per-invocation file under `<mcs_home>/logs/<timestamp>.log`
/// (spec.md §7). Returns the file appender's worker guard on first call,
/// which the caller must keep alive for the process lifetime to avoid
/// dropping buffered log lines; returns `None` on a no-op repeat call.
pub fn init(paths: &Paths) -> anyhow::Result<Option<WorkerGuard>> {
    if tracing::dispatcher::has_been_set() {
        return Ok(None);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let error_layer = tracing_error::ErrorLayer::default();

    let logs_dir = paths.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let file_name = format!("{}.log", unix_now_micros());
    let file_appender = tracing_appender::rolling::never(&logs_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(error_layer)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(Some(guard))
}
