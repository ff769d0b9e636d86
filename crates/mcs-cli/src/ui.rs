//! Terminal progress rendering, grounded on the teacher's `SpinnerEmitter`:
//! a single `indicatif` spinner whose message is rewritten as
//! [`mcs_core::progress`] events arrive, styled with `console`.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mcs_core::progress::{CloneProgress, LifecycleEvent, ProgressSink};

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap()
}

/// Renders [`LifecycleEvent`]s (create/rebuild phase begin/end, healthcheck polling).
pub struct LifecycleSpinner {
    pb: ProgressBar,
}

impl LifecycleSpinner {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(spinner_style());
        Self { pb }
    }

    /// Replace the spinner with a final, non-ticking success line.
    pub fn finish(&self, message: &str) {
        self.pb.set_style(done_style());
        self.pb.finish_with_message(style(message.to_string()).green().to_string());
    }
}

impl Default for LifecycleSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink<LifecycleEvent> for LifecycleSpinner {
    fn emit(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::PhaseBegin { phase, .. } => {
                self.pb.set_message(style(format!("{phase}…")).yellow().to_string());
            }
            LifecycleEvent::PhaseEnd { phase, success, .. } => {
                let msg = if success { format!("{phase} done") } else { format!("{phase} failed") };
                let styled = if success { style(msg).green() } else { style(msg).red() };
                self.pb.set_message(styled.to_string());
            }
            LifecycleEvent::HealthcheckWaiting { attempt, max_attempts, .. } => {
                self.pb.set_message(
                    style(format!("waiting for healthcheck ({attempt}/{max_attempts})…")).yellow().to_string(),
                );
            }
            LifecycleEvent::HealthcheckReady { .. } => {
                self.pb.set_message(style("healthcheck passed").green().to_string());
            }
        }
    }
}

/// Renders [`CloneProgress`] ticks from the Repository Acquirer.
pub struct CloneSpinner {
    pb: ProgressBar,
}

impl CloneSpinner {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(spinner_style());
        Self { pb }
    }
}

impl Default for CloneSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink<CloneProgress> for CloneSpinner {
    fn emit(&self, event: CloneProgress) {
        if event.total > 0 {
            self.pb.set_length(event.total);
            self.pb.set_position(event.current);
        }
        self.pb.set_message(format!("{}…", event.phase));
    }
}
