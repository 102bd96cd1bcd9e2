//! Stage feedback on stderr for the binaries.
//!
//! On a terminal each stage is a spinner with a running frame count; otherwise
//! (or with `--ui plain`) stages are `==>` lines. A stage that is dropped
//! without `finish` is reported as failed.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: &str, is_tty: bool) -> Self {
        Self::new(UiMode::parse(ui_flag), is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    outcome: Option<String>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            outcome: None,
        }
    }

    /// Handle for updating the running count from a frame loop.
    pub fn counter(&self, unit: &str) -> StageCounter {
        StageCounter {
            name: self.name.clone(),
            unit: unit.to_string(),
            spinner: self.spinner.clone(),
        }
    }

    /// Mark the stage successful with a short summary.
    pub fn finish(mut self, summary: impl Into<String>) {
        self.outcome = Some(summary.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.outcome {
            Some(summary) if summary.is_empty() => format!("✔ {} ({})", self.name, elapsed),
            Some(summary) => format!("✔ {}: {} ({})", self.name, summary, elapsed),
            None => format!("✘ {} ({})", self.name, elapsed),
        };
        match &self.spinner {
            Some(spinner) if self.outcome.is_some() => spinner.finish_with_message(message),
            Some(spinner) => spinner.abandon_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

#[derive(Clone)]
pub struct StageCounter {
    name: String,
    unit: String,
    spinner: Option<ProgressBar>,
}

impl StageCounter {
    pub fn update(&self, count: u64) {
        match &self.spinner {
            Some(spinner) => {
                spinner.set_message(format!("{}… {} {}", self.name, count, self.unit))
            }
            None => log::debug!("{}: {} {}", self.name, count, self.unit),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
