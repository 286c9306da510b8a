// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Warning;
use crate::pipeline::{Outcome, PipelineReport, StageFailure};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => self.event("success", message),
        }
    }

    /// Print a warning (suppressed in quiet mode).
    pub fn warning(&self, warning: &Warning) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {}", warning.message),
            OutputMode::Quiet => {}
            OutputMode::Json => self.event("warning", &warning.message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&self.json_event("error", message)) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print a failure that happened outside the pipeline stages.
    ///
    /// JSON mode emits the same `{stage, error_kind, message}` shape as a
    /// failed report.
    pub fn failure(&self, failure: &StageFailure) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => self.error(&failure.message),
            OutputMode::Json => {
                let event = FailureEvent {
                    event: "error",
                    failure,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print the final report of a run, successful or not.
    pub fn report(&self, report: &PipelineReport) {
        match self.mode {
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(report) {
                    println!("{json}");
                }
            }
            OutputMode::Normal | OutputMode::Quiet => {
                for warning in &report.warnings {
                    self.warning(warning);
                }
                match (&report.outcome, &report.failure) {
                    (Outcome::Stable, _) => self.success(&summary(report)),
                    (_, Some(failure)) => self.error(&format!(
                        "{} stage failed ({}): {}",
                        failure.stage, failure.error_kind, failure.message
                    )),
                    (outcome, None) => self.error(&format!("pipeline ended {}", outcome)),
                }
                if report.outcome == Outcome::DeployedButUnstable {
                    self.error(&format!(
                        "{} was deployed but is not stable; inspect the service before retrying",
                        report.service
                    ));
                }
            }
        }
    }

    fn event(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.json_event(event, message)) {
            println!("{json}");
        }
    }

    fn json_event<'a>(&self, event: &'a str, message: &'a str) -> JsonEvent<'a> {
        JsonEvent {
            event,
            message,
            duration_secs: if self.start_time.is_some() {
                Some(self.elapsed_secs())
            } else {
                None
            },
        }
    }
}

fn summary(report: &PipelineReport) -> String {
    let mut line = format!("{} is stable on {}", report.service, report.cluster);
    if let Some(ref revision) = report.revision {
        line.push_str(&format!(" at revision {}", revision));
    }
    if report.retired > 0 {
        line.push_str(&format!(", {} previous task(s) stopped", report.retired));
    }
    line
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct FailureEvent<'a> {
    event: &'a str,
    #[serde(flatten)]
    failure: &'a StageFailure,
}
