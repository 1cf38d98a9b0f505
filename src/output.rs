// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON lines output modes.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::EnvironmentStatus;
use crate::history::DeploymentRecord;

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

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
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
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({:.1}s)", elapsed),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => emit(&JsonEvent {
                event: "success",
                message: Some(message),
                duration_secs: self.duration(),
                data: None::<()>,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message: Some(message),
                    duration_secs: self.duration(),
                    data: None::<()>,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print the outcome of one deployment.
    pub fn record(&self, record: &DeploymentRecord) {
        match self.mode {
            OutputMode::Normal => {
                println!("{}", record_line(record));
                if let Some(ref error) = record.error {
                    println!("  {} error: {}", error.kind, error.message);
                }
                if let Some(ref target) = record.rolled_back_to {
                    println!("  rolled back to {}", target.digest());
                }
                if record.requires_intervention {
                    println!("  manual intervention required");
                }
            }
            OutputMode::Quiet => println!("{} {}", record.environment, record.state),
            OutputMode::Json => emit(&JsonEvent {
                event: "deployment",
                message: None,
                duration_secs: self.duration(),
                data: Some(record),
            }),
        }
    }

    /// Print an environment's history, oldest first.
    pub fn history(&self, records: &[DeploymentRecord]) {
        match self.mode {
            OutputMode::Json => {
                for record in records {
                    emit(&JsonEvent {
                        event: "record",
                        message: None,
                        duration_secs: None,
                        data: Some(record),
                    });
                }
            }
            _ => {
                if records.is_empty() && self.mode == OutputMode::Normal {
                    println!("No deployments recorded");
                }
                for record in records {
                    println!("{}", record_line(record));
                }
            }
        }
    }

    pub fn status(&self, statuses: &[EnvironmentStatus]) {
        match self.mode {
            OutputMode::Json => {
                for status in statuses {
                    emit(&JsonEvent {
                        event: "status",
                        message: None,
                        duration_secs: None,
                        data: Some(status),
                    });
                }
            }
            _ => {
                for status in statuses {
                    let current = match status.latest {
                        Some(ref record) => record_line(record),
                        None => "never deployed".to_string(),
                    };
                    let marker = if status.in_flight { " (in flight)" } else { "" };
                    println!("{:<8} {}{}", status.environment, current, marker);
                }
            }
        }
    }
}

fn record_line(record: &DeploymentRecord) -> String {
    format!(
        "{} {} {:<12} {} attempt {} {}",
        record.started_at.format("%Y-%m-%d %H:%M:%S"),
        record.id.short(),
        record.state.as_str(),
        record.artifact.digest().short(),
        record.attempt,
        record.environment,
    )
}

fn emit<T: Serialize>(event: &JsonEvent<'_, T>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a, T: Serialize> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}
