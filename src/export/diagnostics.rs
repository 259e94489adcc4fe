//! Error accumulation and optional phase timings for one export run.

use std::fmt::{self, Display};
use std::time::Duration;

/// One diagnostic produced during an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    pub is_fatal: bool,
}

impl Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_fatal { "error" } else { "warning" };
        write!(f, "{}: {}", severity, self.message)
    }
}

/// Append-only list of diagnostics for the current run.
///
/// Recording never fails and never aborts anything by itself; the orchestrator
/// checks [`has_fatal_error`](Self::has_fatal_error) after each stage.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    records: Vec<ErrorRecord>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Record a message assembled from `parts`.
    pub fn add_error<I, S>(&mut self, parts: I, is_fatal: bool)
    where
        I: IntoIterator<Item = S>,
        S: Display,
    {
        let message = parts.into_iter().map(|p| p.to_string()).collect::<String>();
        if is_fatal {
            tracing::error!("{}", message);
        } else {
            tracing::warn!("{}", message);
        }
        self.records.push(ErrorRecord { message, is_fatal });
    }

    pub fn add_warning(&mut self, message: impl Display) {
        self.add_error([message], false);
    }

    pub fn add_fatal(&mut self, message: impl Display) {
        self.add_error([message], true);
    }

    pub fn has_fatal_error(&self) -> bool {
        self.records.iter().any(|r| r.is_fatal)
    }

    /// First fatal record, if any.
    pub fn first_fatal(&self) -> Option<&ErrorRecord> {
        self.records.iter().find(|r| r.is_fatal)
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter().filter(|r| !r.is_fatal)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Durations of the pipeline phases, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ExportTimings {
    phases: Vec<(&'static str, Duration)>,
}

impl ExportTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` to `phase`.
    pub fn record(&mut self, phase: &'static str, elapsed: Duration) {
        match self.phases.iter_mut().find(|(name, _)| *name == phase) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((phase, elapsed)),
        }
    }

    pub fn get(&self, phase: &str) -> Option<Duration> {
        self.phases
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, d)| *d)
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }
}

impl Display for ExportTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (phase, elapsed) in &self.phases {
            writeln!(f, "{:<16} {:>10.3} ms", phase, elapsed.as_secs_f64() * 1000.0)?;
        }
        write!(f, "{:<16} {:>10.3} ms", "total", self.total().as_secs_f64() * 1000.0)
    }
}
