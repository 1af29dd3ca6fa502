//! Running totals across the chunks of one repair run.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::types::{ChunkReport, LogEntry};

/// Accumulator for one repair run.
///
/// The three counters only move together through [`AggregateRepairReport::merge`],
/// so `total_attempted == total_successful + total_failed` holds whenever the
/// report can be observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRepairReport {
    total_attempted: u64,
    total_successful: u64,
    total_failed: u64,
    all_details: Vec<serde_json::Value>,
    all_errors: Vec<serde_json::Value>,
    structured_logs: Vec<LogEntry>,
    plain_logs: Vec<String>,
    iterations: u32,
    success_rate: f64,
}

/// A chunk whose counts cannot be added to the run totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chunk counts overflow the run totals ({successful} successful, {failed} failed)")]
pub struct CountOverflow {
    pub successful: u64,
    pub failed: u64,
}

/// How a run's counts read to a person looking at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    NothingToDo,
    FullSuccess,
    PartialSuccess,
    Failed,
}

impl AggregateRepairReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one successful chunk into the totals.
    ///
    /// The backend's `attempted` figure is not trusted on its own: the total
    /// attempted is always `successful + failed`. Counts that would overflow
    /// the totals are refused and leave the report untouched.
    pub fn merge(
        &mut self,
        report: ChunkReport,
        structured_logs: Option<Vec<LogEntry>>,
        plain_logs: Option<Vec<String>>,
    ) -> Result<(), CountOverflow> {
        let ChunkReport {
            attempted,
            successful,
            failed,
            details,
            errors,
            ..
        } = report;

        let overflow = CountOverflow { successful, failed };
        let chunk_attempted = successful.checked_add(failed).ok_or(overflow)?;
        let total_attempted = self
            .total_attempted
            .checked_add(chunk_attempted)
            .ok_or(overflow)?;
        let total_successful = self
            .total_successful
            .checked_add(successful)
            .ok_or(overflow)?;
        let total_failed = self.total_failed.checked_add(failed).ok_or(overflow)?;

        if attempted != chunk_attempted {
            warn!(
                "Chunk reported {} attempted but {} successful + {} failed; using {}",
                attempted, successful, failed, chunk_attempted
            );
        }

        self.total_attempted = total_attempted;
        self.total_successful = total_successful;
        self.total_failed = total_failed;
        self.success_rate = Self::rate(self.total_successful, self.total_attempted);

        self.all_details.extend(details);
        self.all_errors.extend(errors);
        if let Some(logs) = structured_logs {
            self.structured_logs.extend(logs);
        }
        if let Some(logs) = plain_logs {
            self.plain_logs.extend(logs);
        }
        Ok(())
    }

    /// Record an error that ended the run at `iteration`.
    pub fn record_fatal(&mut self, iteration: u32, message: &str) {
        self.all_errors.push(json!({
            "error": message,
            "iteration": iteration,
        }));
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.structured_logs.push(entry);
    }

    pub(crate) fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations;
    }

    fn rate(successful: u64, attempted: u64) -> f64 {
        if attempted == 0 {
            0.0
        } else {
            successful as f64 / attempted as f64
        }
    }

    pub fn total_attempted(&self) -> u64 {
        self.total_attempted
    }

    pub fn total_successful(&self) -> u64 {
        self.total_successful
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed
    }

    pub fn all_details(&self) -> &[serde_json::Value] {
        &self.all_details
    }

    pub fn all_errors(&self) -> &[serde_json::Value] {
        &self.all_errors
    }

    pub fn structured_logs(&self) -> &[LogEntry] {
        &self.structured_logs
    }

    pub fn plain_logs(&self) -> &[String] {
        &self.plain_logs
    }

    /// Number of chunk requests issued.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Last `n` structured log entries, oldest first.
    pub fn log_tail(&self, n: usize) -> &[LogEntry] {
        let start = self.structured_logs.len().saturating_sub(n);
        &self.structured_logs[start..]
    }

    pub fn verdict(&self) -> RunVerdict {
        match (self.total_successful, self.total_failed) {
            (0, 0) => RunVerdict::NothingToDo,
            (_, 0) => RunVerdict::FullSuccess,
            (0, _) => RunVerdict::Failed,
            _ => RunVerdict::PartialSuccess,
        }
    }
}
