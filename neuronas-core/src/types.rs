//! Wire types for the remote `autoRepairService` function.
//!
//! Field names follow the backend's JSON contract; the Rust names are the
//! driver's vocabulary (`attempted`, `next_cursor`, ...) with serde renames
//! bridging the two.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the remote function that performs one repair chunk.
pub const REPAIR_FUNCTION: &str = "autoRepairService";

/// Category of issue a repair run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueType(pub String);

impl IssueType {
    /// Sentinel understood by the backend as "every issue category".
    pub const ALL: &'static str = "all";

    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }
}

impl Default for IssueType {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IssueType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IssueType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One chunk request. Sent once per loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairChunkRequest {
    pub issue_type: IssueType,
    /// Empty means unscoped.
    pub issue_ids: Vec<String>,
    #[serde(rename = "max_repairs_per_call")]
    pub max_items_per_call: u32,
    #[serde(rename = "skip_count")]
    pub resume_cursor: u64,
}

/// Throughput hints the backend may attach to a chunk report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    #[serde(rename = "benchmarks_inspected")]
    pub items_inspected: u64,
}

/// Per-chunk counts and records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    #[serde(rename = "repairs_attempted", default)]
    pub attempted: u64,
    #[serde(rename = "repairs_successful", default)]
    pub successful: u64,
    #[serde(rename = "repairs_failed", default)]
    pub failed: u64,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(rename = "next_skip", default)]
    pub next_cursor: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_stats: Option<ProcessingStats>,
}

/// Full response body of one `autoRepairService` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairChunkResponse {
    pub success: bool,
    #[serde(rename = "repair_report", default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ChunkReport>,
    #[serde(rename = "detailed_logs", default, skip_serializing_if = "Option::is_none")]
    pub structured_logs: Option<Vec<LogEntry>>,
    #[serde(rename = "logs", default, skip_serializing_if = "Option::is_none")]
    pub plain_logs: Option<Vec<String>>,
    /// Domain error message, present when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Severity of a structured log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Progress,
    Warning,
    Error,
    Critical,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Progress => "PROGRESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Success => "SUCCESS",
        };
        f.write_str(s)
    }
}

/// A structured log line produced by the backend or by the driver itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Entry stamped with the current wall-clock time.
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
