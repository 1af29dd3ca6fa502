//! Deciding whether a failed chunk is worth skipping past.

use std::fmt;

use crate::aggregate::CountOverflow;
use crate::client::InvokeError;

/// Why a chunk produced no mergeable report.
#[derive(Debug)]
pub enum ChunkFailure {
    /// No usable response came back.
    Invoke(InvokeError),
    /// The function ran and answered `success: false`.
    Rejected { message: Option<String> },
    /// `success: true` but no `repair_report` to merge.
    MissingReport,
    /// The report's counts cannot be added to the run totals.
    InvalidCounts(CountOverflow),
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke(e) => write!(f, "{}", e),
            Self::Rejected { message } => match message {
                Some(m) => write!(f, "repair rejected: {}", m),
                None => write!(f, "repair rejected without an error message"),
            },
            Self::MissingReport => write!(f, "successful response carried no repair report"),
            Self::InvalidCounts(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvokeError> for ChunkFailure {
    fn from(e: InvokeError) -> Self {
        Self::Invoke(e)
    }
}

impl From<CountOverflow> for ChunkFailure {
    fn from(e: CountOverflow) -> Self {
        Self::InvalidCounts(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Advance the cursor by one chunk and keep going.
    RetryableSkip,
    /// Stop the run.
    Fatal,
}

/// Only network-class invocation failures are skipped; anything the function
/// itself said, or anything we could not make sense of, will recur.
pub fn classify(failure: &ChunkFailure) -> FaultClass {
    match failure {
        ChunkFailure::Invoke(e) if e.is_network() => FaultClass::RetryableSkip,
        ChunkFailure::Invoke(_)
        | ChunkFailure::Rejected { .. }
        | ChunkFailure::MissingReport
        | ChunkFailure::InvalidCounts(_) => FaultClass::Fatal,
    }
}
