use serde::{Deserialize, Serialize};
use std::fmt;

/// One line of a recording file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordedEvent {
    pub timestamp: String, // ISO 8601
    pub correlation_id: String,
    pub direction: Direction,
    /// Remote function name, e.g. "autoRepairService".
    pub function: String,
    pub data: serde_json::Value, // Sanitized
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
    Error,
}

/// Groups all calls belonging to one repair run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
