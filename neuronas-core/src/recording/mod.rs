//! Optional capture of remote function traffic to a JSONL file.
//!
//! Every chunk call of a run shares one correlation id, so a recording can be
//! grouped back into runs after the fact.

pub mod logger;
pub mod middleware;
pub mod sanitizer;
pub mod types;

pub use logger::RecordingLogger;
pub use middleware::RecordingMiddleware;
pub use sanitizer::{Sanitizer, SENSITIVE_HEADERS, SENSITIVE_JSON_KEYS};
pub use types::*;
