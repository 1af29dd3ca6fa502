use serde_json::Value;
use std::collections::HashMap;

/// Headers whose values must never reach a recording.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "api_key",
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// JSON object keys whose values are replaced wholesale.
pub const SENSITIVE_JSON_KEYS: &[&str] = &["access_token", "api_key", "password", "secret", "token"];

const REDACTED: &str = "[REDACTED]";

pub struct Sanitizer;

impl Sanitizer {
    pub fn is_sensitive_header(header_name: &str) -> bool {
        let lower = header_name.to_lowercase();
        SENSITIVE_HEADERS.contains(&lower.as_str())
    }

    pub fn sanitize_headers<'a, I>(headers: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .map(|(key, value)| {
                let value = if Self::is_sensitive_header(key) {
                    REDACTED
                } else {
                    value
                };
                (key.to_string(), value.to_string())
            })
            .collect()
    }

    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let val = if SENSITIVE_JSON_KEYS.contains(&key.to_lowercase().as_str()) {
                            Value::String(REDACTED.to_string())
                        } else {
                            Self::sanitize_json(val)
                        };
                        (key.clone(), val)
                    })
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }
}
