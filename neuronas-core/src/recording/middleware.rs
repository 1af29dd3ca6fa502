use super::sanitizer::Sanitizer;
use super::types::{CorrelationId, Direction, RecordedEvent, CORRELATION_ID_HEADER};
use super::RecordingLogger;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use serde_json::{json, Value};

/// Bodies above this size are summarised rather than recorded.
const MAX_RECORDED_BODY: usize = 64 * 1024;

/// `reqwest-middleware` layer writing each function call to a [`RecordingLogger`].
pub struct RecordingMiddleware {
    logger: RecordingLogger,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger) -> Self {
        Self { logger }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| CorrelationId(v.to_string()))
            .or_else(|| extensions.get::<CorrelationId>().cloned())
            .unwrap_or_else(CorrelationId::generate);

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = correlation_id.0.parse() {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let function = function_name(req.url());
        self.emit(&correlation_id, &function, Direction::Request, request_data(&req));

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let data = json!({
                    "status_code": resp.status().as_u16(),
                    "headers": Sanitizer::sanitize_headers(
                        resp.headers()
                            .iter()
                            .filter_map(|(k, v)| Some((k.as_str(), v.to_str().ok()?)))
                    ),
                    "body_size": resp.content_length(),
                });
                self.emit(&correlation_id, &function, Direction::Response, data);
            }
            Err(err) => {
                let data = json!({ "error": err.to_string() });
                self.emit(&correlation_id, &function, Direction::Error, data);
            }
        }

        response
    }
}

impl RecordingMiddleware {
    fn emit(&self, correlation_id: &CorrelationId, function: &str, direction: Direction, data: Value) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.0.clone(),
            direction,
            function: function.to_string(),
            data,
        });
    }
}

fn request_data(req: &Request) -> Value {
    let body = match req.body().and_then(|b| b.as_bytes()) {
        Some(bytes) if bytes.len() > MAX_RECORDED_BODY => {
            Value::String(format!("[LARGE_BODY_{}b]", bytes.len()))
        }
        Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
            Ok(parsed) => Sanitizer::sanitize_json(&parsed),
            Err(_) => Value::String(format!("[NON_JSON_BODY_{}b]", bytes.len())),
        },
        None => Value::Null,
    };

    json!({
        "method": req.method().as_str(),
        "url": req.url().as_str(),
        "headers": Sanitizer::sanitize_headers(
            req.headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str(), v.to_str().ok()?)))
        ),
        "body": body,
    })
}

/// Last path segment of a `/functions/{name}` URL.
fn function_name(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.path().to_string())
}
