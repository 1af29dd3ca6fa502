use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::recording::{
    CorrelationId, RecordingLogger, RecordingMiddleware, CORRELATION_ID_HEADER,
};
use crate::types::{RepairChunkRequest, RepairChunkResponse, REPAIR_FUNCTION};

/// Failure to obtain a decodable response from a remote function.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("function returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode function response: {0}")]
    Decode(String),
}

impl InvokeError {
    /// Whether the failure happened below the function's own logic.
    ///
    /// Gateway statuses count: the function never ran, the path to it broke.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => is_gateway_status(*status),
            Self::Decode(_) => false,
        }
    }
}

/// 502, 503 and 504: something between us and the function failed.
fn is_gateway_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

impl From<reqwest::Error> for InvokeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for InvokeError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => Self::Transport(format!("{:#}", e)),
        }
    }
}

/// Seam between the chunk driver and whatever carries the call to the backend.
#[async_trait]
pub trait RepairTransport: Send + Sync {
    /// Perform one `autoRepairService` call.
    ///
    /// `Ok` means a response body was decoded, whether or not it reports
    /// `success`. `Err` means no usable body came back.
    async fn invoke_repair(
        &self,
        correlation_id: &CorrelationId,
        request: &RepairChunkRequest,
    ) -> Result<RepairChunkResponse, InvokeError>;
}

#[async_trait]
impl<T: RepairTransport + ?Sized> RepairTransport for std::sync::Arc<T> {
    async fn invoke_repair(
        &self,
        correlation_id: &CorrelationId,
        request: &RepairChunkRequest,
    ) -> Result<RepairChunkResponse, InvokeError> {
        (**self).invoke_repair(correlation_id, request).await
    }
}

/// HTTP client for the backend's `functions/{name}` endpoints.
#[derive(Clone)]
pub struct FunctionsClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    function_name: String,
}

impl FunctionsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InvokeError> {
        Self::new_with_recording(base_url, api_key, timeout, None)
    }

    pub fn new_with_recording(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        recording_logger: Option<RecordingLogger>,
    ) -> Result<Self, InvokeError> {
        let reqwest_client = reqwest::Client::builder()
            .user_agent(concat!("neuronas/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        let mut builder = ClientBuilder::new(reqwest_client);
        if let Some(logger) = recording_logger {
            builder = builder.with(RecordingMiddleware::new(logger));
        }

        Ok(Self {
            client: builder.build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            function_name: REPAIR_FUNCTION.to_string(),
        })
    }

    /// Target a differently named repair function.
    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    pub fn function_url(&self) -> String {
        format!("{}/functions/{}", self.base_url, self.function_name)
    }
}

#[async_trait]
impl RepairTransport for FunctionsClient {
    async fn invoke_repair(
        &self,
        correlation_id: &CorrelationId,
        request: &RepairChunkRequest,
    ) -> Result<RepairChunkResponse, InvokeError> {
        let url = self.function_url();
        debug!(
            "Invoking {} (skip_count={}, max={})",
            self.function_name, request.resume_cursor, request.max_items_per_call
        );

        let mut builder = self
            .client
            .post(&url)
            .header(CORRELATION_ID_HEADER, correlation_id.0.as_str())
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let status = response.status();

        let body = response.text().await?;

        // Gateways answer for the function, whatever their body claims.
        if is_gateway_status(status.as_u16()) {
            return Err(status_error(status, body));
        }

        // Other non-2xx bodies may still carry a `{success: false, error}` payload.
        match (
            serde_json::from_str::<RepairChunkResponse>(&body),
            status.is_success(),
        ) {
            (Ok(parsed), true) => Ok(parsed),
            (Ok(parsed), false) if !parsed.success => Ok(parsed),
            (_, false) => Err(status_error(status, body)),
            (Err(e), true) => Err(InvokeError::Decode(e.to_string())),
        }
    }
}

fn status_error(status: StatusCode, body: String) -> InvokeError {
    InvokeError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    }
}
