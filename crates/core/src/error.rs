use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Normalized error taxonomy shared by denials and transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ScopeDenied,
    ConstraintViolation,
    RateLimitExceeded,
    UserRejected,
    UserTimeout,
    Timeout,
    ServerDisconnected,
    NetworkError,
    ToolNotFound,
    ResourceNotFound,
    SchemaValidationError,
    ServerError,
}

impl ErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimitExceeded
                | ErrorCode::UserRejected
                | ErrorCode::UserTimeout
                | ErrorCode::Timeout
                | ErrorCode::ServerDisconnected
                | ErrorCode::NetworkError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ScopeDenied => "SCOPE_DENIED",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::UserRejected => "USER_REJECTED",
            ErrorCode::UserTimeout => "USER_TIMEOUT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ServerDisconnected => "SERVER_DISCONNECTED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::SchemaValidationError => "SCHEMA_VALIDATION_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{code, message, retryable}` triple carried by error outcomes and audit
/// error events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
