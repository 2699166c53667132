use thiserror::Error;
use widget_bridge_core::{DeclarationError, ErrorCode, ErrorInfo, PermissionDecision, RequestId, WidgetId};

/// Failure reported by a backend transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Operation timed out")]
    Timeout,

    #[error("Server disconnected")]
    ServerDisconnected,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::Timeout => ErrorCode::Timeout,
            TransportError::ServerDisconnected => ErrorCode::ServerDisconnected,
            TransportError::Network(_) => ErrorCode::NetworkError,
            TransportError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            TransportError::ResourceNotFound(_) => ErrorCode::ResourceNotFound,
            TransportError::SchemaValidation(_) => ErrorCode::SchemaValidationError,
            TransportError::Server(_) => ErrorCode::ServerError,
        }
    }
}

impl From<&TransportError> for ErrorInfo {
    fn from(err: &TransportError) -> Self {
        ErrorInfo::new(err.code(), err.to_string())
    }
}

/// Structured failure of a mediated call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeFailure {
    #[error("Request {request_id} denied: {}", .decision.message())]
    Denied {
        request_id: RequestId,
        decision: PermissionDecision,
    },

    #[error("Request {request_id} failed: {error}")]
    Failed {
        request_id: RequestId,
        error: ErrorInfo,
    },
}

impl InvokeFailure {
    pub fn request_id(&self) -> RequestId {
        match self {
            InvokeFailure::Denied { request_id, .. } | InvokeFailure::Failed { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.error_info().code
    }

    pub fn is_retryable(&self) -> bool {
        self.error_info().retryable
    }

    pub fn decision(&self) -> Option<&PermissionDecision> {
        match self {
            InvokeFailure::Denied { decision, .. } => Some(decision),
            InvokeFailure::Failed { .. } => None,
        }
    }

    pub fn error_info(&self) -> ErrorInfo {
        match self {
            InvokeFailure::Denied { decision, .. } => decision
                .error_info()
                .unwrap_or_else(|| ErrorInfo::new(ErrorCode::ScopeDenied, decision.message())),
            InvokeFailure::Failed { error, .. } => error.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Widget already registered: {0}")]
    AlreadyRegistered(WidgetId),

    #[error("Widget not registered: {0}")]
    UnknownWidget(WidgetId),

    #[error("Invalid permission declaration: {0}")]
    Declaration(#[from] DeclarationError),
}
