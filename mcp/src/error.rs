//! Error taxonomy for the relay core.
//!
//! One variant per canonical error code plus a handful of component-internal
//! conditions that never cross the JSON-RPC/HTTP boundary directly.

use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

/// Error category, used for HTTP status mapping and JSON-RPC error-code bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Connection,
    Operation,
    System,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid service name: {0}")]
    InvalidServiceName(String),

    #[error("server already exists: {0}")]
    ServerAlreadyExists(String),

    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timed out: {0}")]
    ConnectionTimeout(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool validation failed: {0}")]
    ToolValidationFailed(String),

    #[error("endpoint already exists: {0}")]
    EndpointAlreadyExists(String),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("endpoint already connected: {0}")]
    EndpointAlreadyConnected(String),

    #[error("endpoint not connected: {0}")]
    EndpointNotConnected(String),

    #[error("internal error: {0}")]
    InternalError(String),

    /// Upstream service exists but is not currently connected. Surfaced without waiting.
    #[error("service not connected: {0}")]
    ServiceNotConnected(String),

    /// Service was stopped while a call was in flight.
    #[error("service stopped: {0}")]
    ServiceStopped(String),

    /// Transport closed unexpectedly; pending requests are terminated with this.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A per-operation timeout (connect/call/ping) elapsed.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A config value was structurally fine but semantically rejected (e.g. bad URL scheme).
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error(transparent)]
    Sdk(#[from] Box<rmcp::RmcpError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl RelayError {
    pub fn category(&self) -> ErrorCategory {
        use RelayError::*;
        match self {
            InvalidServiceName(_) | ToolValidationFailed(_) => ErrorCategory::Validation,
            InvalidConfig(_) | ServerAlreadyExists(_) | EndpointAlreadyExists(_)
            | EndpointAlreadyConnected(_) | Yaml(_) | InvalidEndpoint(_) => {
                ErrorCategory::Configuration
            }
            ConnectionFailed(_) | ConnectionTimeout(_) | ConnectionLost(_) | Timeout(_)
            | ServiceUnavailable(_) | WebSocket(_) | Http(_) => ErrorCategory::Connection,
            ServerNotFound(_) | ToolNotFound(_) | EndpointNotFound(_) | ServiceNotConnected(_)
            | ServiceStopped(_) | EndpointNotConnected(_) => ErrorCategory::Operation,
            InternalError(_) | Sdk(_) | Io(_) => ErrorCategory::System,
        }
    }

    /// HTTP status per §7: validation->400, configuration->400 except *_ALREADY_EXISTS->409,
    /// connection->500, not-found->404, system->500.
    pub fn http_status(&self) -> u16 {
        use RelayError::*;
        match self {
            ServerAlreadyExists(_) | EndpointAlreadyExists(_) | EndpointAlreadyConnected(_) => 409,
            ServerNotFound(_) | ToolNotFound(_) | EndpointNotFound(_) => 404,
            _ => match self.category() {
                ErrorCategory::Validation | ErrorCategory::Configuration => 400,
                ErrorCategory::Connection => 500,
                ErrorCategory::Operation => 404,
                ErrorCategory::System => 500,
            },
        }
    }

    /// The canonical SCREAMING_SNAKE_CASE code from §6, when this variant has one.
    pub fn code(&self) -> &'static str {
        use RelayError::*;
        match self {
            InvalidServiceName(_) => "INVALID_SERVICE_NAME",
            ServerAlreadyExists(_) => "SERVER_ALREADY_EXISTS",
            ServerNotFound(_) => "SERVER_NOT_FOUND",
            InvalidConfig(_) | Yaml(_) => "INVALID_CONFIG",
            ConnectionFailed(_) => "CONNECTION_FAILED",
            ConnectionTimeout(_) => "CONNECTION_TIMEOUT",
            ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ToolNotFound(_) => "TOOL_NOT_FOUND",
            ToolValidationFailed(_) => "TOOL_VALIDATION_FAILED",
            EndpointAlreadyExists(_) => "ENDPOINT_ALREADY_EXISTS",
            EndpointNotFound(_) => "ENDPOINT_NOT_FOUND",
            EndpointAlreadyConnected(_) => "ENDPOINT_ALREADY_CONNECTED",
            EndpointNotConnected(_) => "ENDPOINT_NOT_CONNECTED",
            ServiceNotConnected(_) => "SERVICE_NOT_CONNECTED",
            ServiceStopped(_) => "SERVICE_STOPPED",
            ConnectionLost(_) => "CONNECTION_LOST",
            Timeout(_) => "TIMEOUT",
            InvalidEndpoint(_) => "INVALID_ENDPOINT",
            InternalError(_) | Sdk(_) | Io(_) | Http(_) | WebSocket(_) => "INTERNAL_ERROR",
        }
    }

    /// JSON-RPC error code per §4.D: bad input -32602, unknown method/tool -32601, else -32603.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            RelayError::ToolValidationFailed(_) | RelayError::InvalidServiceName(_) => -32602,
            RelayError::ToolNotFound(_) => -32601,
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_maps_to_409() {
        assert_eq!(RelayError::ServerAlreadyExists("x".into()).http_status(), 409);
        assert_eq!(RelayError::EndpointAlreadyExists("x".into()).http_status(), 409);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(RelayError::ToolNotFound("x".into()).http_status(), 404);
        assert_eq!(RelayError::ServerNotFound("x".into()).http_status(), 404);
    }

    #[test]
    fn tool_not_found_uses_method_not_found_code() {
        assert_eq!(RelayError::ToolNotFound("x".into()).json_rpc_code(), -32601);
    }

    #[test]
    fn validation_errors_use_invalid_params_code() {
        assert_eq!(
            RelayError::ToolValidationFailed("x".into()).json_rpc_code(),
            -32602
        );
    }

    #[test]
    fn codes_round_trip_canonical_names() {
        assert_eq!(RelayError::ToolNotFound("x".into()).code(), "TOOL_NOT_FOUND");
        assert_eq!(
            RelayError::EndpointNotFound("x".into()).code(),
            "ENDPOINT_NOT_FOUND"
        );
    }
}
