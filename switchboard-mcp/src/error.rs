//! Error types for MCP gateway operations

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::protocol::{JsonRpcError, JsonRpcErrorCode, JsonRpcResponse};

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// MCP gateway error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    /// Malformed or disallowed request per protocol rules
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Body is not valid JSON / JSON-RPC
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// HTTP method not accepted on this route
    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    /// Missing or unusable session id
    #[error("Session error: {message}")]
    Session { message: String },

    /// Session id is well-formed but unknown to this transport
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Request conflicts with the transport's current state
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Factory or connect failure while building a transport
    #[error("Transport setup failed: {message}")]
    TransportSetup { message: String },

    /// Write to a peer that is gone
    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    /// JSON-RPC method not implemented by the server
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Invalid method parameters
    #[error("Invalid parameters for method {method}: {details}")]
    InvalidParams { method: String, details: String },

    /// Tool not registered for this routing key
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Outbound HTTP errors
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl McpError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a transport setup error
    pub fn transport_setup(message: impl Into<String>) -> Self {
        Self::TransportSetup {
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            McpError::Protocol { .. } => StatusCode::BAD_REQUEST,
            McpError::Parse { .. } => StatusCode::BAD_REQUEST,
            McpError::Session { .. } => StatusCode::BAD_REQUEST,
            McpError::InvalidParams { .. } => StatusCode::BAD_REQUEST,
            McpError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            McpError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            McpError::MethodNotFound { .. } => StatusCode::NOT_FOUND,
            McpError::ToolNotFound { .. } => StatusCode::NOT_FOUND,
            McpError::Conflict { .. } => StatusCode::CONFLICT,
            McpError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::TransportSetup { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Delivery { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Http { .. } => StatusCode::BAD_GATEWAY,
            McpError::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for JSON-RPC responses
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::Protocol { .. } => JsonRpcErrorCode::InvalidRequest as i32,
            McpError::MethodNotAllowed { .. } => JsonRpcErrorCode::InvalidRequest as i32,
            McpError::Parse { .. } => JsonRpcErrorCode::ParseError as i32,
            McpError::MethodNotFound { .. } => JsonRpcErrorCode::MethodNotFound as i32,
            McpError::InvalidParams { .. } => JsonRpcErrorCode::InvalidParams as i32,
            McpError::ToolNotFound { .. } => JsonRpcErrorCode::InvalidParams as i32,
            McpError::Session { .. } => JsonRpcErrorCode::SessionRequired as i32,
            McpError::Conflict { .. } => JsonRpcErrorCode::SessionRequired as i32,
            McpError::SessionNotFound { .. } => JsonRpcErrorCode::SessionNotFound as i32,
            _ => JsonRpcErrorCode::InternalError as i32,
        }
    }

    /// Create a sanitized error message for external clients
    pub fn client_message(&self) -> String {
        match self {
            McpError::Protocol { message } => message.clone(),
            McpError::Parse { .. } => "Parse error".to_string(),
            McpError::MethodNotAllowed { .. } => "Method not allowed".to_string(),
            McpError::Session { message } => message.clone(),
            McpError::SessionNotFound { .. } => "Session not found".to_string(),
            McpError::Conflict { message } => message.clone(),
            McpError::MethodNotFound { method } => format!("Method '{}' not found", method),
            McpError::InvalidParams { details, .. } => format!("Invalid params: {}", details),
            McpError::ToolNotFound { name } => format!("Unknown tool: {}", name),
            _ => "Internal server error".to_string(),
        }
    }

    /// Convert into a JSON-RPC error object
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.error_code(), self.client_message(), None)
    }
}

/// Build a JSON-RPC error envelope response with a null id
pub fn error_envelope(status: StatusCode, code: i32, message: impl Into<String>) -> Response {
    let body = JsonRpcResponse::error(JsonRpcError::new(code, message, None), None);
    (status, Json(body)).into_response()
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        error_envelope(self.status_code(), self.error_code(), self.client_message())
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        err.to_jsonrpc_error()
    }
}

// Standard error conversions
impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Http {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
