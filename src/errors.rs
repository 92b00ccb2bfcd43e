use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error code reserved for custom server errors. Unused internally
/// but available to handlers raising application errors.
pub const SERVER_ERROR: i32 = -32000;

/// Everything that can go wrong between receiving a wire payload and
/// producing a wire response. Each variant maps to a fixed protocol error
/// code; nothing here is allowed to escape as a transport-level failure.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("undefined operation `{0}'")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{message}")]
    Application {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl RpcError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn method_not_found(name: impl Into<String>) -> Self {
        Self::MethodNotFound(name.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// An error raised deliberately by a handler, carrying its own code and
    /// optional structured data.
    pub fn application(code: i32, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn application_with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self::Application {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// The JSON-RPC 2.0 error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Internal(_) => -32603,
            Self::Application { code, .. } => *code,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Application { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}
