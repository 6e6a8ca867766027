//! A2A error types — JSON-RPC error codes + A2A-specific errors.
//!
//! Two layers:
//! - Standard JSON-RPC 2.0 errors (-32700 through -32603)
//! - A2A-specific errors (-32001 through -32010)

use crate::types::JsonRpcError;

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// A2A-specific error codes
// ---------------------------------------------------------------------------

/// The requested task was not found.
pub const TASK_NOT_FOUND: i64 = -32001;

/// The task cannot be canceled in its current state.
pub const TASK_NOT_CANCELABLE: i64 = -32002;

/// A state transition was attempted that the task lifecycle forbids.
pub const INVALID_TASK_STATE: i64 = -32003;

/// The operation requires an authenticated caller.
pub const AUTH_REQUIRED: i64 = -32004;

/// Authentication was presented but rejected.
pub const AUTH_FAILED: i64 = -32005;

/// The caller exceeded a rate limit.
pub const RATE_LIMIT: i64 = -32006;

/// The agent is temporarily unavailable.
pub const AGENT_UNAVAILABLE: i64 = -32007;

/// The client and server disagree on the protocol version.
pub const VERSION_MISMATCH: i64 = -32008;

/// The requested capability is not supported by this agent.
pub const CAPABILITY_UNSUPPORTED: i64 = -32009;

/// A server-side resource (queue, worker pool) is exhausted.
pub const RESOURCE_EXHAUSTED: i64 = -32010;

// ---------------------------------------------------------------------------
// A2AError enum
// ---------------------------------------------------------------------------

/// Unified error type for all A2A and JSON-RPC errors.
///
/// Each protocol variant carries a human-readable message and an optional
/// structured `data` payload that is forwarded into the JSON-RPC error
/// object.
///
/// Also includes server-internal variants (`StorageUnavailable`,
/// `QueueClosed`, `Timeout`) that are not A2A codes themselves but map onto
/// internal-error (with a redacted message) when they surface to a caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum A2AError {
    /// Invalid JSON payload (code -32700).
    #[error("Parse error: {message}")]
    ParseError {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Request payload validation error (code -32600).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Method not found (code -32601).
    #[error("Method not found: {message}")]
    MethodNotFound {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Invalid parameters (code -32602).
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Internal error (code -32603).
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Task not found (code -32001).
    #[error("Task not found: {message}")]
    TaskNotFound {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Task cannot be canceled (code -32002).
    #[error("Task not cancelable: {message}")]
    TaskNotCancelable {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Illegal task state transition (code -32003).
    #[error("Invalid task state: {message}")]
    InvalidTaskState {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Authentication required (code -32004).
    #[error("Authentication required: {message}")]
    AuthRequired {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Authentication failed (code -32005).
    #[error("Authentication failed: {message}")]
    AuthFailed {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Rate limit exceeded (code -32006).
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Agent temporarily unavailable (code -32007).
    #[error("Agent unavailable: {message}")]
    AgentUnavailable {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Protocol version mismatch (code -32008).
    #[error("Version mismatch: {message}")]
    VersionMismatch {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Capability not supported (code -32009).
    #[error("Capability unsupported: {message}")]
    CapabilityUnsupported {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Resource exhausted (code -32010).
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    // -- Server-internal errors (surface as internal-error) --
    /// The persistence backend is unreachable or failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A publish was attempted on a closed event queue.
    #[error("Event queue closed: {0}")]
    QueueClosed(String),

    /// An internal wait expired.
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Convenience result type for A2A operations.
pub type A2AResult<T> = Result<T, A2AError>;

macro_rules! message_ctor {
    ($($(#[$doc:meta])* $fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(message: impl Into<String>) -> Self {
                Self::$variant {
                    message: message.into(),
                    data: None,
                }
            }
        )*
    };
}

impl A2AError {
    message_ctor! {
        /// Create a `ParseError` with a message and no data.
        parse_error => ParseError,
        /// Create an `InvalidRequest` with a message and no data.
        invalid_request => InvalidRequest,
        /// Create a `MethodNotFound` with a message and no data.
        method_not_found => MethodNotFound,
        /// Create an `InvalidParams` with a message and no data.
        invalid_params => InvalidParams,
        /// Create an `Internal` with a message and no data.
        internal => Internal,
        /// Create a `TaskNotFound` with a message and no data.
        task_not_found => TaskNotFound,
        /// Create a `TaskNotCancelable` with a message and no data.
        task_not_cancelable => TaskNotCancelable,
        /// Create an `InvalidTaskState` with a message and no data.
        invalid_task_state => InvalidTaskState,
        /// Create an `AuthRequired` with a message and no data.
        auth_required => AuthRequired,
        /// Create an `AuthFailed` with a message and no data.
        auth_failed => AuthFailed,
        /// Create an `AgentUnavailable` with a message and no data.
        agent_unavailable => AgentUnavailable,
        /// Create a `CapabilityUnsupported` with a message and no data.
        capability_unsupported => CapabilityUnsupported,
        /// Create a `ResourceExhausted` with a message and no data.
        resource_exhausted => ResourceExhausted,
    }

    /// Returns the JSON-RPC error code for this error variant.
    ///
    /// Server-internal variants that don't map to A2A codes return
    /// -32603 (internal error).
    pub fn code(&self) -> i64 {
        match self {
            A2AError::ParseError { .. } => PARSE_ERROR,
            A2AError::InvalidRequest { .. } => INVALID_REQUEST,
            A2AError::MethodNotFound { .. } => METHOD_NOT_FOUND,
            A2AError::InvalidParams { .. } => INVALID_PARAMS,
            A2AError::Internal { .. } => INTERNAL_ERROR,
            A2AError::TaskNotFound { .. } => TASK_NOT_FOUND,
            A2AError::TaskNotCancelable { .. } => TASK_NOT_CANCELABLE,
            A2AError::InvalidTaskState { .. } => INVALID_TASK_STATE,
            A2AError::AuthRequired { .. } => AUTH_REQUIRED,
            A2AError::AuthFailed { .. } => AUTH_FAILED,
            A2AError::RateLimited { .. } => RATE_LIMIT,
            A2AError::AgentUnavailable { .. } => AGENT_UNAVAILABLE,
            A2AError::VersionMismatch { .. } => VERSION_MISMATCH,
            A2AError::CapabilityUnsupported { .. } => CAPABILITY_UNSUPPORTED,
            A2AError::ResourceExhausted { .. } => RESOURCE_EXHAUSTED,
            A2AError::StorageUnavailable(_)
            | A2AError::QueueClosed(_)
            | A2AError::Timeout(_) => INTERNAL_ERROR,
        }
    }

    /// Attach structured data to a variant that supports it.
    pub fn with_data(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            A2AError::ParseError { data, .. }
            | A2AError::InvalidRequest { data, .. }
            | A2AError::MethodNotFound { data, .. }
            | A2AError::InvalidParams { data, .. }
            | A2AError::Internal { data, .. }
            | A2AError::TaskNotFound { data, .. }
            | A2AError::TaskNotCancelable { data, .. }
            | A2AError::InvalidTaskState { data, .. }
            | A2AError::AuthRequired { data, .. }
            | A2AError::AuthFailed { data, .. }
            | A2AError::RateLimited { data, .. }
            | A2AError::AgentUnavailable { data, .. }
            | A2AError::VersionMismatch { data, .. }
            | A2AError::CapabilityUnsupported { data, .. }
            | A2AError::ResourceExhausted { data, .. } => *data = Some(value),
            A2AError::StorageUnavailable(_)
            | A2AError::QueueClosed(_)
            | A2AError::Timeout(_) => {}
        }
        self
    }
}

impl From<A2AError> for JsonRpcError {
    fn from(err: A2AError) -> Self {
        let code = err.code();
        // Internal-class failures must not leak backend details to callers.
        let message = match &err {
            A2AError::StorageUnavailable(_) | A2AError::QueueClosed(_) | A2AError::Timeout(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        let data = match &err {
            A2AError::ParseError { data, .. }
            | A2AError::InvalidRequest { data, .. }
            | A2AError::MethodNotFound { data, .. }
            | A2AError::InvalidParams { data, .. }
            | A2AError::Internal { data, .. }
            | A2AError::TaskNotFound { data, .. }
            | A2AError::TaskNotCancelable { data, .. }
            | A2AError::InvalidTaskState { data, .. }
            | A2AError::AuthRequired { data, .. }
            | A2AError::AuthFailed { data, .. }
            | A2AError::RateLimited { data, .. }
            | A2AError::AgentUnavailable { data, .. }
            | A2AError::VersionMismatch { data, .. }
            | A2AError::CapabilityUnsupported { data, .. }
            | A2AError::ResourceExhausted { data, .. } => data.clone(),
            _ => None,
        };
        JsonRpcError {
            code,
            message,
            data,
        }
    }
}

impl From<serde_json::Error> for A2AError {
    fn from(err: serde_json::Error) -> Self {
        A2AError::ParseError {
            message: err.to_string(),
            data: None,
        }
    }
}
