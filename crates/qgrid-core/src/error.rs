#![forbid(unsafe_code)]

//! Errors reported by backend collaborators.
//!
//! # Failure Modes
//!
//! | Variant | Typical cause | Window layer reaction |
//! |---------|---------------|-----------------------|
//! | `ExecutionNotFound` | Execution expired or replaced server-side | Page stays a hole |
//! | `NotCompleted` | Fetch raced ahead of the status poll | Page stays a hole, retried later |
//! | `InvalidRequest` | Bad offset/limit | Page stays a hole |
//! | `Transport` | Network error | Page stays a hole, retried later |
//! | `Timeout` | Fetch exceeded the transport deadline | Page stays a hole, retried later |
//! | `Server` | 5xx or other non-success response | Retried later when transient |
//!
//! None of these cross out of the coalescer: a failed page is logged and
//! simply remains unfetched until a later overlapping range request.

use std::time::Duration;

use crate::execution::ExecutionStatus;

/// Error from a [`PageFetcher`](crate::PageFetcher) or
/// [`QueryService`](crate::QueryService) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The execution id is unknown to the backend.
    ExecutionNotFound(String),
    /// Rows were requested before the execution completed.
    NotCompleted {
        execution_id: String,
        status: ExecutionStatus,
    },
    /// The request was malformed (empty SQL, zero limit, ...).
    InvalidRequest(String),
    /// The transport failed before a response arrived.
    Transport(String),
    /// The transport deadline elapsed.
    Timeout(Duration),
    /// The server answered with a non-success status.
    Server { status: u16, message: String },
}

impl ServiceError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::NotCompleted { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            Self::ExecutionNotFound(_) | Self::InvalidRequest(_) => false,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecutionNotFound(id) => write!(f, "execution not found: {id}"),
            Self::NotCompleted {
                execution_id,
                status,
            } => write!(f, "execution {execution_id} not completed yet ({status})"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Timeout(after) => write!(f, "request timed out after {}ms", after.as_millis()),
            Self::Server { status, message } => write!(f, "server error {status}: {message}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Result alias for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceError>;
