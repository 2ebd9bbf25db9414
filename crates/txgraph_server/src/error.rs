//! Error types for the protocol front end.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use txgraph_core::{CoreError, ErrorKind, Timestamp};
use txgraph_query::QueryError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Machine-checkable error code carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Malformed input; retrying the same request cannot succeed.
    ErrorInvalidRequest,
    /// The transaction was aborted; retry with a new transaction.
    ErrorAborted,
    /// Persistence failed; the request may be retried.
    ErrorStorage,
    /// A bug or broken invariant.
    ErrorInternal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorCode::ErrorInvalidRequest => "ErrorInvalidRequest",
            ErrorCode::ErrorAborted => "ErrorAborted",
            ErrorCode::ErrorStorage => "ErrorStorage",
            ErrorCode::ErrorInternal => "ErrorInternal",
        };
        f.write_str(code)
    }
}

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No route for the path.
    #[error("no route for {0}")]
    NotFound(String),

    /// The route exists but not for this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Request body over the configured limit.
    #[error("request body of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Body size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Transaction, mutation or schema error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Query error.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Response encoding failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Envelope error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::Core(err) => match err.kind() {
                ErrorKind::Client => ErrorCode::ErrorInvalidRequest,
                ErrorKind::Conflict => ErrorCode::ErrorAborted,
                ErrorKind::Storage => ErrorCode::ErrorStorage,
                ErrorKind::Internal => ErrorCode::ErrorInternal,
            },
            ServerError::Internal(_) => ErrorCode::ErrorInternal,
            ServerError::InvalidRequest(_)
            | ServerError::NotFound(_)
            | ServerError::MethodNotAllowed { .. }
            | ServerError::PayloadTooLarge { .. }
            | ServerError::Query(_) => ErrorCode::ErrorInvalidRequest,
        }
    }

    /// Transport status. Application errors travel in the envelope with 200.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PayloadTooLarge { .. } => 413,
            _ => 200,
        }
    }

    /// Start timestamp of the transaction this error aborted, if any.
    #[must_use]
    pub fn aborted_txn(&self) -> Option<Timestamp> {
        match self {
            ServerError::Core(
                CoreError::TxnConflict { start_ts, .. }
                | CoreError::TxnAborted { start_ts }
                | CoreError::TxnTooOld { start_ts, .. },
            ) => Some(*start_ts),
            _ => None,
        }
    }

    /// Returns true if this is the caller's fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.code() == ErrorCode::ErrorInvalidRequest
    }

    /// Returns true if the same request may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Core(err) if err.is_retryable())
    }
}
