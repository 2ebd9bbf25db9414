//! Error types for txgraph core.

use crate::types::{Key, Timestamp};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
///
/// The protocol front end turns this into the machine-checkable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was malformed or not allowed; retrying it unchanged fails again.
    Client,
    /// The transaction lost a conflict and is aborted; retry with a new one.
    Conflict,
    /// Persisting failed; the transaction stays open and may be retried.
    Storage,
    /// A bug or corrupted state.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Client => "client",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in txgraph core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txgraph_storage::StorageError),

    /// A log payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// What went wrong.
        message: String,
    },

    /// The commit log is damaged.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the damaged record.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A mutation body could not be parsed.
    #[error("invalid mutation at line {line}: {message}")]
    InvalidMutation {
        /// 1-based line of the offending statement (1 for JSON bodies).
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A mutation was syntactically fine but not allowed.
    #[error("invalid edit: {message}")]
    InvalidEdit {
        /// What went wrong.
        message: String,
    },

    /// A value does not fit the predicate's declared type.
    #[error("schema mismatch on predicate {predicate}: {message}")]
    SchemaMismatch {
        /// Predicate being written.
        predicate: String,
        /// Why the value was rejected.
        message: String,
    },

    /// Schema text could not be parsed or is inconsistent.
    #[error("invalid schema at line {line}: {message}")]
    InvalidSchema {
        /// 1-based line.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The mutation carried no edits.
    #[error("empty mutation")]
    EmptyMutation,

    /// The mutation is bigger than the configured limit.
    #[error("mutation has {count} edits, limit is {limit}")]
    TooManyEdits {
        /// Edits in the request.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A timestamp that was never issued, or zero where zero is not allowed.
    #[error("invalid timestamp {ts}: {reason}")]
    InvalidTimestamp {
        /// The offending timestamp.
        ts: Timestamp,
        /// Why it was rejected.
        reason: String,
    },

    /// Commit for a start timestamp whose staged state is unknown.
    #[error("unknown transaction with start_ts {start_ts}")]
    UnknownTransaction {
        /// The start timestamp supplied by the caller.
        start_ts: Timestamp,
    },

    /// The transaction already committed, so it can no longer be changed.
    #[error("transaction {start_ts} already committed at {commit_ts}")]
    AlreadyCommitted {
        /// Start timestamp.
        start_ts: Timestamp,
        /// Recorded commit timestamp.
        commit_ts: Timestamp,
    },

    /// Commit found a later commit touching the same key.
    #[error("transaction {start_ts} conflicts on key {key}")]
    TxnConflict {
        /// Start timestamp of the losing transaction.
        start_ts: Timestamp,
        /// First overlapping key found.
        key: Key,
    },

    /// The transaction was aborted earlier.
    #[error("transaction {start_ts} has been aborted")]
    TxnAborted {
        /// Start timestamp.
        start_ts: Timestamp,
    },

    /// The transaction started before the pruned conflict horizon.
    #[error("transaction {start_ts} is too old, conflict history starts at {horizon}")]
    TxnTooOld {
        /// Start timestamp.
        start_ts: Timestamp,
        /// Lowest commit timestamp still indexed.
        horizon: Timestamp,
    },

    /// The transaction's outcome was evicted from the table, so it can no
    /// longer be staged, committed, or replayed.
    #[error("transaction {start_ts} is no longer tracked, entries up to {horizon} were evicted")]
    TxnForgotten {
        /// Start timestamp.
        start_ts: Timestamp,
        /// Highest evicted start timestamp.
        horizon: Timestamp,
    },

    /// Internal invariant violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid mutation error.
    pub fn invalid_mutation(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidMutation {
            line,
            message: message.into(),
        }
    }

    /// Creates an invalid edit error.
    pub fn invalid_edit(message: impl Into<String>) -> Self {
        Self::InvalidEdit {
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(predicate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            predicate: predicate.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            line,
            message: message.into(),
        }
    }

    /// Creates an invalid timestamp error.
    pub fn invalid_timestamp(ts: Timestamp, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            ts,
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMutation { .. }
            | Self::InvalidEdit { .. }
            | Self::SchemaMismatch { .. }
            | Self::InvalidSchema { .. }
            | Self::EmptyMutation
            | Self::TooManyEdits { .. }
            | Self::InvalidTimestamp { .. }
            | Self::UnknownTransaction { .. }
            | Self::TxnForgotten { .. }
            | Self::AlreadyCommitted { .. } => ErrorKind::Client,
            Self::TxnConflict { .. } | Self::TxnAborted { .. } | Self::TxnTooOld { .. } => {
                ErrorKind::Conflict
            }
            Self::Storage(_) | Self::LogCorruption { .. } => ErrorKind::Storage,
            Self::Codec { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if the same call may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}
