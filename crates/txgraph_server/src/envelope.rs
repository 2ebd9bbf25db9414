//! Response envelope.

use crate::error::{ErrorCode, ServerError};
use serde::Serialize;
use serde_json::Value as Json;
use txgraph_core::{Key, Timestamp};

/// `{"data", "errors", "extensions"}`, absent parts skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    /// Result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
    /// Application errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
    /// Transaction metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

/// One error in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Machine-checkable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// The `extensions` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extensions {
    /// Transaction metadata.
    pub txn: TxnContext,
}

/// The `extensions.txn` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxnContext {
    /// Start timestamp.
    pub start_ts: Timestamp,
    /// Commit timestamp, once committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_ts: Option<Timestamp>,
    /// Conflict keys produced by a mutate.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
    /// True once the transaction is aborted.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
}

impl TxnContext {
    /// Context carrying only a start timestamp.
    #[must_use]
    pub fn started(start_ts: Timestamp) -> Self {
        Self {
            start_ts,
            ..Self::default()
        }
    }
}

impl Envelope {
    /// Successful envelope.
    #[must_use]
    pub fn ok(data: Json, txn: Option<TxnContext>) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            extensions: txn.map(|txn| Extensions { txn }),
        }
    }

    /// Envelope reporting `err`; conflicts also report the aborted transaction.
    #[must_use]
    pub fn error(err: &ServerError) -> Self {
        let extensions = err.aborted_txn().map(|start_ts| Extensions {
            txn: TxnContext {
                aborted: true,
                ..TxnContext::started(start_ts)
            },
        });
        Self {
            data: None,
            errors: vec![ErrorEntry {
                code: err.code(),
                message: err.to_string(),
            }],
            extensions,
        }
    }

    /// The `{"code": "Success", "message": "Done"}` payload.
    #[must_use]
    pub fn done() -> serde_json::Map<String, Json> {
        let mut data = serde_json::Map::new();
        data.insert("code".into(), Json::String("Success".into()));
        data.insert("message".into(), Json::String("Done".into()));
        data
    }

    /// Serializes to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an internal error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ServerError> {
        serde_json::to_vec(self)
            .map_err(|e| ServerError::internal(format!("failed to encode envelope: {e}")))
    }
}
