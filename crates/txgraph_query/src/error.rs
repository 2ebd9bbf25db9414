//! Query error types.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing or evaluating a query.
///
/// All of them are the caller's fault; evaluation over a snapshot cannot
/// fail for storage reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query text is malformed.
    #[error("line {line} column {column}: {message}")]
    Parse {
        /// 1-based line.
        line: usize,
        /// 1-based column.
        column: usize,
        /// What went wrong.
        message: String,
    },

    /// A function needs an index the predicate does not declare.
    #[error("attribute {predicate} is not indexed with @index({tokenizer}), required by {function}")]
    MissingIndex {
        /// Predicate queried.
        predicate: String,
        /// Required tokenizer.
        tokenizer: String,
        /// Function that needs it.
        function: String,
    },

    /// A function argument is well-formed but unusable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What went wrong.
        message: String,
    },
}

impl QueryError {
    /// Creates a parse error.
    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Creates a missing-index error.
    pub fn missing_index(
        predicate: impl Into<String>,
        tokenizer: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self::MissingIndex {
            predicate: predicate.into(),
            tokenizer: tokenizer.into(),
            function: function.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_position() {
        let err = QueryError::parse(3, 7, "expected '{'");
        assert_eq!(err.to_string(), "line 3 column 7: expected '{'");
    }

    #[test]
    fn missing_index_display() {
        let err = QueryError::missing_index("name", "term", "anyofterms");
        assert!(err.to_string().contains("@index(term)"));
    }
}
