//! Error types and result types for document store operations.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The variants
//! split into two families: caller-input failures (validation, schema,
//! constraint violations) which are never retried, and environmental failures
//! (connection, transaction, transient engine conditions) which the retry
//! coordinator may replay. [`Error::is_retryable`] encodes that split.

use serde_json::Value;
use thiserror::Error;

/// SQLite-compatible primary result codes treated as transient.
///
/// busy, locked, out-of-memory and I/O failures are contention or resource
/// conditions that a later attempt can succeed on.
pub const TRANSIENT_ENGINE_CODES: [i32; 4] = [5, 6, 7, 10];

/// Represents all possible errors raised by the document layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed filter/update input or a failed user validator.
    #[error("validation failed in {operation}: {message}")]
    Validation {
        /// The logical operation that rejected the input.
        operation: String,
        /// The offending field or path, when known.
        field: Option<String>,
        /// The offending value, when known.
        value: Option<Value>,
        message: String,
    },
    /// The schema definition itself is malformed.
    #[error("invalid schema: {message}")]
    SchemaValidation {
        /// The field the schema error concerns, when known.
        field: Option<String>,
        message: String,
    },
    /// A physical uniqueness constraint was violated.
    #[error("unique constraint violated on {collection}.{index}")]
    UniqueConstraint {
        collection: String,
        index: String,
        /// The conflicting value, when the engine surfaced it.
        value: Value,
    },
    /// A non-uniqueness physical constraint was violated.
    #[error("constraint violated: {0}")]
    Constraint(String),
    /// The engine handle is unusable.
    #[error("connection error: {0}")]
    Connection(String),
    /// A commit or rollback failed.
    #[error("transaction error: {0}")]
    Transaction(String),
    /// An engine-native error carrying the engine's numeric result code.
    #[error("engine error (code {code}): {message}")]
    Engine { code: i32, message: String },
    /// Serialization or deserialization of a document failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A retry loop observed its cancellation signal.
    #[error("operation {operation} cancelled")]
    Cancelled { operation: String },
}

/// A specialized `Result` type for document store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::Validation`] without field/value context.
    pub fn validation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            operation: operation.into(),
            field: None,
            value: None,
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::SchemaValidation`] scoped to a field.
    pub fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaValidation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Classifies this error for the retry coordinator.
    ///
    /// Validation, schema and constraint errors are never retryable: the same
    /// input will fail the same way. Connection and transaction failures are
    /// always retryable, as are engine errors carrying a transient result
    /// code. Everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Transaction(_) => true,
            Error::Engine { code, .. } => {
                // Extended result codes keep the primary code in the low byte.
                let primary = code & 0xff;
                TRANSIENT_ENGINE_CODES.contains(&primary)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// A per-document failure inside a batch operation, tagged with the index of
/// the document in the caller's input.
#[derive(Debug)]
pub struct BatchError {
    /// Position of the failing document in the submitted batch.
    pub index: usize,
    pub error: Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_family_is_never_retryable() {
        let errors = [
            Error::validation("insertOne", "bad input"),
            Error::schema("age", "duplicate field"),
            Error::UniqueConstraint {
                collection: "users".into(),
                index: "email".into(),
                value: Value::Null,
            },
            Error::Constraint("not null".into()),
            Error::Serialization("bad json".into()),
            Error::Cancelled { operation: "find".into() },
        ];
        for err in errors {
            assert!(!err.is_retryable(), "{err} must not be retryable");
        }
    }

    #[test]
    fn environmental_family_is_retryable() {
        assert!(Error::Connection("gone".into()).is_retryable());
        assert!(Error::Transaction("commit failed".into()).is_retryable());
        for code in TRANSIENT_ENGINE_CODES {
            let err = Error::Engine { code, message: "transient".into() };
            assert!(err.is_retryable());
        }
        // Extended busy code (SQLITE_BUSY_SNAPSHOT = 517) keeps the primary
        // code in the low byte.
        assert!(Error::Engine { code: 517, message: "busy".into() }.is_retryable());
    }

    #[test]
    fn unclassified_engine_codes_are_fatal() {
        let err = Error::Engine { code: 19, message: "constraint".into() };
        assert!(!err.is_retryable());
        let err = Error::Engine { code: 1, message: "generic".into() };
        assert!(!err.is_retryable());
    }
}
