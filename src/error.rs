//! The single error type surfaced by every stored-values operation.
//!
//! Validation failures, storage failures, embedding-provider failures, and
//! malformed dataset definitions all arrive as a [`StoredValuesError`]. The
//! [`ErrorKind`] tells them apart; the underlying cause (a `sqlx` error, an
//! HTTP failure, a YAML parse error) is kept as the error's `source()`.

use std::error::Error as StdError;

/// Boxed cause attached to a [`StoredValuesError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T, E = StoredValuesError> = std::result::Result<T, E>;

/// Category of a [`StoredValuesError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An input did not satisfy its contract. Raised before any I/O.
    Validation,
    /// The storage engine rejected or failed a query.
    Storage,
    /// The embedding provider failed or returned an unusable vector.
    Embedding,
    /// The caller cancelled an embedding request.
    Cancelled,
    /// A dataset definition could not be parsed.
    Parse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Embedding => "embedding",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Parse => "parse",
        }
    }
}

/// Error returned by every public stored-values operation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StoredValuesError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StoredValuesError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps `cause`, prefixing its message with `context`.
    pub fn wrap(kind: ErrorKind, context: &str, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self {
            kind,
            message: format!("{}: {}", context, cause),
            source: Some(cause),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Wraps a storage-engine failure.
    ///
    /// `anyhow` errors are rendered with their full context chain so the
    /// driver message survives in `message` as well as in `source()`.
    pub fn storage(context: &str, cause: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Storage,
            message: format!("{}: {:#}", context, cause),
            source: Some(cause.into()),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    /// Re-wraps this error under a new context, keeping its kind.
    ///
    /// Used at operation boundaries so callers see which operation failed
    /// while validation errors stay catchable as validation errors.
    pub fn context(self, context: &str) -> Self {
        let kind = self.kind;
        Self {
            kind,
            message: format!("{}: {}", context, self.message),
            source: Some(Box::new(self)),
        }
    }
}
