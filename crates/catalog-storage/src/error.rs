//! Storage error types for the document storage layer.

use std::fmt;

use catalog_core::CoreError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A write would have stored a second document with the same value in a
    /// uniquely indexed field.
    #[error("Duplicate key in {collection}: {field} = {value}")]
    DuplicateKey {
        /// The collection holding the index.
        collection: String,
        /// The uniquely indexed field.
        field: String,
        /// The conflicting value.
        value: String,
    },

    /// The document is not a JSON object or is otherwise unusable.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Description of why the document is invalid.
        message: String,
    },

    /// A filter could not be evaluated (for example a bad pattern).
    #[error("Invalid filter: {message}")]
    InvalidFilter {
        /// Description of the filter problem.
        message: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `DuplicateKey` error.
    #[must_use]
    pub fn duplicate_key(
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a new `InvalidDocument` error.
    #[must_use]
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidFilter` error.
    #[must_use]
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a duplicate key error.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Returns the offending field of a duplicate key error.
    #[must_use]
    pub fn duplicate_field(&self) -> Option<&str> {
        match self {
            Self::DuplicateKey { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DuplicateKey { .. } => ErrorCategory::Conflict,
            Self::InvalidDocument { .. } | Self::InvalidFilter { .. } => {
                ErrorCategory::Validation
            }
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unique index violation.
    Conflict,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Storage failures that reach the service layer unhandled are server errors.
///
/// Duplicate keys are translated by the caller, which knows whether the
/// field is an identifier (retry) or a business key (conflict).
impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::duplicate_key("categories", "categoryName", "Antibiotics");
        assert_eq!(
            err.to_string(),
            "Duplicate key in categories: categoryName = Antibiotics"
        );

        let err = StorageError::invalid_document("expected object");
        assert_eq!(err.to_string(), "Invalid document: expected object");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::duplicate_key("sliders", "sliderId", "sliderId0001");
        assert!(err.is_duplicate_key());
        assert_eq!(err.duplicate_field(), Some("sliderId"));

        let err = StorageError::internal("lock poisoned");
        assert!(!err.is_duplicate_key());
        assert_eq!(err.duplicate_field(), None);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::duplicate_key("a", "b", "c").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_filter("bad pattern").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::connection_error("refused").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_into_core_error() {
        let core: CoreError = StorageError::internal("boom").into();
        assert!(core.is_server_error());
        assert_eq!(core.to_string(), "Storage error: Internal error: boom");
    }
}
