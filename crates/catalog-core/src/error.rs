use thiserror::Error;

/// Core error types for catalog operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{entity} not found")]
    NotFound { entity: String, id: String },

    #[error("{message}")]
    Conflict { entity: String, message: String },

    #[error("{0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new NotFound error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a Conflict error for a business key that is already taken
    pub fn name_taken(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self::Conflict {
            message: format!("{entity} Name already exists. Please try another name."),
            entity,
        }
    }

    /// Create a new Upstream (asset store) error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a new Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::InvalidTimestamp(_)
                | Self::JsonError(_)
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::InvalidTimestamp(_) | Self::JsonError(_) => {
                ErrorCategory::Validation
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Storage,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Upstream => write!(f, "upstream"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
