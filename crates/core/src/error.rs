//! Unified error types for the reconciliation pipeline.
//!
//! Error codes:
//! - VALID_001-002: Invalid operator input
//! - DB_001-002: Store failures

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Parameter out of range or unparsable
    InvalidParameter,
    /// VALID_002: Unknown event type for a processor
    UnknownEventType,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "VALID_001",
            Self::UnknownEventType => "VALID_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Database error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: A statement or transaction against the store failed
    StoreFailed,
    /// DB_002: Schema could not be created
    SchemaFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "DB_001",
            Self::SchemaFailed => "DB_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        500
    }
}

/// Unified error type for the pipeline.
///
/// Payload problems never surface here: the extraction layer turns them into
/// defaults. Only operator input and store failures become errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Validation error with code.
    #[error("[{code}] {message}")]
    ValidationWithCode {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Database error with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with code.
    pub fn validation_code(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::ValidationWithCode {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a database error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Shorthand for a failed store statement.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::database(DbErrorCode::StoreFailed, msg)
    }

    pub fn unknown_event_type(kind: impl AsRef<str>) -> Self {
        Self::validation_code(
            ValidationErrorCode::UnknownEventType,
            format!(
                "unknown event type '{}', expected one of: pageview, page_exit, batch, form_submit",
                kind.as_ref()
            ),
        )
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::validation_code(ValidationErrorCode::InvalidParameter, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationWithCode { http_status, .. } => *http_status,
            Self::Database { http_status, .. } => *http_status,
            Self::Validation(_) => 400,
            Self::Serialization(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ValidationWithCode { code, .. } => Some(code),
            Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the error came from the store rather than from caller input.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Database { .. })
    }
}
