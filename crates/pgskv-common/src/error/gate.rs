//! Gate error types.
//!
//! Every failure that crosses into the relational engine is a `GateError`.
//! Each variant belongs to exactly one class of the taxonomy and carries a
//! stable `ErrorCode`, so callers can map it onto their own error table.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Deliberately unimplemented feature.
    NotSupported = 0x0002,
    /// Bad reference such as an unknown column.
    InvalidArgument = 0x0003,
    /// Operation timed out.
    Timeout = 0x0004,
    /// Configuration is invalid.
    Config = 0x0005,

    // Request errors (0x0100 - 0x01FF)
    /// Malformed request shape.
    UsageError = 0x0100,
    /// Relational type has no key-value mapping.
    UnsupportedType = 0x0101,

    // Catalog errors (0x0200 - 0x02FF)
    /// Missing row, schema, table, or database.
    NotFound = 0x0200,
    /// Internal invariant violated (catalog or codec mismatch).
    Corruption = 0x0201,
    /// Database, table, or index already exists.
    AlreadyExists = 0x0202,

    // Transaction errors (0x0300 - 0x03FF)
    /// Conflict or stale read; the statement should be retried.
    RestartRequired = 0x0300,
    /// Operation on a transaction that already ended.
    InvalidTransaction = 0x0301,
    /// Unique or insert-only violation.
    DuplicateKey = 0x0302,

    // Substrate errors (0x0400 - 0x04FF)
    /// Partition or routing churn; retry with backoff.
    ServiceUnavailable = 0x0400,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Request",
            0x02 => "Catalog",
            0x03 => "Transaction",
            0x04 => "Substrate",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome class carried in an operation response.
///
/// This is the coarse status the relational engine inspects before it
/// looks at the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestStatus {
    /// The operation succeeded.
    #[default]
    Ok,
    /// The request was malformed.
    UsageError,
    /// The statement or transaction must be restarted.
    RestartRequired,
    /// A unique constraint was violated.
    DuplicateKey,
    /// Any other runtime failure.
    RuntimeError,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::UsageError => "USAGE_ERROR",
            Self::RestartRequired => "RESTART_REQUIRED",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::RuntimeError => "RUNTIME_ERROR",
        };
        f.write_str(name)
    }
}

/// The main error type for pgskv.
///
/// # Example
///
/// ```rust
/// use pgskv_common::error::{ErrorCode, GateError, GateResult};
///
/// fn find_column(id: i32) -> GateResult<()> {
///     Err(GateError::invalid_argument(format!("cannot find base column {id}")))
/// }
///
/// let err = find_column(7).unwrap_err();
/// assert_eq!(err.code(), ErrorCode::InvalidArgument);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Deliberately unimplemented feature.
    #[error("not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Bad reference, such as an unknown column or type.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("timed out: {message}")]
    Timeout {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// Malformed request shape.
    #[error("invalid command: {message}")]
    Usage {
        /// Error message.
        message: String,
    },

    /// Relational type without a key-value mapping.
    #[error("unsupported type: {type_name}")]
    UnsupportedType {
        /// Name of the relational type.
        type_name: String,
    },

    // ==========================================================================
    // Catalog Errors
    // ==========================================================================
    /// Missing row, schema, table, or database.
    #[error("not found: {message}")]
    NotFound {
        /// Error message.
        message: String,
    },

    /// Internal invariant violated.
    #[error("corruption: {message}")]
    Corruption {
        /// Error message.
        message: String,
    },

    /// Database, table, or index already exists.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Transactional conflict or stale read.
    #[error("restart required: {message}")]
    RestartRequired {
        /// Error message.
        message: String,
    },

    /// Operation on a transaction that already ended.
    #[error("invalid transaction: {message}")]
    InvalidTransaction {
        /// Error message.
        message: String,
    },

    /// Unique or insert-only violation.
    #[error("duplicate key: {message}")]
    DuplicateKey {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Substrate Errors
    // ==========================================================================
    /// Partition or routing unavailable.
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        /// Error message.
        message: String,
    },
}

impl GateError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Creates a not-supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported { operation: operation.into() }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Creates a usage (invalid command) error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption { message: message.into() }
    }

    /// Creates an already-exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists { message: message.into() }
    }

    /// Creates a restart-required error.
    pub fn restart_required(message: impl Into<String>) -> Self {
        Self::RestartRequired { message: message.into() }
    }

    /// Creates an invalid-transaction error.
    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        Self::InvalidTransaction { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    /// Creates a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { message: message.into() }
    }

    /// Creates a duplicate-key error.
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::DuplicateKey { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Returns the stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Config { .. } => ErrorCode::Config,
            Self::Usage { .. } => ErrorCode::UsageError,
            Self::UnsupportedType { .. } => ErrorCode::UnsupportedType,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::RestartRequired { .. } => ErrorCode::RestartRequired,
            Self::InvalidTransaction { .. } => ErrorCode::InvalidTransaction,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Returns the response status the relational engine sees for this error.
    #[must_use]
    pub const fn request_status(&self) -> RequestStatus {
        match self {
            Self::Usage { .. }
            | Self::InvalidArgument { .. }
            | Self::UnsupportedType { .. }
            | Self::InvalidTransaction { .. } => RequestStatus::UsageError,
            Self::RestartRequired { .. } => RequestStatus::RestartRequired,
            Self::DuplicateKey { .. } => RequestStatus::DuplicateKey,
            _ => RequestStatus::RuntimeError,
        }
    }

    /// Returns true if the caller may retry the statement or transaction.
    ///
    /// This layer itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RestartRequired { .. } | Self::Timeout { .. } | Self::ServiceUnavailable { .. }
        )
    }

    /// Returns the human-readable message without the class prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Internal { message }
            | Self::InvalidArgument { message }
            | Self::Timeout { message }
            | Self::Config { message }
            | Self::Usage { message }
            | Self::NotFound { message }
            | Self::Corruption { message }
            | Self::AlreadyExists { message }
            | Self::RestartRequired { message }
            | Self::InvalidTransaction { message }
            | Self::DuplicateKey { message }
            | Self::ServiceUnavailable { message } => message,
            Self::NotSupported { operation } => operation,
            Self::UnsupportedType { type_name } => type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Internal.category(), "General");
        assert_eq!(ErrorCode::UsageError.category(), "Request");
        assert_eq!(ErrorCode::Corruption.category(), "Catalog");
        assert_eq!(ErrorCode::AlreadyExists.category(), "Catalog");
        assert_eq!(ErrorCode::DuplicateKey.category(), "Transaction");
        assert_eq!(ErrorCode::ServiceUnavailable.category(), "Substrate");
        assert_eq!(ErrorCode::RestartRequired.as_u16(), 0x0300);
    }

    #[test]
    fn test_error_display() {
        let err = GateError::usage("unsupported op in range predicate");
        assert_eq!(err.to_string(), "invalid command: unsupported op in range predicate");
        assert_eq!(err.message(), "unsupported op in range predicate");

        let err = GateError::UnsupportedType { type_name: "uuid".into() };
        assert_eq!(err.to_string(), "unsupported type: uuid");
    }

    #[test]
    fn test_request_status() {
        assert_eq!(GateError::usage("x").request_status(), RequestStatus::UsageError);
        assert_eq!(GateError::invalid_argument("x").request_status(), RequestStatus::UsageError);
        assert_eq!(GateError::invalid_transaction("x").request_status(), RequestStatus::UsageError);
        assert_eq!(
            GateError::restart_required("x").request_status(),
            RequestStatus::RestartRequired
        );
        assert_eq!(GateError::duplicate_key("x").request_status(), RequestStatus::DuplicateKey);
        assert_eq!(GateError::corruption("x").request_status(), RequestStatus::RuntimeError);
        assert_eq!(GateError::timeout("x").request_status(), RequestStatus::RuntimeError);
    }

    #[test]
    fn test_retryable() {
        assert!(GateError::restart_required("conflict").is_retryable());
        assert!(GateError::timeout("deadline").is_retryable());
        assert!(GateError::service_unavailable("churn").is_retryable());
        assert!(!GateError::corruption("bad head").is_retryable());
        assert!(!GateError::invalid_transaction("ended").is_retryable());
        assert!(!GateError::duplicate_key("pk").is_retryable());
    }
}
