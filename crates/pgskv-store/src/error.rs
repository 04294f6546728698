//! Record and schema error types.

use pgskv_common::GateError;
use thiserror::Error;

use crate::dto::FieldType;

/// Errors raised by the record cursor, key codec, and schema checks.
///
/// These are contract violations between the gate and the record layout,
/// never transient substrate failures; those travel as `SkvStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkvError {
    /// The cursor moved past the last schema field.
    #[error("field cursor {position} out of bounds for schema {schema} with {len} fields")]
    FieldOutOfBounds {
        /// Schema name.
        schema: String,
        /// Cursor position.
        position: usize,
        /// Number of fields in the schema.
        len: usize,
    },

    /// A value did not match the schema field type.
    #[error("type mismatch on field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type declared by the schema.
        expected: FieldType,
        /// Type of the value.
        actual: FieldType,
    },

    /// The schema itself is malformed.
    #[error("invalid schema {schema}: {message}")]
    InvalidSchema {
        /// Schema name.
        schema: String,
        /// Error message.
        message: String,
    },

    /// An encoded key could not be decoded against its schema.
    #[error("cannot decode key for schema {schema}: {message}")]
    KeyDecode {
        /// Schema name.
        schema: String,
        /// Error message.
        message: String,
    },

    /// A field name is not part of the schema.
    #[error("unknown field {field} in schema {schema}")]
    UnknownField {
        /// Schema name.
        schema: String,
        /// Field name.
        field: String,
    },
}

/// Result type for record and schema operations.
pub type SkvResult<T> = Result<T, SkvError>;

impl From<SkvError> for GateError {
    fn from(e: SkvError) -> Self {
        match e {
            SkvError::InvalidSchema { .. } | SkvError::UnknownField { .. } => {
                GateError::invalid_argument(e.to_string())
            }
            _ => GateError::corruption(e.to_string()),
        }
    }
}
