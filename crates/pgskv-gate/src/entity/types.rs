//! Relational column types and sort orders.

use std::fmt;

use pgskv_common::{GateError, GateResult};

/// Relational data type of a column.
///
/// The integer id is what the catalog persists, so ids never change once
/// assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum DataType {
    /// 8-bit integer.
    Int8 = 1,
    /// 16-bit integer.
    Int16 = 2,
    /// 32-bit integer.
    Int32 = 3,
    /// 64-bit integer.
    Int64 = 4,
    /// Variable-length text.
    String = 5,
    /// Boolean.
    Bool = 6,
    /// 32-bit float.
    Float = 7,
    /// 64-bit float.
    Double = 8,
    /// Variable-length bytes.
    Binary = 9,
    /// Microseconds since the epoch.
    Timestamp = 10,
    /// Fixed-point decimal.
    Decimal = 11,
    /// Calendar date.
    Date = 12,
    /// Time of day.
    Time = 13,
    /// 128-bit UUID.
    Uuid = 14,
    /// JSON document.
    Json = 15,
}

impl DataType {
    const ALL: [Self; 15] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::String,
        Self::Bool,
        Self::Float,
        Self::Double,
        Self::Binary,
        Self::Timestamp,
        Self::Decimal,
        Self::Date,
        Self::Time,
        Self::Uuid,
        Self::Json,
    ];

    /// Persisted integer id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> i16 {
        self as i16
    }

    /// Looks a type up by its persisted id.
    pub fn from_id(id: i16) -> GateResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| GateError::corruption(format!("unknown column type id {id}")))
    }

    /// Type name as shown in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Binary => "BINARY",
            Self::Timestamp => "TIMESTAMP",
            Self::Decimal => "DECIMAL",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort order of a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum SortingType {
    /// No explicit order; behaves as ascending.
    #[default]
    NotSpecified = 0,
    /// Ascending, nulls first.
    Ascending = 1,
    /// Descending, nulls first.
    Descending = 2,
    /// Ascending, nulls last.
    AscendingNullsLast = 3,
    /// Descending, nulls last.
    DescendingNullsLast = 4,
}

impl SortingType {
    /// Persisted integer id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> i16 {
        self as i16
    }

    /// Looks a sorting type up by its persisted id.
    pub fn from_id(id: i16) -> GateResult<Self> {
        match id {
            0 => Ok(Self::NotSpecified),
            1 => Ok(Self::Ascending),
            2 => Ok(Self::Descending),
            3 => Ok(Self::AscendingNullsLast),
            4 => Ok(Self::DescendingNullsLast),
            _ => Err(GateError::corruption(format!("unknown sorting type id {id}"))),
        }
    }
}
