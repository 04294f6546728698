//! Relational values and expression trees carried by operation requests.

use std::fmt;

use bytes::Bytes;
use pgskv_common::{GateError, GateResult};
use pgskv_store::{Decimal64, FieldType, FieldValue};

/// A relational literal.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer type.
    Int(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Text or binary bytes.
    Slice(Bytes),
    /// Decimal.
    Decimal(Decimal64),
}

impl SqlValue {
    /// Text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Slice(Bytes::from(s.into()))
    }

    /// Returns true for NULL.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text view of a slice value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Slice(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Slice(_) => "slice",
            Self::Decimal(_) => "decimal",
        }
    }

    /// Converts into a field of type `field_type`; NULL becomes `None`.
    pub fn to_field_value(&self, field_type: FieldType) -> GateResult<Option<FieldValue>> {
        let out_of_range = |v: i64| {
            GateError::invalid_argument(format!("value {v} out of range for {field_type} field"))
        };
        let value = match (self, field_type) {
            (Self::Null, _) => return Ok(None),
            (Self::Bool(b), FieldType::Bool) => FieldValue::Bool(*b),
            (Self::Int(v), FieldType::Int16) => {
                FieldValue::Int16(i16::try_from(*v).map_err(|_| out_of_range(*v))?)
            }
            (Self::Int(v), FieldType::Int32) => {
                FieldValue::Int32(i32::try_from(*v).map_err(|_| out_of_range(*v))?)
            }
            (Self::Int(v), FieldType::Int64) => FieldValue::Int64(*v),
            (Self::Int(v), FieldType::Decimal64) => FieldValue::Decimal64(Decimal64::new(*v, 0)),
            (Self::Float(v), FieldType::Float) => FieldValue::Float(*v),
            (Self::Float(v), FieldType::Double) => FieldValue::Double(f64::from(*v)),
            (Self::Double(v), FieldType::Double) => FieldValue::Double(*v),
            (Self::Slice(b), FieldType::String) => FieldValue::String(b.clone()),
            (Self::Decimal(d), FieldType::Decimal64) => FieldValue::Decimal64(*d),
            _ => {
                return Err(GateError::invalid_argument(format!(
                    "cannot store {} value in {field_type} field",
                    self.kind()
                )))
            }
        };
        Ok(Some(value))
    }

    /// Converts a stored field back into a relational value.
    #[must_use]
    pub fn from_field_value(value: Option<&FieldValue>) -> Self {
        match value {
            None => Self::Null,
            Some(FieldValue::Int16(v)) => Self::Int(i64::from(*v)),
            Some(FieldValue::Int32(v)) => Self::Int(i64::from(*v)),
            Some(FieldValue::Int64(v)) => Self::Int(*v),
            Some(FieldValue::String(b)) => Self::Slice(b.clone()),
            Some(FieldValue::Bool(b)) => Self::Bool(*b),
            Some(FieldValue::Float(v)) => Self::Float(*v),
            Some(FieldValue::Double(v)) => Self::Double(*v),
            Some(FieldValue::Decimal64(d)) => Self::Decimal(*d),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::text(v)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Slice(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "'{s}'"),
                Err(_) => write!(f, "<{} bytes>", b.len()),
            },
            Self::Decimal(d) => write!(f, "{d}"),
        }
    }
}

/// Operator of a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprOpcode {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `BETWEEN a AND b`, inclusive.
    Between,
    /// `IN (...)`
    In,
}

/// A condition node: an operator over operand expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlOpCondition {
    /// Operator.
    pub op: ExprOpcode,
    /// Operands in order.
    pub operands: Vec<SqlOpExpr>,
}

/// An expression in an operation request.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOpExpr {
    /// Reference to a field position; negative ids are system columns.
    ColumnRef(i32),
    /// Literal.
    Value(SqlValue),
    /// Condition.
    Condition(SqlOpCondition),
}

impl SqlOpExpr {
    /// Column reference.
    #[must_use]
    pub fn column(id: i32) -> Self {
        Self::ColumnRef(id)
    }

    /// Literal.
    pub fn value(value: impl Into<SqlValue>) -> Self {
        Self::Value(value.into())
    }

    /// Condition node.
    #[must_use]
    pub fn condition(op: ExprOpcode, operands: Vec<SqlOpExpr>) -> Self {
        Self::Condition(SqlOpCondition { op, operands })
    }

    /// `column <op> value` leaf.
    pub fn compare(op: ExprOpcode, column: i32, value: impl Into<SqlValue>) -> Self {
        Self::condition(op, vec![Self::column(column), Self::value(value)])
    }

    /// `column BETWEEN low AND high` leaf.
    pub fn between(column: i32, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> Self {
        Self::condition(
            ExprOpcode::Between,
            vec![Self::column(column), Self::value(low), Self::value(high)],
        )
    }

    /// Conjunction of `operands`.
    #[must_use]
    pub fn and(operands: Vec<SqlOpExpr>) -> Self {
        Self::condition(ExprOpcode::And, operands)
    }

    /// Literal carried by a value expression.
    #[must_use]
    pub fn as_value(&self) -> Option<&SqlValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}
