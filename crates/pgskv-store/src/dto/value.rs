//! Field types and typed field values.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Byte string.
    String,
    /// Boolean.
    Bool,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Fixed-point decimal with a 64-bit mantissa.
    Decimal64,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int16 => "INT16T",
            Self::Int32 => "INT32T",
            Self::Int64 => "INT64T",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal64 => "DECIMAL64",
        };
        f.write_str(name)
    }
}

/// Decimal with a 64-bit unscaled mantissa: `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal64 {
    /// Unscaled value.
    pub unscaled: i64,
    /// Number of digits after the decimal point.
    pub scale: u8,
}

impl Decimal64 {
    /// Largest scale whose normalized form fits the key encoding exactly.
    pub const MAX_SCALE: u8 = 18;

    /// Creates a new decimal.
    #[must_use]
    pub const fn new(unscaled: i64, scale: u8) -> Self {
        Self { unscaled, scale }
    }

    /// Returns the value rescaled to `MAX_SCALE` digits.
    ///
    /// Digits beyond `MAX_SCALE` are truncated.
    #[must_use]
    pub fn normalized(&self) -> i128 {
        let value = i128::from(self.unscaled);
        if self.scale <= Self::MAX_SCALE {
            value * 10_i128.pow(u32::from(Self::MAX_SCALE - self.scale))
        } else {
            value / 10_i128.pow(u32::from(self.scale - Self::MAX_SCALE))
        }
    }

    /// Builds the shortest decimal equal to a normalized value.
    #[must_use]
    pub fn from_normalized(mut value: i128) -> Option<Self> {
        let mut scale = Self::MAX_SCALE;
        while scale > 0 && value % 10 == 0 {
            value /= 10;
            scale -= 1;
        }
        i64::try_from(value).ok().map(|unscaled| Self::new(unscaled, scale))
    }
}

impl PartialEq for Decimal64 {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl PartialOrd for Decimal64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.normalized().cmp(&other.normalized()))
    }
}

impl fmt::Display for Decimal64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let divisor = 10_i128.pow(u32::from(self.scale));
        let value = i128::from(self.unscaled);
        let sign = if value < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{}.{:0width$}",
            value.abs() / divisor,
            value.abs() % divisor,
            width = usize::from(self.scale)
        )
    }
}

/// A typed field value.
///
/// A field that is null (or skipped) is represented by `None` at the record
/// level, never by a variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 16-bit integer.
    Int16(i16),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Byte string.
    String(Bytes),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Decimal.
    Decimal64(Decimal64),
}

impl FieldValue {
    /// Creates a string value from UTF-8 text.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(Bytes::from(s.into()))
    }

    /// Returns the type of this value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Int16(_) => FieldType::Int16,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::String(_) => FieldType::String,
            Self::Bool(_) => FieldType::Bool,
            Self::Float(_) => FieldType::Float,
            Self::Double(_) => FieldType::Double,
            Self::Decimal64(_) => FieldType::Decimal64,
        }
    }

    /// Returns the string payload as UTF-8, if this is valid UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::String(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "'{s}'"),
                Err(_) => write!(f, "{b:?}"),
            },
            Self::Bool(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Decimal64(d) => write!(f, "{d}"),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_value! {
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    bool => Bool,
    f32 => Float,
    f64 => Double,
    Decimal64 => Decimal64,
    Bytes => String,
    Vec<u8> => String,
    String => String,
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(Bytes::copy_from_slice(v.as_bytes()))
    }
}

/// Extraction of a concrete Rust value from a field value.
pub trait FromFieldValue: Sized {
    /// Field type this Rust type is read from.
    const FIELD_TYPE: FieldType;

    /// Extracts the value, or returns the value back if its type differs.
    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue>;
}

macro_rules! impl_from_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromFieldValue for $ty {
                const FIELD_TYPE: FieldType = FieldType::$variant;

                fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
                    match value {
                        FieldValue::$variant(v) => Ok(v.into()),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_from_field! {
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    bool => Bool,
    f32 => Float,
    f64 => Double,
    Decimal64 => Decimal64,
    Bytes => String,
    Vec<u8> => String,
}

impl FromFieldValue for String {
    const FIELD_TYPE: FieldType = FieldType::String;

    fn from_field_value(value: FieldValue) -> Result<Self, FieldValue> {
        match value {
            FieldValue::String(b) => match std::str::from_utf8(&b) {
                Ok(s) => Ok(s.to_string()),
                Err(_) => Err(FieldValue::String(b)),
            },
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_names() {
        assert_eq!(FieldType::Int32.to_string(), "INT32T");
        assert_eq!(FieldType::Decimal64.to_string(), "DECIMAL64");
    }

    #[test]
    fn test_decimal_normalization() {
        let a = Decimal64::new(150, 2);
        let b = Decimal64::new(15, 1);
        assert_eq!(a, b);
        assert!(Decimal64::new(-1, 0) < Decimal64::new(1, 3));
        assert_eq!(Decimal64::from_normalized(a.normalized()).map(|d| d.scale), Some(1));
        assert_eq!(a.to_string(), "1.50");
        assert_eq!(Decimal64::new(-205, 2).to_string(), "-2.05");
    }

    #[test]
    fn test_from_field_value() {
        assert_eq!(i32::from_field_value(FieldValue::Int32(7)), Ok(7));
        assert_eq!(
            i32::from_field_value(FieldValue::Int64(7)),
            Err(FieldValue::Int64(7))
        );
        assert_eq!(String::from_field_value(FieldValue::string("abc")), Ok("abc".to_string()));
        assert!(String::from_field_value(FieldValue::String(Bytes::from_static(&[0xff]))).is_err());
    }
}
