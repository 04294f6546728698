//! Order-preserving key encoding.
//!
//! A record's key is the concatenation of its key fields, each encoded so
//! that byte-wise comparison of two keys matches the field-wise ordering
//! declared by the schema (including descending and null-last flags).
//!
//! # Field Format
//!
//! ```text
//! null:   [NULL_FIRST_TAG]                  or [NULL_LAST_TAG]
//! value:  [VALUE_TAG] payload               (payload bit-inverted if descending)
//!
//! payload by type:
//!   int16/32/64   big-endian with the sign bit flipped
//!   bool          0x00 | 0x01
//!   float/double  IEEE bits; negative values fully inverted, others sign-flipped
//!   decimal64     normalized i128, big-endian with the sign bit flipped
//!   string        bytes with 0x00 escaped as 0x00 0xFF, terminated by 0x00 0x01
//! ```
//!
//! Every field encoding is prefix-free, so a key built from only the leading
//! fields is a byte prefix of every full key sharing those fields. Range
//! bounds rely on that.

use std::fmt;

use bytes::Bytes;

use crate::error::{SkvError, SkvResult};

use super::{Decimal64, FieldType, FieldValue, Schema};

const NULL_FIRST_TAG: u8 = 0x00;
const VALUE_TAG: u8 = 0x10;
const NULL_LAST_TAG: u8 = 0x20;

const STRING_ESCAPE: [u8; 2] = [0x00, 0xFF];
const STRING_TERMINATOR: [u8; 2] = [0x00, 0x01];

/// Identity of a record: schema name plus encoded key fields.
///
/// The encoded key doubles as the opaque row identifier handed to the
/// relational engine.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    /// Schema the record belongs to.
    pub schema_name: String,
    /// Encoded key fields.
    pub partition_key: Bytes,
}

impl Key {
    /// Creates a key.
    pub fn new(schema_name: impl Into<String>, partition_key: impl Into<Bytes>) -> Self {
        Self { schema_name: schema_name.into(), partition_key: partition_key.into() }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}:", self.schema_name)?;
        for b in self.partition_key.iter() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Encodes all key fields of `values`; absent fields encode as null.
pub fn encode_key(schema: &Schema, values: &[Option<FieldValue>]) -> Bytes {
    let mut buf = Vec::with_capacity(32);
    for &pos in &schema.partition_key_fields {
        let field = &schema.fields[pos];
        encode_field(&mut buf, values.get(pos).and_then(Option::as_ref), field.descending, field.null_last);
    }
    Bytes::from(buf)
}

/// Encodes the leading key fields of `values` up to the first absent one.
///
/// The result is a range bound: every full key whose leading fields equal
/// these values starts with it.
pub fn encode_key_prefix(schema: &Schema, values: &[Option<FieldValue>]) -> Bytes {
    let mut buf = Vec::with_capacity(32);
    for &pos in &schema.partition_key_fields {
        let field = &schema.fields[pos];
        match values.get(pos).and_then(Option::as_ref) {
            Some(value) => encode_field(&mut buf, Some(value), field.descending, field.null_last),
            None => break,
        }
    }
    Bytes::from(buf)
}

/// Returns true if `key` lies within `[start, end]`.
///
/// `end` is inclusive on its prefix: a key matching every field of `end` is
/// in range whatever its trailing fields. Empty bounds are unbounded.
#[must_use]
pub fn key_in_range(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    if key < start {
        return false;
    }
    if end.is_empty() {
        return true;
    }
    let len = key.len().min(end.len());
    key[..len] <= *end
}

/// Decodes a key produced by [`encode_key`] back into key field values.
pub fn decode_key(schema: &Schema, mut key: &[u8]) -> SkvResult<Vec<Option<FieldValue>>> {
    let err = |message: &str| SkvError::KeyDecode {
        schema: schema.name.clone(),
        message: message.to_string(),
    };

    let mut values = Vec::with_capacity(schema.num_key_fields());
    for &pos in &schema.partition_key_fields {
        let field = &schema.fields[pos];
        let (&tag, rest) = key.split_first().ok_or_else(|| err("key too short"))?;
        key = rest;
        match tag {
            NULL_FIRST_TAG | NULL_LAST_TAG => values.push(None),
            VALUE_TAG => {
                let (value, rest) = decode_payload(field.field_type, key, field.descending)
                    .ok_or_else(|| err(&format!("bad payload for field {}", field.name)))?;
                values.push(Some(value));
                key = rest;
            }
            _ => return Err(err(&format!("bad tag {tag:#04x} for field {}", field.name))),
        }
    }
    if !key.is_empty() {
        return Err(err("trailing bytes after last key field"));
    }
    Ok(values)
}

fn encode_field(buf: &mut Vec<u8>, value: Option<&FieldValue>, descending: bool, null_last: bool) {
    let Some(value) = value else {
        buf.push(if null_last { NULL_LAST_TAG } else { NULL_FIRST_TAG });
        return;
    };

    buf.push(VALUE_TAG);
    let start = buf.len();
    match value {
        FieldValue::Int16(v) => buf.extend_from_slice(&((*v as u16) ^ 0x8000).to_be_bytes()),
        FieldValue::Int32(v) => buf.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes()),
        FieldValue::Int64(v) => {
            buf.extend_from_slice(&((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes());
        }
        FieldValue::Bool(v) => buf.push(u8::from(*v)),
        FieldValue::Float(v) => {
            let bits = v.to_bits();
            let ordered = if bits & 0x8000_0000 != 0 { !bits } else { bits ^ 0x8000_0000 };
            buf.extend_from_slice(&ordered.to_be_bytes());
        }
        FieldValue::Double(v) => {
            let bits = v.to_bits();
            let sign = 0x8000_0000_0000_0000;
            let ordered = if bits & sign != 0 { !bits } else { bits ^ sign };
            buf.extend_from_slice(&ordered.to_be_bytes());
        }
        FieldValue::Decimal64(d) => {
            let n = d.normalized() as u128 ^ (1u128 << 127);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        FieldValue::String(s) => {
            for &b in s.iter() {
                if b == 0x00 {
                    buf.extend_from_slice(&STRING_ESCAPE);
                } else {
                    buf.push(b);
                }
            }
            buf.extend_from_slice(&STRING_TERMINATOR);
        }
    }

    if descending {
        for b in &mut buf[start..] {
            *b = !*b;
        }
    }
}

fn decode_payload(field_type: FieldType, key: &[u8], descending: bool) -> Option<(FieldValue, &[u8])> {
    let flip = |b: u8| if descending { !b } else { b };

    fn take<const N: usize>(key: &[u8], flip: impl Fn(u8) -> u8) -> Option<([u8; N], &[u8])> {
        if key.len() < N {
            return None;
        }
        let mut out = [0u8; N];
        for (o, &b) in out.iter_mut().zip(&key[..N]) {
            *o = flip(b);
        }
        Some((out, &key[N..]))
    }

    match field_type {
        FieldType::Int16 => {
            let (b, rest) = take::<2>(key, flip)?;
            Some((FieldValue::Int16((u16::from_be_bytes(b) ^ 0x8000) as i16), rest))
        }
        FieldType::Int32 => {
            let (b, rest) = take::<4>(key, flip)?;
            Some((FieldValue::Int32((u32::from_be_bytes(b) ^ 0x8000_0000) as i32), rest))
        }
        FieldType::Int64 => {
            let (b, rest) = take::<8>(key, flip)?;
            let v = (u64::from_be_bytes(b) ^ 0x8000_0000_0000_0000) as i64;
            Some((FieldValue::Int64(v), rest))
        }
        FieldType::Bool => {
            let (b, rest) = take::<1>(key, flip)?;
            Some((FieldValue::Bool(b[0] != 0), rest))
        }
        FieldType::Float => {
            let (b, rest) = take::<4>(key, flip)?;
            let ordered = u32::from_be_bytes(b);
            let bits = if ordered & 0x8000_0000 != 0 { ordered ^ 0x8000_0000 } else { !ordered };
            Some((FieldValue::Float(f32::from_bits(bits)), rest))
        }
        FieldType::Double => {
            let (b, rest) = take::<8>(key, flip)?;
            let sign = 0x8000_0000_0000_0000;
            let ordered = u64::from_be_bytes(b);
            let bits = if ordered & sign != 0 { ordered ^ sign } else { !ordered };
            Some((FieldValue::Double(f64::from_bits(bits)), rest))
        }
        FieldType::Decimal64 => {
            let (b, rest) = take::<16>(key, flip)?;
            let n = (u128::from_be_bytes(b) ^ (1u128 << 127)) as i128;
            Some((FieldValue::Decimal64(Decimal64::from_normalized(n)?), rest))
        }
        FieldType::String => {
            let mut out = Vec::new();
            let mut i = 0;
            loop {
                let b = flip(*key.get(i)?);
                if b != 0x00 {
                    out.push(b);
                    i += 1;
                    continue;
                }
                match flip(*key.get(i + 1)?) {
                    0xFF => out.push(0x00),
                    0x01 => return Some((FieldValue::String(Bytes::from(out)), &key[i + 2..])),
                    _ => return None,
                }
                i += 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::SchemaField;

    fn schema(field_type: FieldType, descending: bool, null_last: bool) -> Schema {
        Schema::new("s", 1)
            .with_field(SchemaField::new("k", field_type).with_sort(descending, null_last))
            .with_partition_key(vec![0])
    }

    fn key_of(schema: &Schema, value: Option<FieldValue>) -> Bytes {
        encode_key(schema, &[value])
    }

    #[test]
    fn test_integer_order() {
        let s = schema(FieldType::Int32, false, false);
        let keys: Vec<_> = [-100, -1, 0, 1, 7, i32::MAX]
            .iter()
            .map(|v| key_of(&s, Some(FieldValue::Int32(*v))))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_descending_reverses_order() {
        let s = schema(FieldType::Int64, true, false);
        let a = key_of(&s, Some(FieldValue::Int64(1)));
        let b = key_of(&s, Some(FieldValue::Int64(2)));
        assert!(a > b);
    }

    #[test]
    fn test_null_placement() {
        let first = schema(FieldType::Int16, false, false);
        let last = schema(FieldType::Int16, false, true);
        let v = Some(FieldValue::Int16(i16::MIN));
        assert!(key_of(&first, None) < key_of(&first, v.clone()));
        assert!(key_of(&last, None) > key_of(&last, v));
    }

    #[test]
    fn test_string_order_and_escape() {
        let s = schema(FieldType::String, false, false);
        let words = ["", "a", "a\0", "a\0b", "ab", "b"];
        let keys: Vec<_> = words.iter().map(|w| key_of(&s, Some(FieldValue::from(*w)))).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let decoded = decode_key(&s, &keys[3]).unwrap();
        assert_eq!(decoded, vec![Some(FieldValue::from("a\0b"))]);
    }

    #[test]
    fn test_descending_string() {
        let s = schema(FieldType::String, true, false);
        let a = key_of(&s, Some(FieldValue::from("a")));
        let ab = key_of(&s, Some(FieldValue::from("ab")));
        assert!(a > ab);
        assert_eq!(decode_key(&s, &ab).unwrap(), vec![Some(FieldValue::from("ab"))]);
    }

    #[test]
    fn test_float_order() {
        let s = schema(FieldType::Double, false, false);
        let keys: Vec<_> = [-2.5, -0.5, 0.0, 0.25, 10.0]
            .iter()
            .map(|v| key_of(&s, Some(FieldValue::Double(*v))))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(decode_key(&s, &keys[0]).unwrap(), vec![Some(FieldValue::Double(-2.5))]);
    }

    #[test]
    fn test_composite_prefix_and_range() {
        let s = Schema::new("s", 1)
            .with_field(SchemaField::new("a", FieldType::Int32))
            .with_field(SchemaField::new("b", FieldType::Int32))
            .with_field(SchemaField::new("c", FieldType::String))
            .with_partition_key(vec![0, 1]);

        let row = |a, b| encode_key(&s, &[Some(FieldValue::Int32(a)), Some(FieldValue::Int32(b)), None]);
        let start = encode_key_prefix(&s, &[Some(FieldValue::Int32(5)), Some(FieldValue::Int32(10))]);
        let end = encode_key_prefix(&s, &[Some(FieldValue::Int32(5)), Some(FieldValue::Int32(20))]);

        assert!(key_in_range(&row(5, 10), &start, &end));
        assert!(key_in_range(&row(5, 20), &start, &end));
        assert!(!key_in_range(&row(5, 21), &start, &end));
        assert!(!key_in_range(&row(4, 15), &start, &end));

        let prefix_only = encode_key_prefix(&s, &[Some(FieldValue::Int32(5)), None]);
        assert!(key_in_range(&row(5, 99), &prefix_only, &prefix_only));
        assert!(key_in_range(&row(6, 0), &[], &[]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let s = schema(FieldType::Int32, false, false);
        assert!(decode_key(&s, &[VALUE_TAG, 1]).is_err());
        assert!(decode_key(&s, &[0x42]).is_err());
        let mut full = key_of(&s, Some(FieldValue::Int32(3))).to_vec();
        full.push(0);
        assert!(decode_key(&s, &full).is_err());
    }
}
