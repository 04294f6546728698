//! Positional records with a field cursor.
//!
//! A record is written and read strictly in schema order:
//!
//! ```text
//!  fields:  [ f0 ][ f1 ][ f2 ][ f3 ]
//!              ▲
//!            cursor ── serialize_next / skip_next / deserialize_next
//!                      each advance by exactly one field
//! ```
//!
//! Writing a value of the wrong type, or moving past the last field, is a
//! checked error rather than silent misalignment.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{SkvError, SkvResult};

use super::key::{encode_key, encode_key_prefix, Key};
use super::{FieldValue, FromFieldValue, Schema};

/// A record tied to a collection and a schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct SkvRecord {
    collection: String,
    schema: Arc<Schema>,
    fields: Vec<Option<FieldValue>>,
    cursor: usize,
}

impl SkvRecord {
    /// Creates a record with every field absent and the cursor at field 0.
    pub fn new(collection: impl Into<String>, schema: Arc<Schema>) -> Self {
        let fields = vec![None; schema.len()];
        Self { collection: collection.into(), schema, fields, cursor: 0 }
    }

    /// Creates a record from a complete value list, type-checking every field.
    pub fn from_values(
        collection: impl Into<String>,
        schema: Arc<Schema>,
        values: Vec<Option<FieldValue>>,
    ) -> SkvResult<Self> {
        if values.len() != schema.len() {
            return Err(SkvError::FieldOutOfBounds {
                schema: schema.name.clone(),
                position: values.len(),
                len: schema.len(),
            });
        }
        let mut record = Self::new(collection, schema);
        for value in values {
            match value {
                Some(v) => record.serialize_next(v)?,
                None => record.skip_next()?,
            }
        }
        record.reset_cursor();
        Ok(record)
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Schema this record follows.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor back to field 0.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Moves the cursor to `position`.
    pub fn seek_field(&mut self, position: usize) -> SkvResult<()> {
        if position > self.schema.len() {
            return Err(self.out_of_bounds(position));
        }
        self.cursor = position;
        Ok(())
    }

    /// Writes the field at the cursor and advances.
    pub fn serialize_next(&mut self, value: impl Into<FieldValue>) -> SkvResult<()> {
        let value = value.into();
        let field = self
            .schema
            .fields
            .get(self.cursor)
            .ok_or_else(|| self.out_of_bounds(self.cursor))?;
        if value.field_type() != field.field_type {
            return Err(SkvError::TypeMismatch {
                field: field.name.clone(),
                expected: field.field_type,
                actual: value.field_type(),
            });
        }
        self.fields[self.cursor] = Some(value);
        self.cursor += 1;
        Ok(())
    }

    /// Writes an optional value; `None` skips the field.
    pub fn serialize_next_optional(&mut self, value: Option<FieldValue>) -> SkvResult<()> {
        match value {
            Some(v) => self.serialize_next(v),
            None => self.skip_next(),
        }
    }

    /// Leaves the field at the cursor absent and advances.
    pub fn skip_next(&mut self) -> SkvResult<()> {
        if self.cursor >= self.schema.len() {
            return Err(self.out_of_bounds(self.cursor));
        }
        self.fields[self.cursor] = None;
        self.cursor += 1;
        Ok(())
    }

    /// Reads the field at the cursor and advances.
    ///
    /// Returns `Ok(None)` for an absent field.
    pub fn deserialize_next<T: FromFieldValue>(&mut self) -> SkvResult<Option<T>> {
        let field = self
            .schema
            .fields
            .get(self.cursor)
            .ok_or_else(|| self.out_of_bounds(self.cursor))?;
        if field.field_type != T::FIELD_TYPE {
            return Err(SkvError::TypeMismatch {
                field: field.name.clone(),
                expected: field.field_type,
                actual: T::FIELD_TYPE,
            });
        }
        let value = self.fields[self.cursor].clone();
        self.cursor += 1;
        match value {
            None => Ok(None),
            Some(v) => T::from_field_value(v).map(Some).map_err(|v| SkvError::TypeMismatch {
                field: field.name.clone(),
                expected: T::FIELD_TYPE,
                actual: v.field_type(),
            }),
        }
    }

    /// Returns the field at `position` without moving the cursor.
    #[must_use]
    pub fn field(&self, position: usize) -> Option<&FieldValue> {
        self.fields.get(position).and_then(Option::as_ref)
    }

    /// Returns a field by name without moving the cursor.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.schema.field_position(name).and_then(|pos| self.field(pos))
    }

    /// All field values in schema order.
    #[must_use]
    pub fn values(&self) -> &[Option<FieldValue>] {
        &self.fields
    }

    /// Consumes the record and returns its field values.
    #[must_use]
    pub fn into_values(self) -> Vec<Option<FieldValue>> {
        self.fields
    }

    /// Returns the record key; absent key fields encode as null.
    #[must_use]
    pub fn key(&self) -> Key {
        Key::new(self.schema.name.clone(), encode_key(&self.schema, &self.fields))
    }

    /// Returns the encoded leading key fields up to the first absent one.
    #[must_use]
    pub fn key_prefix(&self) -> Bytes {
        encode_key_prefix(&self.schema, &self.fields)
    }

    /// Keeps only the named fields; the others become absent.
    ///
    /// An empty projection keeps every field.
    #[must_use]
    pub fn project(mut self, projection: &[String]) -> Self {
        if projection.is_empty() {
            return self;
        }
        for (field, value) in self.schema.fields.iter().zip(self.fields.iter_mut()) {
            if !projection.iter().any(|p| *p == field.name) {
                *value = None;
            }
        }
        self
    }

    fn out_of_bounds(&self, position: usize) -> SkvError {
        SkvError::FieldOutOfBounds {
            schema: self.schema.name.clone(),
            position,
            len: self.schema.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{FieldType, SchemaField};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("users", 1)
                .with_field(SchemaField::new("id", FieldType::Int64))
                .with_field(SchemaField::new("name", FieldType::String))
                .with_field(SchemaField::new("active", FieldType::Bool))
                .with_partition_key(vec![0]),
        )
    }

    #[test]
    fn test_sequential_cursor() {
        let mut record = SkvRecord::new("c", schema());
        record.serialize_next(42_i64).unwrap();
        record.skip_next().unwrap();
        record.serialize_next(true).unwrap();
        assert_eq!(record.cursor(), 3);
        assert!(matches!(record.skip_next(), Err(SkvError::FieldOutOfBounds { .. })));

        record.reset_cursor();
        assert_eq!(record.deserialize_next::<i64>().unwrap(), Some(42));
        assert_eq!(record.deserialize_next::<String>().unwrap(), None);
        assert_eq!(record.deserialize_next::<bool>().unwrap(), Some(true));
    }

    #[test]
    fn test_type_mismatch() {
        let mut record = SkvRecord::new("c", schema());
        let err = record.serialize_next(1_i32).unwrap_err();
        assert!(matches!(err, SkvError::TypeMismatch { expected: FieldType::Int64, .. }));
        assert_eq!(record.cursor(), 0);

        record.serialize_next(1_i64).unwrap();
        record.seek_field(0).unwrap();
        assert!(record.deserialize_next::<i32>().is_err());
    }

    #[test]
    fn test_from_values_and_project() {
        let record = SkvRecord::from_values(
            "c",
            schema(),
            vec![Some(7_i64.into()), Some("bob".into()), Some(false.into())],
        )
        .unwrap();
        assert_eq!(record.field_by_name("name"), Some(&FieldValue::from("bob")));

        let projected = record.project(&["id".to_string()]);
        assert_eq!(projected.field(0), Some(&FieldValue::Int64(7)));
        assert_eq!(projected.field(1), None);

        assert!(SkvRecord::from_values("c", schema(), vec![None]).is_err());
    }

    #[test]
    fn test_key_and_prefix() {
        let mut record = SkvRecord::new("c", schema());
        assert!(record.key_prefix().is_empty());
        record.serialize_next(9_i64).unwrap();
        assert_eq!(record.key().partition_key, record.key_prefix());
        assert_eq!(record.key().schema_name, "users");
    }
}
