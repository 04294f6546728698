//! Versioned key-value schemas.

use crate::error::{SkvError, SkvResult};

use super::FieldType;

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Primitive type.
    pub field_type: FieldType,
    /// Key encoding sorts this field in descending order.
    pub descending: bool,
    /// Key encoding sorts nulls after all values.
    pub null_last: bool,
}

impl SchemaField {
    /// Creates an ascending, nulls-first field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, descending: false, null_last: false }
    }

    /// Sets the sort flags.
    #[must_use]
    pub fn with_sort(mut self, descending: bool, null_last: bool) -> Self {
        self.descending = descending;
        self.null_last = null_last;
        self
    }
}

/// A versioned, ordered field list with designated partition-key fields.
///
/// A schema is immutable once created for a version; schema changes create
/// a new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Schema name (the table or index id).
    pub name: String,
    /// Schema version.
    pub version: u32,
    /// Ordered fields.
    pub fields: Vec<SchemaField>,
    /// Field positions forming the partition key, in key order.
    pub partition_key_fields: Vec<usize>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version, fields: Vec::new(), partition_key_fields: Vec::new() }
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the partition key fields.
    #[must_use]
    pub fn with_partition_key(mut self, fields: Vec<usize>) -> Self {
        self.partition_key_fields = fields;
        self
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the position of a field by name.
    #[must_use]
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the position of a field by name or an error.
    pub fn require_field(&self, name: &str) -> SkvResult<usize> {
        self.field_position(name).ok_or_else(|| SkvError::UnknownField {
            schema: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Number of key fields.
    #[must_use]
    pub fn num_key_fields(&self) -> usize {
        self.partition_key_fields.len()
    }

    /// Checks the schema is well formed.
    ///
    /// Key fields must be the leading fields, in order: the key encoding and
    /// the record cursor both rely on it.
    pub fn validate(&self) -> SkvResult<()> {
        let invalid = |message: String| SkvError::InvalidSchema { schema: self.name.clone(), message };

        if self.name.is_empty() {
            return Err(invalid("empty schema name".into()));
        }
        if self.partition_key_fields.is_empty() {
            return Err(invalid("no partition key fields".into()));
        }
        for (i, &pos) in self.partition_key_fields.iter().enumerate() {
            if pos != i {
                return Err(invalid(format!(
                    "partition key field {i} is at position {pos}, key fields must lead"
                )));
            }
        }
        if self.partition_key_fields.len() > self.fields.len() {
            return Err(invalid("more key fields than fields".into()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new("t1", 1)
            .with_field(SchemaField::new("id", FieldType::Int64))
            .with_field(SchemaField::new("name", FieldType::String))
            .with_partition_key(vec![0])
    }

    #[test]
    fn test_field_lookup() {
        let schema = sample();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field_position("name"), Some(1));
        assert!(matches!(schema.require_field("nope"), Err(SkvError::UnknownField { .. })));
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_trailing_key() {
        let schema = sample().with_partition_key(vec![1]);
        assert!(matches!(schema.validate(), Err(SkvError::InvalidSchema { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let schema = sample().with_field(SchemaField::new("id", FieldType::Int16));
        assert!(schema.validate().is_err());
    }
}
