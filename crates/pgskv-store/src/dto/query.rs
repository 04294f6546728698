//! Range queries and their continuation.

use std::sync::Arc;

use bytes::Bytes;

use super::{FieldValue, Schema, SkvRecord};

/// Record filter evaluated by the substrate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals a literal.
    Eq {
        /// Field name.
        field: String,
        /// Literal to compare against.
        value: FieldValue,
    },
}

impl Filter {
    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &SkvRecord) -> bool {
        match self {
            Self::Eq { field, value } => record.field_by_name(field) == Some(value),
        }
    }
}

/// A paged range scan over one schema.
///
/// The start and end records hold the leading key fields of the bounds;
/// absent trailing fields are wildcards and the end bound is inclusive on
/// its prefix. After each page the substrate stores a continuation, and
/// resubmitting the same query resumes right after the last returned row.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    schema: Arc<Schema>,
    start: SkvRecord,
    end: SkvRecord,
    reverse: bool,
    limit: Option<u64>,
    projection: Vec<String>,
    filter: Option<Filter>,
    continuation: Option<Bytes>,
    done: bool,
}

impl Query {
    /// Creates an unbounded forward scan.
    pub fn new(collection: impl Into<String>, schema: Arc<Schema>) -> Self {
        let collection = collection.into();
        Self {
            start: SkvRecord::new(collection.clone(), Arc::clone(&schema)),
            end: SkvRecord::new(collection.clone(), Arc::clone(&schema)),
            collection,
            schema,
            reverse: false,
            limit: None,
            projection: Vec::new(),
            filter: None,
            continuation: None,
            done: false,
        }
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Schema scanned.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Lower bound record.
    #[must_use]
    pub fn start_record(&self) -> &SkvRecord {
        &self.start
    }

    /// Upper bound record.
    #[must_use]
    pub fn end_record(&self) -> &SkvRecord {
        &self.end
    }

    /// Replaces both bound records.
    pub fn set_bounds(&mut self, start: SkvRecord, end: SkvRecord) {
        self.start = start;
        self.end = end;
    }

    /// Scans from the upper bound down when set.
    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.reverse = reverse;
    }

    /// Returns true for a descending scan.
    #[must_use]
    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Caps the number of rows returned per page.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Row limit per page.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Adds a field to the projection; an empty projection returns all fields.
    pub fn add_projection(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.projection.contains(&field) {
            self.projection.push(field);
        }
    }

    /// Projected field names.
    #[must_use]
    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Sets the record filter.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = Some(filter);
    }

    /// Record filter.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Key of the last row returned, if a page has been read.
    #[must_use]
    pub fn continuation(&self) -> Option<&Bytes> {
        self.continuation.as_ref()
    }

    /// Records the position reached after a page.
    pub fn set_continuation(&mut self, continuation: Option<Bytes>, done: bool) {
        self.continuation = continuation;
        self.done = done;
    }

    /// Returns true once every row in range has been returned.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{FieldType, SchemaField};

    #[test]
    fn test_query_defaults() {
        let schema = Arc::new(
            Schema::new("t", 1)
                .with_field(SchemaField::new("id", FieldType::Int32))
                .with_partition_key(vec![0]),
        );
        let mut query = Query::new("c", schema);
        assert!(!query.is_done());
        assert!(query.start_record().key_prefix().is_empty());

        query.add_projection("id");
        query.add_projection("id");
        assert_eq!(query.projection(), ["id".to_string()]);

        query.set_continuation(Some(Bytes::from_static(b"k")), true);
        assert!(query.is_done());
    }
}
