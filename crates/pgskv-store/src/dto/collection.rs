//! Collection creation requests.

use std::time::Duration;

/// How records are spread over partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashScheme {
    /// Partitions own contiguous key ranges.
    Range,
    /// Partitions own CRC32C hash buckets.
    HashCrc32c,
}

/// Storage engine behind a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageDriver {
    /// The K23SI transactional driver.
    K23si,
}

impl StorageDriver {
    /// Parses a driver tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "K23SI" => Some(Self::K23si),
            _ => None,
        }
    }
}

/// Capacity hints for a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionCapacity {
    /// Expected data size in megabytes.
    pub data_capacity_mb: Option<u64>,
    /// Expected read operations per second.
    pub read_iops: Option<u64>,
    /// Expected write operations per second.
    pub write_iops: Option<u64>,
}

/// Collection metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// Partitioning scheme.
    pub hash_scheme: HashScheme,
    /// Storage driver.
    pub storage_driver: StorageDriver,
    /// Capacity hints.
    pub capacity: CollectionCapacity,
    /// How long data is retained.
    pub retention_period: Duration,
}

/// Request to create a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCreateRequest {
    /// Collection metadata.
    pub metadata: CollectionMetadata,
    /// Endpoints of the nodes serving the collection.
    pub cluster_endpoints: Vec<String>,
    /// Range partition boundaries; non-empty for `HashScheme::Range`.
    pub range_ends: Vec<String>,
}
