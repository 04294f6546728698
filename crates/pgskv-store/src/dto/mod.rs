//! Data transfer objects exchanged with the storage substrate.

mod collection;
mod key;
mod query;
mod record;
mod schema;
mod status;
mod value;

pub use collection::{
    CollectionCapacity, CollectionCreateRequest, CollectionMetadata, HashScheme, StorageDriver,
};
pub use key::{decode_key, encode_key, encode_key_prefix, key_in_range, Key};
pub use query::{Filter, Query};
pub use record::SkvRecord;
pub use schema::{Schema, SchemaField};
pub use status::SkvStatus;
pub use value::{Decimal64, FieldType, FieldValue, FromFieldValue};
