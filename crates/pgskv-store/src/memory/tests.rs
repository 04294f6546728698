use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::dto::{
    CollectionCapacity, FieldType, Filter, HashScheme, SchemaField, SkvRecord, StorageDriver,
};

const COLL: &str = "coll";

fn users_schema(version: u32) -> Schema {
    Schema::new("users", version)
        .with_field(SchemaField::new("id", FieldType::Int32))
        .with_field(SchemaField::new("name", FieldType::String))
        .with_partition_key(vec![0])
}

async fn setup() -> (MemoryStore, Arc<Schema>) {
    let store = MemoryStore::new();
    let status = store
        .create_collection(CollectionCreateRequest {
            metadata: CollectionMetadata {
                name: COLL.into(),
                hash_scheme: HashScheme::Range,
                storage_driver: StorageDriver::K23si,
                capacity: CollectionCapacity::default(),
                retention_period: Duration::from_secs(3600),
            },
            cluster_endpoints: vec![],
            range_ends: vec![String::new()],
        })
        .await;
    assert!(status.is_2xx());
    assert!(store.create_schema(COLL, users_schema(1)).await.is_2xx());
    let schema = store.get_schema(COLL, "users", Some(1)).await.into_result().unwrap();
    (store, schema)
}

fn user(schema: &Arc<Schema>, id: i32, name: &str) -> SkvRecord {
    SkvRecord::from_values(COLL, Arc::clone(schema), vec![Some(id.into()), Some(name.into())]).unwrap()
}

fn key_record(schema: &Arc<Schema>, id: i32) -> SkvRecord {
    let mut record = SkvRecord::new(COLL, Arc::clone(schema));
    record.serialize_next(id).unwrap();
    record
}

async fn begin(store: &MemoryStore) -> Arc<dyn SkvTxn> {
    store.begin_txn(TxnOptions::default()).await.into_result().unwrap()
}

#[tokio::test]
async fn test_schema_lifecycle() {
    let (store, _) = setup().await;
    assert_eq!(store.create_schema(COLL, users_schema(1)).await.code, 409);
    assert!(store.create_schema(COLL, users_schema(2)).await.is_2xx());

    let latest = store.get_schema(COLL, "users", None).await.into_result().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(store.get_schema(COLL, "nope", None).await.status.code, 404);
    assert_eq!(store.get_schema("nope", "users", None).await.status.code, 404);

    let bad = Schema::new("bad", 1).with_field(SchemaField::new("x", FieldType::Bool));
    assert_eq!(store.create_schema(COLL, bad).await.code, 400);
}

#[tokio::test]
async fn test_read_your_writes_and_commit() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    assert!(txn.write(user(&schema, 1, "ann"), false, true).await.is_2xx());

    let read = txn.read(key_record(&schema, 1)).await.into_result().unwrap();
    assert_eq!(read.field(1), Some(&FieldValue::from("ann")));

    let other = begin(&store).await;
    assert_eq!(other.read(key_record(&schema, 1)).await.status.code, 404);

    assert!(txn.end(true).await.is_2xx());
    assert_eq!(store.row_count(COLL, "users"), 1);

    let later = begin(&store).await;
    assert!(later.read(key_record(&schema, 1)).await.status.is_2xx());
}

#[tokio::test]
async fn test_reject_if_exists() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    assert!(txn.write(user(&schema, 1, "ann"), false, true).await.is_2xx());
    assert_eq!(txn.write(user(&schema, 1, "bob"), false, true).await.code, 412);
    assert!(txn.write(user(&schema, 1, "bob"), false, false).await.is_2xx());
}

#[tokio::test]
async fn test_write_conflict() {
    let (store, schema) = setup().await;
    let t1 = begin(&store).await;
    let t2 = begin(&store).await;
    assert!(t1.write(user(&schema, 1, "a"), false, false).await.is_2xx());
    assert!(t2.write(user(&schema, 1, "b"), false, false).await.is_2xx());
    assert!(t1.end(true).await.is_2xx());
    assert_eq!(t2.end(true).await.code, 409);

    let t3 = begin(&store).await;
    let read = t3.read(key_record(&schema, 1)).await.into_result().unwrap();
    assert_eq!(read.field(1), Some(&FieldValue::from("a")));
}

#[tokio::test]
async fn test_ended_txn_is_gone() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    assert!(txn.end(false).await.is_2xx());
    assert_eq!(txn.end(true).await.code, 410);
    assert_eq!(txn.read(key_record(&schema, 1)).await.status.code, 410);
}

#[tokio::test]
async fn test_deadline() {
    let (store, schema) = setup().await;
    let txn = store
        .begin_txn(TxnOptions { timeout: Duration::from_millis(1) })
        .await
        .into_result()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(txn.write(user(&schema, 1, "a"), false, false).await.code, 408);
    assert_eq!(txn.end(true).await.code, 410);
}

#[tokio::test]
async fn test_partial_update_and_erase() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    assert_eq!(txn.partial_update(user(&schema, 1, "x"), vec![1], None).await.code, 404);
    assert!(txn.write(user(&schema, 1, "ann"), false, false).await.is_2xx());

    let mut update = SkvRecord::new(COLL, Arc::clone(&schema));
    update.skip_next().unwrap();
    update.serialize_next("annie").unwrap();
    let key = user(&schema, 1, "").key();
    assert!(txn.partial_update(update, vec![1], Some(key)).await.is_2xx());

    let read = txn.read(key_record(&schema, 1)).await.into_result().unwrap();
    assert_eq!(read.field(0), Some(&FieldValue::Int32(1)));
    assert_eq!(read.field(1), Some(&FieldValue::from("annie")));

    assert!(txn.write(key_record(&schema, 1), true, false).await.is_2xx());
    assert_eq!(txn.read(key_record(&schema, 1)).await.status.code, 404);
}

#[tokio::test]
async fn test_paged_scan_resumes() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    for id in 0..10 {
        assert!(txn.write(user(&schema, id, "u"), false, false).await.is_2xx());
    }
    assert!(txn.end(true).await.is_2xx());

    let txn = begin(&store).await;
    let mut query = store.create_scan_read(COLL, "users").await.into_result().unwrap();
    query.set_limit(Some(3));
    let mut seen = Vec::new();
    loop {
        let page = txn.scan_read(query).await.into_result().unwrap();
        for record in &page.records {
            if let Some(FieldValue::Int32(id)) = record.field(0) {
                seen.push(*id);
            }
        }
        query = page.query;
        if query.is_done() {
            break;
        }
    }
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_bounded_reverse_filtered_scan() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    for id in 0..10 {
        let name = if id % 2 == 0 { "even" } else { "odd" };
        assert!(txn.write(user(&schema, id, name), false, false).await.is_2xx());
    }

    let mut query = Query::new(COLL, Arc::clone(&schema));
    query.set_bounds(key_record(&schema, 2), key_record(&schema, 7));
    query.set_reverse_direction(true);
    query.set_filter(Filter::Eq { field: "name".into(), value: "even".into() });
    query.add_projection("id");

    let page = txn.scan_read(query).await.into_result().unwrap();
    assert!(page.query.is_done());
    let ids: Vec<_> = page.records.iter().map(|r| r.field(0).cloned()).collect();
    assert_eq!(
        ids,
        vec![Some(FieldValue::Int32(6)), Some(FieldValue::Int32(4)), Some(FieldValue::Int32(2))]
    );
    assert!(page.records.iter().all(|r| r.field(1).is_none()));
}

#[tokio::test]
async fn test_injected_fault() {
    let (store, schema) = setup().await;
    let txn = begin(&store).await;
    store.inject_fault(SkvStatus::service_unavailable("partition moving"));
    assert_eq!(txn.read(key_record(&schema, 1)).await.status.code, 503);
    assert_eq!(txn.read(key_record(&schema, 1)).await.status.code, 404);
}
