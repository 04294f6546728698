//! End-to-end tests of the gate over the in-process store.
//!
//! Each test opens its own gate, so tests share nothing.

use std::sync::Once;
use std::time::Duration;

use pgskv_common::{GateConfig, GateError, PgOid, RequestStatus};
use pgskv_gate::adapter::{ExprOpcode, PgOp, SqlOpWriteRequest, SqlValue, StmtType};
use pgskv_gate::catalog::{CreateIndexRequest, CreateTableRequest};
use pgskv_gate::entity::{ColumnSchema, DataType, IndexPermissions, TableDesc};
use pgskv_gate::session::{DdlResult, DmlSelectBuilder, DmlWriteBuilder, Statement};
use pgskv_gate::{Gate, Session};

const DB: &str = "shop";
const DB_OID: PgOid = 16384;
const ORDERS: PgOid = 16400;
const ORDERS_BY_CUSTOMER: PgOid = 16401;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A gate with database `shop` holding table `orders(region, id, customer, total)`.
fn setup() -> (Gate, Session) {
    init_tracing();
    let gate = Gate::open_memory(GateConfig::for_testing()).unwrap();
    let mut session = gate.create_session();
    session
        .execute_ddl(Statement::CreateDatabase { name: DB.into(), oid: DB_OID })
        .unwrap();
    session.connect_database(DB).unwrap();
    session
        .execute_ddl(Statement::CreateTable(CreateTableRequest {
            database_name: DB.into(),
            table_name: "orders".into(),
            table_oid: ORDERS,
            columns: vec![
                ColumnSchema::new("region", DataType::Int32).partition().with_order(1),
                ColumnSchema::new("id", DataType::Int64).primary().with_order(2),
                ColumnSchema::new("customer", DataType::String).with_order(3),
                ColumnSchema::new("total", DataType::Int64).with_order(4),
            ],
            is_sys_table: false,
            if_not_exist: false,
        }))
        .unwrap();
    (gate, session)
}

fn insert_op(desc: &TableDesc, region: i32, id: i64, customer: &str, total: i64) -> PgOp {
    let mut builder = DmlWriteBuilder::new(desc, StmtType::Insert).unwrap();
    builder
        .bind_column(1, region)
        .unwrap()
        .bind_column(2, id)
        .unwrap()
        .bind_column(3, customer)
        .unwrap()
        .bind_column(4, total)
        .unwrap();
    builder.build().unwrap()
}

fn run(session: &mut Session, op: PgOp, desc: &TableDesc) -> Result<PgOp, GateError> {
    session.run_op(op, desc, false)?.expect("operation was buffered").wait()
}

fn ids(rows: &[Vec<SqlValue>]) -> Vec<SqlValue> {
    rows.iter().map(|row| row[1].clone()).collect()
}

#[test]
fn test_create_table_persists_catalog() {
    let (gate, mut session) = setup();
    let version = session.get_catalog_master_version();
    assert!(version >= 2);

    let info = session.table_info(ORDERS).unwrap();
    assert_eq!(info.table_name, "orders");
    assert_eq!(info.schema.num_key_columns(), 2);
    assert_eq!(info.next_column_id, 4);

    // a second gate over a fresh store has no such table
    let other = Gate::open_memory(GateConfig::for_testing()).unwrap();
    assert!(other.catalog().get_table(DB, ORDERS).is_err());

    let tables = gate.catalog().list_tables(DB).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table_id, info.table_id);

    let err = session
        .execute_ddl(Statement::CreateTable(CreateTableRequest {
            database_name: DB.into(),
            table_name: "orders".into(),
            table_oid: ORDERS,
            columns: vec![ColumnSchema::new("k", DataType::Int64).partition().with_order(1)],
            is_sys_table: false,
            if_not_exist: false,
        }))
        .unwrap_err();
    assert!(matches!(err, GateError::AlreadyExists { .. }));
    assert_eq!(session.get_catalog_master_version(), version);
}

#[test]
fn test_insert_select_update_delete() {
    let (_gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();

    run(&mut session, insert_op(&desc, 1, 10, "ann", 250), &desc).unwrap();
    run(&mut session, insert_op(&desc, 1, 11, "bob", 90), &desc).unwrap();
    session.commit_transaction().unwrap();

    // insert of an existing key
    let err = run(&mut session, insert_op(&desc, 1, 10, "ann", 1), &desc).unwrap_err();
    assert_eq!(err.request_status(), RequestStatus::DuplicateKey);
    session.abort_transaction().unwrap();

    // point read by key
    let mut select = DmlSelectBuilder::new(&desc);
    select.bind_key(1, 1).unwrap().bind_key(2, 10_i64).unwrap();
    let rows = session.fetch_all(select.build(), &desc).unwrap();
    assert_eq!(
        rows,
        vec![vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::from("ann"), SqlValue::Int(250)]]
    );

    // update through the row id
    let row_id = session.get_row_id(&desc, &[SqlValue::Int(1), SqlValue::Int(11)]).unwrap();
    let mut update = DmlWriteBuilder::new(&desc, StmtType::Update).unwrap();
    update.bind_row_id(row_id.clone()).bind_column(4, 95_i64).unwrap();
    run(&mut session, update.build().unwrap(), &desc).unwrap();

    let mut by_row = DmlSelectBuilder::new(&desc);
    by_row.bind_row_id(row_id).add_target(4).unwrap();
    let rows = session.fetch_all(by_row.build(), &desc).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][3], SqlValue::Int(95));
    assert_eq!(rows[0][2], SqlValue::Null);

    // delete by key
    let mut delete = DmlWriteBuilder::new(&desc, StmtType::Delete).unwrap();
    delete.bind_column(1, 1).unwrap().bind_column(2, 10_i64).unwrap();
    run(&mut session, delete.build().unwrap(), &desc).unwrap();
    session.commit_transaction().unwrap();

    let rows = session.fetch_all(DmlSelectBuilder::new(&desc).build(), &desc).unwrap();
    assert_eq!(ids(&rows), vec![SqlValue::Int(11)]);
    session.commit_transaction().unwrap();
}

#[test]
fn test_range_scan_and_pages() {
    let (_gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();
    for id in 0..10_i64 {
        run(&mut session, insert_op(&desc, 2, id, "c", id * 10), &desc).unwrap();
    }
    run(&mut session, insert_op(&desc, 3, 0, "other", 0), &desc).unwrap();
    session.commit_transaction().unwrap();

    // region 2, ids 3..=6
    let mut select = DmlSelectBuilder::new(&desc);
    select.bind_key(1, 2).unwrap().add_between(2, 3_i64, 6_i64).unwrap();
    let rows = session.fetch_all(select.build(), &desc).unwrap();
    assert_eq!(ids(&rows), (3..=6).map(SqlValue::Int).collect::<Vec<_>>());

    let mut select = DmlSelectBuilder::new(&desc);
    select.bind_key(1, 2).unwrap().add_condition(ExprOpcode::Ge, 2, 8_i64).unwrap();
    let rows = session.fetch_all(select.build(), &desc).unwrap();
    assert_eq!(ids(&rows), vec![SqlValue::Int(8), SqlValue::Int(9)]);

    // three rows per page over one region
    let mut select = DmlSelectBuilder::new(&desc);
    select.bind_key(1, 2).unwrap().set_limit(3);
    let mut op = select.build();
    let mut pages = 0;
    let mut seen = 0;
    loop {
        let PgOp::Read(read) = run(&mut session, op.clone(), &desc).unwrap() else {
            panic!("expected a read");
        };
        pages += 1;
        assert!(read.response.rows.len() <= 3);
        seen += read.response.rows.len();
        let Some(state) = read.response.paging_state else { break };
        let PgOp::Read(next) = &mut op else { unreachable!() };
        next.request.paging_state = Some(state);
    }
    assert_eq!(seen, 10);
    assert!(pages >= 4);

    // paged fetch sees the same rows as an unpaged one
    let rows = session.fetch_all(op_without_paging(&desc, 4), &desc).unwrap();
    assert_eq!(rows.len(), 11);
    session.commit_transaction().unwrap();
}

fn op_without_paging(desc: &TableDesc, limit: u64) -> PgOp {
    let mut select = DmlSelectBuilder::new(desc);
    select.set_limit(limit);
    select.build()
}

#[test]
fn test_buffered_writes_keep_order() {
    let (_gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();
    session.start_operations_buffering().unwrap();

    assert!(session.run_op(insert_op(&desc, 1, 1, "ann", 10), &desc, false).unwrap().is_none());
    // same row: the insert is flushed before the update is buffered
    let mut update = DmlWriteBuilder::new(&desc, StmtType::Update).unwrap();
    update.bind_column(1, 1).unwrap().bind_column(2, 1_i64).unwrap().bind_column(4, 20_i64).unwrap();
    assert!(session.run_op(update.build().unwrap(), &desc, false).unwrap().is_none());
    assert_eq!(session.buffered_operations(), 1);

    session.flush_buffered_operations().unwrap();
    assert_eq!(session.buffered_operations(), 0);
    session.stop_operations_buffering().unwrap();
    session.commit_transaction().unwrap();

    let rows = session.fetch_all(DmlSelectBuilder::new(&desc).build(), &desc).unwrap();
    assert_eq!(rows[0][3], SqlValue::Int(20));
    session.commit_transaction().unwrap();
}

#[test]
fn test_dropped_buffer_writes_nothing() {
    let (_gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();
    session.start_operations_buffering().unwrap();
    session.run_op(insert_op(&desc, 1, 1, "ann", 10), &desc, false).unwrap();
    session.drop_buffered_operations();
    session.stop_operations_buffering().unwrap();
    session.commit_transaction().unwrap();

    let rows = session.fetch_all(DmlSelectBuilder::new(&desc).build(), &desc).unwrap();
    assert!(rows.is_empty());
    session.commit_transaction().unwrap();
}

#[test]
fn test_index_build_and_index_rows() {
    let (_gate, mut session) = setup();
    let result = session
        .execute_ddl(Statement::CreateIndex(CreateIndexRequest {
            database_name: DB.into(),
            index_name: "orders_by_customer".into(),
            index_oid: ORDERS_BY_CUSTOMER,
            base_table_oid: ORDERS,
            columns: vec!["customer".into(), "id".into()],
            is_unique: false,
            skip_index_backfill: false,
            if_not_exist: false,
        }))
        .unwrap();
    let DdlResult::Index(index) = result else { panic!("expected an index") };
    assert_eq!(index.index_permissions, IndexPermissions::DeleteOnly);

    let reached = session
        .wait_until_index_permissions_at_least(ORDERS, ORDERS_BY_CUSTOMER, IndexPermissions::ReadWriteAndDelete)
        .unwrap();
    assert_eq!(reached, IndexPermissions::ReadWriteAndDelete);
    let info = session.table_info(ORDERS).unwrap();
    assert!(info.index(&index.table_id).unwrap().index_permissions.is_readable());

    let index_desc = session.index_desc(ORDERS, ORDERS_BY_CUSTOMER).unwrap();
    assert!(index_desc.is_index());
    for (customer, id) in [("bob", 2_i64), ("ann", 7), ("ann", 3)] {
        let mut write = DmlWriteBuilder::new(&index_desc, StmtType::Insert).unwrap();
        write.bind_column(1, customer).unwrap().bind_column(2, id).unwrap();
        run(&mut session, write.build().unwrap(), &index_desc).unwrap();
    }

    let mut select = DmlSelectBuilder::new(&index_desc);
    select.bind_key(1, "ann").unwrap();
    let rows = session.fetch_all(select.build(), &index_desc).unwrap();
    assert_eq!(ids(&rows), vec![SqlValue::Int(3), SqlValue::Int(7)]);
    session.commit_transaction().unwrap();

    session
        .execute_ddl(Statement::DropIndex {
            database_name: DB.into(),
            base_table_oid: ORDERS,
            index_oid: ORDERS_BY_CUSTOMER,
        })
        .unwrap();
    assert!(matches!(
        session.index_desc(ORDERS, ORDERS_BY_CUSTOMER),
        Err(GateError::NotFound { .. })
    ));
}

#[test]
fn test_drop_table() {
    let (_gate, mut session) = setup();
    session.load_table(ORDERS).unwrap();
    let result = session
        .execute_ddl(Statement::DropTable { database_name: DB.into(), table_oid: ORDERS })
        .unwrap();
    assert_eq!(result, DdlResult::Dropped);
    assert!(matches!(session.load_table(ORDERS), Err(GateError::NotFound { .. })));
}

#[test]
fn test_operation_on_ended_transaction_is_invalid() {
    let (gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();
    let adapter = gate.catalog().adapter();

    let txn = adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap();
    adapter.end_transaction(txn, true).wait().unwrap();
    let PgOp::Write(write) = insert_op(&desc, 1, 1, "ann", 1) else { unreachable!() };
    let err = adapter.exec(txn, PgOp::Write(write)).unwrap().wait().unwrap_err();
    assert!(matches!(err, GateError::InvalidTransaction { .. }), "{err:?}");
    assert!(!err.is_retryable());
    assert_eq!(err.request_status(), RequestStatus::UsageError);
}

#[test]
fn test_timed_out_transaction_is_not_retried_forever() {
    let (_gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();

    session.set_timeout(Duration::from_millis(1));
    session.begin_transaction().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let first = session.run_op(insert_op(&desc, 1, 1, "ann", 10), &desc, false).unwrap().unwrap();
    let err = first.wait().unwrap_err();
    assert!(matches!(err, GateError::Timeout { .. }), "{err:?}");

    // the caller retries on the same handle
    let second = session.run_op(insert_op(&desc, 1, 2, "bob", 20), &desc, false).unwrap().unwrap();
    let err = second.wait().unwrap_err();
    assert!(matches!(err, GateError::InvalidTransaction { .. }), "{err:?}");
    assert!(!err.is_retryable());

    assert!(matches!(session.commit_transaction(), Err(GateError::InvalidTransaction { .. })));
    assert_eq!(session.txn_state(), pgskv_gate::session::TxnState::Aborted);
}

#[test]
fn test_malformed_write_rejected_before_dispatch() {
    let (gate, mut session) = setup();
    let desc = session.load_table(ORDERS).unwrap();
    let request = SqlOpWriteRequest::new(desc.collection(), desc.table_id(), 1, StmtType::Truncate);
    let txn = session.begin_transaction().unwrap();
    let err = gate.catalog().adapter().exec(txn, PgOp::write(request)).unwrap_err();
    assert!(matches!(err, GateError::NotSupported { .. }));
    session.abort_transaction().unwrap();
}
