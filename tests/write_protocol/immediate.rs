//! Immediate Write Tests
//!
//! Single-shard writes executed without coordination.

use crate::common::*;

#[test]
fn immediate_write_reports_origin_and_zero_step() {
    let t = TestShard::new(ShardConfig::default());
    let result = t.write_rows(100, WriteMode::Immediate);

    assert_eq!(result.status, WriteStatus::Completed, "{}", result.issues_text());
    assert_eq!(result.origin, t.id());
    assert_eq!(result.step, Step::ZERO);
    assert_eq!(result.order_id, TxId(100));
    assert_eq!(result.tx_id, TxId(100));
    assert!(result.issues.is_empty());

    let stats = &result.tx_stats.table_access_stats[0];
    assert_eq!(stats.table_name, "/Root/table-1");
    assert_eq!(stats.update_row_count, 3);
}

#[test]
fn immediate_rows_scan_in_key_order() {
    let t = TestShard::new(ShardConfig::default());
    for (tx, row) in [(100, (4, 5)), (101, (0, 1)), (102, (2, 3))] {
        let result = t.shard.write(upsert_pairs(tx, WriteMode::Immediate, &t.table, &[row]));
        assert_eq!(result.status, WriteStatus::Completed);
    }

    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), EXPECTED_TABLE_STATE);
}

#[test]
fn immediate_generated_rows_read_back() {
    let t = TestShard::new(ShardConfig::default());
    t.write_rows(100, WriteMode::Immediate);
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), EXPECTED_TABLE_STATE);
}

#[test]
fn immediate_many_columns() {
    let t = TestShard::new(ShardConfig::default());
    let table = t
        .shard
        .create_table(many_columns_schema(2, "/Root/table-2"))
        .unwrap();
    let request = upsert_request(TxId(100), WriteMode::Immediate, &table, 3).unwrap();
    assert_eq!(t.shard.write(request).status, WriteStatus::Completed);

    assert_eq!(
        t.shard.read_table("/Root/table-2").unwrap(),
        "key64 = 0, key32 = 1, value64 = 2, value32 = 3, valueUtf8 = String_4\n\
         key64 = 5, key32 = 6, value64 = 7, value32 = 8, valueUtf8 = String_9\n\
         key64 = 10, key32 = 11, value64 = 12, value32 = 13, valueUtf8 = String_14\n"
    );
}

#[test]
fn stats_follow_each_table_in_a_request() {
    let t = TestShard::new(ShardConfig::default());
    let other = t
        .shard
        .create_table(key_value_schema(2, "/Root/table-2"))
        .unwrap();

    let mut request = upsert_pairs(100, WriteMode::Immediate, &t.table, &[(0, 1), (2, 3)]);
    let second = upsert_pairs(0, WriteMode::Immediate, &other, &[(7, 8)]);
    let index = request.add_data_to_payload(second.payloads[0].clone());
    request.add_operation(
        OperationKind::Upsert,
        other.id(),
        vec![ColumnId(1), ColumnId(2)],
        index,
        DataFormat::CellVec,
    );

    let result = t.shard.write(request);
    assert_eq!(result.status, WriteStatus::Completed);
    assert_eq!(result.tx_stats.table(TableId(1)).unwrap().update_row_count, 2);
    let stats = result.tx_stats.table(TableId(2)).unwrap();
    assert_eq!(stats.table_name, "/Root/table-2");
    assert_eq!(stats.update_row_count, 1);
}

#[test]
fn insert_of_existing_key_is_a_constraint_violation() {
    let t = TestShard::new(ShardConfig::default());
    t.write_rows(100, WriteMode::Immediate);

    let mut request = upsert_pairs(101, WriteMode::Immediate, &t.table, &[(6, 7), (2, 9)]);
    request.operations[0].kind = OperationKind::Insert;
    let result = t.shard.write(request);

    assert_eq!(result.status, WriteStatus::ConstraintViolation);
    assert!(!result.issues.is_empty());
    // Nothing from the failed request is visible
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), EXPECTED_TABLE_STATE);
}

#[test]
fn replace_update_and_delete() {
    let t = TestShard::new(ShardConfig::default());
    t.write_rows(100, WriteMode::Immediate);

    let mut update = upsert_pairs(101, WriteMode::Immediate, &t.table, &[(2, 30), (9, 90)]);
    update.operations[0].kind = OperationKind::Update;
    let result = t.shard.write(update);
    assert_eq!(result.status, WriteStatus::Completed);
    assert_eq!(result.tx_stats.table(TableId(1)).unwrap().update_row_count, 1);

    // REPLACE with only the key column clears the value
    let matrix = CellMatrix::from_rows(vec![vec![Cell::from_u32(4)]]).unwrap();
    let mut replace = WriteRequest::new(TxId(102), WriteMode::Immediate);
    let index = replace.add_data_to_payload(matrix.release_buffer());
    replace.add_operation(
        OperationKind::Replace,
        TableId(1),
        vec![ColumnId(1)],
        index,
        DataFormat::CellVec,
    );
    assert_eq!(t.shard.write(replace).status, WriteStatus::Completed);

    let matrix = CellMatrix::from_rows(vec![vec![Cell::from_u32(0)]]).unwrap();
    let mut delete = WriteRequest::new(TxId(103), WriteMode::Immediate);
    let index = delete.add_data_to_payload(matrix.release_buffer());
    delete.add_operation(
        OperationKind::Delete,
        TableId(1),
        vec![ColumnId(1)],
        index,
        DataFormat::CellVec,
    );
    let result = t.shard.write(delete);
    assert_eq!(result.tx_stats.table(TableId(1)).unwrap().erase_row_count, 1);

    assert_eq!(
        t.shard.read_table("/Root/table-1").unwrap(),
        "key = 2, value = 30\nkey = 4, value = NULL\n"
    );
}

#[test]
fn storage_failure_is_reported_not_retried() {
    let t = TestShard::new(ShardConfig::default());
    t.store.inject_apply_failure("device unavailable");

    let result = t.write_rows(100, WriteMode::Immediate);
    assert_eq!(result.status, WriteStatus::InternalError);
    assert!(result.issues_text().contains("device unavailable"));
    assert_eq!(t.store.applied_batches(), 0);

    // The next write goes through; nothing was retried in between
    assert_eq!(t.write_rows(101, WriteMode::Immediate).status, WriteStatus::Completed);
    assert_eq!(t.store.applied_batches(), 1);
}

#[test]
fn payloads_are_released_after_every_request() {
    let t = TestShard::new(ShardConfig::default());
    t.write_rows(100, WriteMode::Immediate);
    t.write_rows(101, WriteMode::Prepare);
    let mut bad = upsert_pairs(102, WriteMode::Immediate, &t.table, &[(1, 1)]);
    bad.operations[0].payload_index = 5;
    assert_eq!(t.shard.write(bad).status, WriteStatus::BadRequest);

    assert_eq!(t.shard.live_payloads(), 0);
}

#[test]
fn metrics_count_outcomes() {
    let t = TestShard::new(ShardConfig::default());
    t.write_rows(100, WriteMode::Immediate);
    t.write_rows(101, WriteMode::Prepare);
    let mut bad = upsert_pairs(102, WriteMode::Immediate, &t.table, &[(1, 1)]);
    bad.operations[0].table_id = TableId(42);
    t.shard.write(bad);

    let metrics = t.shard.metrics();
    assert_eq!(metrics.immediate_completed, 1);
    assert_eq!(metrics.prepared, 1);
    assert_eq!(metrics.rejected, 1);
    assert_eq!(metrics.pending, 1);
}
