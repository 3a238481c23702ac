//! Request Validation Tests
//!
//! Rejections happen before any storage mutation and leave nothing pending.

use crate::common::*;

const HUGE_KEY_LEN: usize = 1_049_601;

fn huge_key_request(tx_id: u64, mode: WriteMode, table: &TableSchema) -> WriteRequest {
    let matrix =
        CellMatrix::from_rows(vec![vec![Cell::from_string(&"X".repeat(HUGE_KEY_LEN))]]).unwrap();
    let mut request = WriteRequest::new(TxId(tx_id), mode);
    let index = request.add_data_to_payload(matrix.release_buffer());
    request.add_operation(
        OperationKind::Upsert,
        table.id(),
        vec![ColumnId(1)],
        index,
        DataFormat::CellVec,
    );
    request
}

#[test]
fn oversized_key_is_rejected_with_exact_message() {
    for mode in [WriteMode::Immediate, WriteMode::Prepare] {
        let t = TestShard::new(ShardConfig::default());
        let table = t
            .shard
            .create_table(utf8_key_schema(3, "/Root/table-3"))
            .unwrap();

        let result = t.shard.write(huge_key_request(100, mode, &table));

        assert_eq!(result.status, WriteStatus::BadRequest);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(
            result.issues[0].message,
            "Row key size of 1049601 bytes is larger than the allowed threshold 1049600"
        );
        assert_eq!(t.store.row_count(TableId(3)), 0);
        assert_eq!(t.shard.pending_count(), 0);
        assert_eq!(t.shard.prepared_count(), 0);
        assert_eq!(t.shard.live_payloads(), 0);
    }
}

#[test]
fn key_at_threshold_is_accepted() {
    let t = TestShard::new(ShardConfig::default());
    let table = t
        .shard
        .create_table(utf8_key_schema(3, "/Root/table-3"))
        .unwrap();
    let matrix =
        CellMatrix::from_rows(vec![vec![Cell::from_string(&"X".repeat(1_049_600))]]).unwrap();
    let mut request = WriteRequest::new(TxId(100), WriteMode::Immediate);
    let index = request.add_data_to_payload(matrix.release_buffer());
    request.add_operation(
        OperationKind::Upsert,
        table.id(),
        vec![ColumnId(1)],
        index,
        DataFormat::CellVec,
    );

    assert_eq!(t.shard.write(request).status, WriteStatus::Completed);
    assert_eq!(t.store.row_count(TableId(3)), 1);
}

#[test]
fn configured_key_limit_applies() {
    let config = ShardConfig {
        max_write_key_size: 4,
        ..ShardConfig::default()
    };
    let t = TestShard::new(config);
    let result = t.write_rows(100, WriteMode::Immediate);
    assert_eq!(result.status, WriteStatus::Completed);

    let table = t
        .shard
        .create_table(utf8_key_schema(3, "/Root/table-3"))
        .unwrap();
    let matrix = CellMatrix::from_rows(vec![
        vec![Cell::from_string("abcde")],
        vec![Cell::from_string("ab")],
        vec![Cell::from_string("abcdef")],
    ])
    .unwrap();
    let mut request = WriteRequest::new(TxId(101), WriteMode::Immediate);
    let index = request.add_data_to_payload(matrix.release_buffer());
    request.add_operation(
        OperationKind::Upsert,
        table.id(),
        vec![ColumnId(1)],
        index,
        DataFormat::CellVec,
    );

    let result = t.shard.write(request);
    assert_eq!(result.status, WriteStatus::BadRequest);
    assert_eq!(result.issues.len(), 2);
    assert_eq!(
        result.issues[1].message,
        "Row key size of 6 bytes is larger than the allowed threshold 4"
    );
    assert_eq!(t.store.row_count(TableId(3)), 0);
}

#[test]
fn unknown_table_is_a_scheme_error() {
    let t = TestShard::new(ShardConfig::default());
    let mut request = upsert_pairs(100, WriteMode::Prepare, &t.table, &[(0, 1)]);
    request.operations[0].table_id = TableId(77);

    let result = t.shard.write(request);
    assert_eq!(result.status, WriteStatus::SchemeError);
    assert!(!result.issues.is_empty());
    assert_eq!(t.shard.pending_count(), 0);
}

#[test]
fn malformed_requests_are_bad_requests() {
    let t = TestShard::new(ShardConfig::default());

    let empty = WriteRequest::new(TxId(100), WriteMode::Immediate);
    assert_eq!(t.shard.write(empty).status, WriteStatus::BadRequest);

    let mut arrow = upsert_pairs(101, WriteMode::Immediate, &t.table, &[(0, 1)]);
    arrow.operations[0].format = DataFormat::Arrow;
    let result = t.shard.write(arrow);
    assert_eq!(result.status, WriteStatus::BadRequest);
    assert!(result.issues_text().contains("CELLVEC"));

    let mut no_key = upsert_pairs(102, WriteMode::Immediate, &t.table, &[(0, 1)]);
    no_key.operations[0].column_ids = vec![ColumnId(2), ColumnId(1)];
    assert_eq!(t.shard.write(no_key).status, WriteStatus::BadRequest);

    let mut garbage = upsert_pairs(103, WriteMode::Immediate, &t.table, &[(0, 1)]);
    garbage.payloads[0] = vec![0xde, 0xad];
    assert_eq!(t.shard.write(garbage).status, WriteStatus::BadRequest);

    let mut delete_with_values = upsert_pairs(104, WriteMode::Immediate, &t.table, &[(0, 1)]);
    delete_with_values.operations[0].kind = OperationKind::Delete;
    assert_eq!(
        t.shard.write(delete_with_values).status,
        WriteStatus::BadRequest
    );

    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), "");
    assert_eq!(t.shard.live_payloads(), 0);
}

#[test]
fn rejected_operation_discards_the_whole_request() {
    let t = TestShard::new(ShardConfig::default());
    let mut request = upsert_pairs(100, WriteMode::Immediate, &t.table, &[(0, 1)]);
    let second = upsert_pairs(0, WriteMode::Immediate, &t.table, &[(2, 3)]);
    let index = request.add_data_to_payload(second.payloads[0].clone());
    request.add_operation(
        OperationKind::Upsert,
        TableId(99),
        vec![ColumnId(1), ColumnId(2)],
        index,
        DataFormat::CellVec,
    );

    assert_eq!(t.shard.write(request).status, WriteStatus::SchemeError);
    assert_eq!(t.store.row_count(TableId(1)), 0);
}
