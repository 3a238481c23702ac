//! Deterministic row generation for writes
//!
//! Cell `(r, c)` of a generated matrix holds the number `r * columns + c`,
//! encoded for the column's type (`Utf8` cells read `String_<n>`). Three
//! rows of a `(key, value)` table are therefore `0,1 / 2,3 / 4,5`.

use stepshard_core::{
    Cell, CellMatrix, ColumnType, DataFormat, OperationKind, Result, TxId, WriteMode, WriteRequest,
};
use stepshard_storage::TableSchema;

/// Matrix of `row_count` rows over `columns`
pub fn generate_rows(columns: &[ColumnType], row_count: u32) -> Result<CellMatrix> {
    let width = columns.len() as u64;
    let rows = (0..u64::from(row_count))
        .map(|r| {
            columns
                .iter()
                .zip(0u64..)
                .map(|(column_type, c)| generated_cell(*column_type, r * width + c))
                .collect()
        })
        .collect();
    Ok(CellMatrix::from_rows(rows)?)
}

fn generated_cell(column_type: ColumnType, n: u64) -> Cell {
    match column_type {
        ColumnType::Uint32 => Cell::from_u32(n as u32),
        ColumnType::Uint64 => Cell::from_u64(n),
        ColumnType::Utf8 => Cell::from_string(&format!("String_{}", n)),
    }
}

/// UPSERT of `row_count` generated rows into every column of `schema`
pub fn upsert_request(
    tx_id: TxId,
    mode: WriteMode,
    schema: &TableSchema,
    row_count: u32,
) -> Result<WriteRequest> {
    let types: Vec<ColumnType> = schema.columns().iter().map(|c| c.column_type).collect();
    let matrix = generate_rows(&types, row_count)?;

    let mut request = WriteRequest::new(tx_id, mode);
    let payload_index = request.add_data_to_payload(matrix.release_buffer());
    request.add_operation(
        OperationKind::Upsert,
        schema.id(),
        schema.columns().iter().map(|c| c.id).collect(),
        payload_index,
        DataFormat::CellVec,
    );
    Ok(request)
}
