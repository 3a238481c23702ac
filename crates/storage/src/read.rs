//! Read-back rendering of table contents
//!
//! One line per row in primary key order: `col = value, col = value`.

use crate::schema::TableSchema;
use crate::store::Row;

/// Render rows as `name = value` lines
pub fn format_rows(schema: &TableSchema, rows: &[Row]) -> String {
    let mut out = String::new();
    for row in rows {
        let line = schema
            .columns()
            .iter()
            .zip(&row.values)
            .map(|(column, value)| format!("{} = {}", column.name, value))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
