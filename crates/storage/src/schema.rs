//! Table schemas and the per-shard catalog
//!
//! Column ids are assigned sequentially from 1 in declaration order. Key
//! columns are the columns flagged as key, in declaration order; that order
//! is the primary key order used for storage and scans.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use stepshard_core::{ColumnId, ColumnType, Error, Result, TableId};

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column id
    pub id: ColumnId,
    /// Column name
    pub name: String,
    /// Data type
    pub column_type: ColumnType,
    /// Part of the primary key
    pub key: bool,
}

/// Schema of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    id: TableId,
    name: String,
    columns: Vec<ColumnSchema>,
    key_columns: Vec<ColumnId>,
}

impl TableSchema {
    /// Validate and build a schema
    ///
    /// Requires at least one key column and unique column ids and names.
    pub fn new(id: TableId, name: impl Into<String>, columns: Vec<ColumnSchema>) -> Result<Self> {
        let name = name.into();
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for column in &columns {
            if !ids.insert(column.id) {
                return Err(Error::Scheme(format!(
                    "Duplicate column id {} in table {}",
                    column.id, name
                )));
            }
            if !names.insert(column.name.as_str()) {
                return Err(Error::Scheme(format!(
                    "Duplicate column name '{}' in table {}",
                    column.name, name
                )));
            }
        }

        let key_columns: Vec<ColumnId> = columns.iter().filter(|c| c.key).map(|c| c.id).collect();
        if key_columns.is_empty() {
            return Err(Error::Scheme(format!("Table {} has no key columns", name)));
        }

        Ok(TableSchema {
            id,
            name,
            columns,
            key_columns,
        })
    }

    /// Start a builder that numbers columns from 1
    pub fn builder(id: TableId, name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            id,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Table id
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table path name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Key column ids in key order
    pub fn key_columns(&self) -> &[ColumnId] {
        &self.key_columns
    }

    /// Look up a column by id
    pub fn column(&self, id: ColumnId) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Position of a column in declaration order
    pub fn column_index(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    /// Non-key columns in declaration order
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| !c.key)
    }
}

/// Builder for `TableSchema`
#[derive(Debug)]
pub struct TableSchemaBuilder {
    id: TableId,
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchemaBuilder {
    fn push(mut self, name: &str, column_type: ColumnType, key: bool) -> Self {
        let id = ColumnId(self.columns.len() as u32 + 1);
        self.columns.push(ColumnSchema {
            id,
            name: name.to_string(),
            column_type,
            key,
        });
        self
    }

    /// Add a primary key column
    pub fn key_column(self, name: &str, column_type: ColumnType) -> Self {
        self.push(name, column_type, true)
    }

    /// Add a value column
    pub fn column(self, name: &str, column_type: ColumnType) -> Self {
        self.push(name, column_type, false)
    }

    /// Validate and build
    pub fn build(self) -> Result<TableSchema> {
        TableSchema::new(self.id, self.name, self.columns)
    }
}

/// Tables known to one shard, by id and by path name
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<BTreeMap<TableId, Arc<TableSchema>>>,
}

impl Catalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; ids and names must be unique
    pub fn register(&self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.id()) {
            return Err(Error::Scheme(format!("Table id {} already exists", schema.id())));
        }
        if tables.values().any(|t| t.name() == schema.name()) {
            return Err(Error::Scheme(format!("Table {} already exists", schema.name())));
        }
        let schema = Arc::new(schema);
        tables.insert(schema.id(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Look up by id
    pub fn get(&self, id: TableId) -> Option<Arc<TableSchema>> {
        self.tables.read().get(&id).cloned()
    }

    /// Look up by path name
    pub fn by_name(&self, name: &str) -> Option<Arc<TableSchema>> {
        self.tables
            .read()
            .values()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// True if no table is registered
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}
