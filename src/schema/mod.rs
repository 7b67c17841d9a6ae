#![forbid(unsafe_code)]

//! Versioned schema snapshots consumed by the planner.
//!
//! An [`InfoSchema`] is immutable once built: sessions hold an `Arc` to the
//! snapshot that was current when their statement started, and a newer
//! version published through [`Domain`] never changes what they observe.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ColumnId, IndexId, TableId};

mod domain;
mod file;

pub use domain::Domain;
pub use file::{SchemaFile, SchemaFileError};

/// Storage type of a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Signed 64-bit integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
}

/// Column metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnInfo {
    /// Column identifier, unique within the table.
    pub id: ColumnId,
    /// Column name as declared.
    pub name: String,
    /// Position of the column within the table row.
    pub offset: usize,
    /// Storage type.
    pub ty: ColumnType,
    /// Whether the column accepts nulls.
    pub nullable: bool,
}

/// Secondary index metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexInfo {
    /// Index identifier, unique within the table.
    pub id: IndexId,
    /// Index name as declared.
    pub name: String,
    /// Offsets of the indexed columns, in key order.
    pub columns: Vec<usize>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// Table metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    /// Table identifier.
    pub id: TableId,
    /// Table name as declared.
    pub name: String,
    /// Columns in row order.
    pub columns: Vec<ColumnInfo>,
    /// Offset of the integer primary-key column used as the row handle.
    pub handle: Option<usize>,
    /// Secondary indexes.
    pub indexes: Vec<IndexInfo>,
    /// Estimated number of rows, used for access-path costing.
    pub row_count: u64,
}

impl TableInfo {
    /// Looks up a column by case-insensitive name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|col| col.name.eq_ignore_ascii_case(name))
    }

    /// Returns the primary-key handle column, if the table has one.
    pub fn handle_column(&self) -> Option<&ColumnInfo> {
        self.handle.and_then(|offset| self.columns.get(offset))
    }
}

/// Database metadata.
#[derive(Clone, Debug, Default)]
pub struct DatabaseInfo {
    /// Database name as declared.
    pub name: String,
    tables: FxHashMap<String, Arc<TableInfo>>,
}

impl DatabaseInfo {
    /// Looks up a table by case-insensitive name.
    pub fn table(&self, name: &str) -> Option<&Arc<TableInfo>> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// Returns table names sorted alphabetically.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }
}

/// Immutable snapshot of all database, table, and column metadata.
#[derive(Clone, Debug, Default)]
pub struct InfoSchema {
    version: i64,
    databases: FxHashMap<String, DatabaseInfo>,
}

impl InfoSchema {
    /// Starts building a snapshot with the given version.
    pub fn builder(version: i64) -> InfoSchemaBuilder {
        InfoSchemaBuilder::new(version)
    }

    /// Schema version this snapshot was built at.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Looks up a database by case-insensitive name.
    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.get(&name.to_ascii_lowercase())
    }

    /// Looks up a table by case-insensitive database and table names.
    pub fn table(&self, db: &str, table: &str) -> Option<&Arc<TableInfo>> {
        self.database(db).and_then(|info| info.table(table))
    }

    /// Table names of `db` sorted alphabetically, or `None` if it doesn't exist.
    pub fn tables(&self, db: &str) -> Option<Vec<String>> {
        self.database(db).map(DatabaseInfo::table_names)
    }

    /// Returns database names sorted alphabetically.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.values().map(|d| d.name.clone()).collect();
        names.sort();
        names
    }

    /// Returns a builder seeded with this snapshot's contents at `version`.
    pub fn to_builder(&self, version: i64) -> InfoSchemaBuilder {
        let mut builder = InfoSchemaBuilder::new(version);
        for db in self.databases.values() {
            builder = builder.database(db.name.clone());
            let mut tables: Vec<&Arc<TableInfo>> = db.tables.values().collect();
            tables.sort_by_key(|t| t.id);
            for table in tables {
                builder = builder.table(db.name.clone(), TableDef::from_info(table));
            }
        }
        builder
    }
}

/// Errors raised while assembling a schema snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A table referenced a database that was never declared.
    #[error("unknown database '{db}'")]
    UnknownDatabase { db: String },
    /// Two tables share a name within one database.
    #[error("duplicate table '{db}.{table}'")]
    DuplicateTable { db: String, table: String },
    /// Two columns share a name within one table.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    /// A key or index referenced a column the table does not declare.
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    /// Only integer columns can serve as the row handle.
    #[error("primary key '{column}' of table '{table}' must be an int column")]
    HandleNotInt { table: String, column: String },
}

/// Declarative description of a table used by [`InfoSchemaBuilder`].
#[derive(Clone, Debug)]
pub struct TableDef {
    name: String,
    columns: Vec<(String, ColumnType, bool)>,
    primary_key: Option<String>,
    indexes: Vec<(String, Vec<String>, bool)>,
    row_count: u64,
}

impl TableDef {
    /// Starts a table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            row_count: 0,
        }
    }

    /// Adds a non-nullable column.
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty, false));
        self
    }

    /// Adds a nullable column.
    pub fn nullable_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty, true));
        self
    }

    /// Declares the integer primary-key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Adds a non-unique secondary index.
    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.indexes.push((name.into(), columns, false));
        self
    }

    /// Adds a unique secondary index.
    pub fn unique_index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.indexes.push((name.into(), columns, true));
        self
    }

    /// Sets the estimated row count.
    pub fn row_count(mut self, rows: u64) -> Self {
        self.row_count = rows;
        self
    }

    fn from_info(info: &TableInfo) -> Self {
        let name_of = |offset: &usize| info.columns[*offset].name.clone();
        Self {
            name: info.name.clone(),
            columns: info
                .columns
                .iter()
                .map(|col| (col.name.clone(), col.ty, col.nullable))
                .collect(),
            primary_key: info.handle_column().map(|col| col.name.clone()),
            indexes: info
                .indexes
                .iter()
                .map(|idx| (idx.name.clone(), idx.columns.iter().map(name_of).collect(), idx.unique))
                .collect(),
            row_count: info.row_count,
        }
    }

    fn into_info(self, id: TableId) -> Result<TableInfo, SchemaError> {
        let mut columns: Vec<ColumnInfo> = Vec::with_capacity(self.columns.len());
        for (offset, (name, ty, nullable)) in self.columns.into_iter().enumerate() {
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name,
                    column: name,
                });
            }
            columns.push(ColumnInfo {
                id: ColumnId(offset as u64 + 1),
                name,
                offset,
                ty,
                nullable,
            });
        }
        let offset_of = |column: &str| -> Result<usize, SchemaError> {
            columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(column))
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.to_owned(),
                })
        };
        let handle = match &self.primary_key {
            Some(pk) => {
                let offset = offset_of(pk)?;
                if columns[offset].ty != ColumnType::Int {
                    return Err(SchemaError::HandleNotInt {
                        table: self.name.clone(),
                        column: pk.clone(),
                    });
                }
                Some(offset)
            }
            None => None,
        };
        let mut indexes = Vec::with_capacity(self.indexes.len());
        for (idx, (name, cols, unique)) in self.indexes.iter().enumerate() {
            let offsets = cols
                .iter()
                .map(|c| offset_of(c))
                .collect::<Result<Vec<_>, _>>()?;
            indexes.push(IndexInfo {
                id: IndexId(idx as u64 + 1),
                name: name.clone(),
                columns: offsets,
                unique: *unique,
            });
        }
        if let Some(offset) = handle {
            columns[offset].nullable = false;
        }
        Ok(TableInfo {
            id,
            name: self.name,
            columns,
            handle,
            indexes,
            row_count: self.row_count,
        })
    }
}

/// Fluent builder producing an [`InfoSchema`].
#[derive(Debug)]
pub struct InfoSchemaBuilder {
    version: i64,
    databases: BTreeMap<String, (String, Vec<TableDef>)>,
    pending_error: Option<SchemaError>,
}

impl InfoSchemaBuilder {
    fn new(version: i64) -> Self {
        Self {
            version,
            databases: BTreeMap::new(),
            pending_error: None,
        }
    }

    /// Declares a database. Declaring the same database twice is a no-op.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.databases
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| (name, Vec::new()));
        self
    }

    /// Adds a table to a previously declared database.
    pub fn table(mut self, db: impl Into<String>, table: TableDef) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        let db = db.into();
        match self.databases.get_mut(&db.to_ascii_lowercase()) {
            Some((_, tables)) => tables.push(table),
            None => self.pending_error = Some(SchemaError::UnknownDatabase { db }),
        }
        self
    }

    /// Removes a table if present.
    pub fn drop_table(mut self, db: &str, table: &str) -> Self {
        if let Some((_, tables)) = self.databases.get_mut(&db.to_ascii_lowercase()) {
            tables.retain(|t| !t.name.eq_ignore_ascii_case(table));
        }
        self
    }

    /// Finalizes the snapshot, assigning table identifiers in declaration order.
    pub fn build(self) -> Result<InfoSchema, SchemaError> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }
        let mut next_table_id = 1u64;
        let mut databases = FxHashMap::default();
        for (key, (name, defs)) in self.databases {
            let mut tables = FxHashMap::default();
            for def in defs {
                let table_key = def.name.to_ascii_lowercase();
                if tables.contains_key(&table_key) {
                    return Err(SchemaError::DuplicateTable {
                        db: name,
                        table: def.name,
                    });
                }
                let info = def.into_info(TableId(next_table_id))?;
                next_table_id += 1;
                tables.insert(table_key, Arc::new(info));
            }
            databases.insert(key, DatabaseInfo { name, tables });
        }
        Ok(InfoSchema {
            version: self.version,
            databases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InfoSchema {
        InfoSchema::builder(3)
            .database("Shop")
            .table(
                "shop",
                TableDef::new("Orders")
                    .column("id", ColumnType::Int)
                    .column("customer", ColumnType::String)
                    .nullable_column("note", ColumnType::String)
                    .primary_key("id")
                    .index("idx_customer", ["customer"])
                    .row_count(500),
            )
            .build()
            .expect("schema builds")
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let schema = sample();
        assert_eq!(schema.version(), 3);
        let table = schema.table("SHOP", "orders").expect("table");
        assert_eq!(table.name, "Orders");
        assert_eq!(table.column("CUSTOMER").map(|c| c.offset), Some(1));
        assert_eq!(table.handle_column().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(table.indexes[0].columns, vec![1]);
    }

    #[test]
    fn unknown_database_is_reported() {
        let err = InfoSchema::builder(1)
            .table("nope", TableDef::new("t").column("a", ColumnType::Int))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::UnknownDatabase { db: "nope".into() });
    }

    #[test]
    fn handle_must_be_int() {
        let err = InfoSchema::builder(1)
            .database("d")
            .table(
                "d",
                TableDef::new("t")
                    .column("name", ColumnType::String)
                    .primary_key("name"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::HandleNotInt { .. }));
    }

    #[test]
    fn to_builder_preserves_tables() {
        let schema = sample();
        let next = schema
            .to_builder(schema.version() + 1)
            .build()
            .expect("rebuild");
        assert_eq!(next.version(), 4);
        assert_eq!(
            next.table("shop", "orders").map(|t| t.as_ref()),
            schema.table("shop", "orders").map(|t| t.as_ref())
        );
    }
}
