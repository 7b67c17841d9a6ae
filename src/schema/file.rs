use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ColumnType, InfoSchema, SchemaError, TableDef};

/// TOML description of a schema snapshot.
///
/// ```toml
/// version = 1
///
/// [[databases]]
/// name = "shop"
///
/// [[databases.tables]]
/// name = "orders"
/// primary_key = "id"
/// row_count = 1000
/// columns = [{ name = "id", type = "int" }, { name = "customer", type = "string" }]
/// indexes = [{ name = "idx_customer", columns = ["customer"] }]
/// ```
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SchemaFile {
    /// Version assigned to the resulting snapshot.
    #[serde(default)]
    pub version: i64,
    /// Declared databases.
    #[serde(default)]
    pub databases: Vec<RawDatabase>,
}

/// Database section of a [`SchemaFile`].
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawDatabase {
    /// Database name.
    pub name: String,
    /// Tables in declaration order.
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

/// Table section of a [`SchemaFile`].
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawTable {
    /// Table name.
    pub name: String,
    /// Columns in row order.
    pub columns: Vec<RawColumn>,
    /// Integer primary-key column.
    #[serde(default)]
    pub primary_key: Option<String>,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<RawIndex>,
    /// Estimated row count.
    #[serde(default)]
    pub row_count: u64,
}

/// Column entry of a [`RawTable`].
#[derive(Debug, Deserialize, Serialize)]
pub struct RawColumn {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Whether nulls are allowed.
    #[serde(default)]
    pub nullable: bool,
}

/// Index entry of a [`RawTable`].
#[derive(Debug, Deserialize, Serialize)]
pub struct RawIndex {
    /// Index name.
    pub name: String,
    /// Indexed columns in key order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
}

/// Errors raised while loading a [`SchemaFile`].
#[derive(Debug, Error)]
pub enum SchemaFileError {
    #[error("failed to read schema file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse schema file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl SchemaFile {
    /// Reads and parses a schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaFileError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SchemaFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| SchemaFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Converts the file contents into a snapshot.
    pub fn into_info_schema(self) -> Result<InfoSchema, SchemaFileError> {
        let mut builder = InfoSchema::builder(self.version);
        for db in self.databases {
            builder = builder.database(db.name.clone());
            for table in db.tables {
                builder = builder.table(db.name.clone(), convert_table(table));
            }
        }
        Ok(builder.build()?)
    }
}

fn convert_table(raw: RawTable) -> TableDef {
    let mut def = TableDef::new(raw.name).row_count(raw.row_count);
    for col in raw.columns {
        def = if col.nullable {
            def.nullable_column(col.name, col.ty)
        } else {
            def.column(col.name, col.ty)
        };
    }
    if let Some(pk) = raw.primary_key {
        def = def.primary_key(pk);
    }
    for idx in raw.indexes {
        def = if idx.unique {
            def.unique_index(idx.name, idx.columns)
        } else {
            def.index(idx.name, idx.columns)
        };
    }
    def
}
