//! Schema model shared by the differ, linter, and introspector.
//!
//! This module provides:
//! - Data models for table schemas, columns, foreign keys, and indexes
//! - PostgreSQL DDL parsing for extracting schema information
//! - Statement splitting that respects string literals and comments

mod ddl;

pub use ddl::*;

use ahash::AHashMap;
use std::fmt;

/// Unique identifier for a table within a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Unique identifier for a column within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId(pub u16);

/// PostgreSQL column type classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    Text,
    Uuid,
    Decimal,
    DateTime,
    Bool,
    Json,
    Other(String),
}

impl ColumnType {
    /// Parse a SQL type string into a ColumnType
    pub fn from_sql_type(type_str: &str) -> Self {
        let type_lower = type_str.to_lowercase();
        let base_type = type_lower.split('(').next().unwrap_or(&type_lower).trim();

        match base_type {
            "int" | "integer" | "smallint" | "int4" | "int2" | "serial" | "smallserial" => {
                ColumnType::Int
            }
            "bigint" | "int8" | "bigserial" => ColumnType::BigInt,
            "char" | "varchar" | "text" | "character" | "citext" => ColumnType::Text,
            "decimal" | "numeric" | "float" | "double" | "real" | "float4" | "float8" | "money" => {
                ColumnType::Decimal
            }
            "date" | "timestamp" | "timestamptz" | "time" | "timetz" | "interval" => {
                ColumnType::DateTime
            }
            "bool" | "boolean" => ColumnType::Bool,
            "json" | "jsonb" => ColumnType::Json,
            "uuid" => ColumnType::Uuid,
            _ => ColumnType::Other(type_str.to_string()),
        }
    }

    /// True for types that can hold free-form text (used by the security rule).
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::Decimal => write!(f, "NUMERIC"),
            ColumnType::DateTime => write!(f, "TIMESTAMPTZ"),
            ColumnType::Bool => write!(f, "BOOLEAN"),
            ColumnType::Json => write!(f, "JSONB"),
            ColumnType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Column definition within a table
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
    /// Original SQL type text (e.g. `VARCHAR(255)`)
    pub sql_type: String,
    /// Position in table (0-indexed)
    pub ordinal: ColumnId,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_foreign_key: bool,
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// Index method (BTREE, GIN, ...)
    pub index_type: Option<String>,
}

/// Foreign key constraint definition
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub column_names: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// Composite UNIQUE constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Complete table schema definition
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    /// Schema qualifier when the DDL used one (`public.tb_users`)
    pub schema: Option<String>,
    pub id: TableId,
    pub columns: Vec<Column>,
    /// Primary key column names (ordered for composite PKs)
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDef>,
    pub unique_constraints: Vec<UniqueConstraint>,
    /// COMMENT ON TABLE text, when present
    pub comment: Option<String>,
    /// Raw CREATE TABLE statement
    pub create_statement: Option<String>,
}

impl TableSchema {
    pub fn new(name: String, id: TableId) -> Self {
        Self {
            name,
            schema: None,
            id,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            unique_constraints: Vec::new(),
            comment: None,
            create_statement: None,
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// True if `column` is the first column of some index.
    pub fn has_leading_index_on(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|idx| idx.columns.first().map(|c| c.eq_ignore_ascii_case(column)) == Some(true))
            || self
                .primary_key
                .first()
                .map(|c| c.eq_ignore_ascii_case(column))
                == Some(true)
    }

    /// True if `column` alone is unique (single-column UNIQUE, PK, or unique index).
    pub fn is_column_unique(&self, column: &str) -> bool {
        if let Some(col) = self.get_column(column) {
            if col.is_unique || col.is_primary_key {
                return true;
            }
        }
        if self.primary_key.len() == 1 && self.primary_key[0].eq_ignore_ascii_case(column) {
            return true;
        }
        self.indexes.iter().any(|idx| {
            idx.is_unique && idx.columns.len() == 1 && idx.columns[0].eq_ignore_ascii_case(column)
        }) || self
            .unique_constraints
            .iter()
            .any(|uc| uc.columns.len() == 1 && uc.columns[0].eq_ignore_ascii_case(column))
    }
}

/// A collection of table schemas with name-based lookup
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: Vec<TableSchema>,
    by_name: AHashMap<String, TableId>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, mut table: TableSchema) -> TableId {
        let id = TableId(self.tables.len() as u32);
        table.id = id;
        self.by_name.insert(table.name.to_lowercase(), id);
        self.tables.push(table);
        id
    }

    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|id| &self.tables[id.0 as usize])
    }

    pub fn get_table_id(&self, name: &str) -> Option<TableId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut TableSchema> {
        self.tables.get_mut(id.0 as usize)
    }

    pub fn table_mut_by_name(&mut self, name: &str) -> Option<&mut TableSchema> {
        let id = self.get_table_id(name)?;
        self.tables.get_mut(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Mark every FK column on every table after parsing completes.
    pub fn mark_foreign_key_columns(&mut self) {
        for table in &mut self.tables {
            let fk_cols: Vec<String> = table
                .foreign_keys
                .iter()
                .flat_map(|fk| fk.column_names.iter().cloned())
                .collect();
            for name in fk_cols {
                if let Some(col) = table.get_column_mut(&name) {
                    col.is_foreign_key = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_classification() {
        assert_eq!(ColumnType::from_sql_type("BIGINT"), ColumnType::BigInt);
        assert_eq!(ColumnType::from_sql_type("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_type("uuid"), ColumnType::Uuid);
        assert_eq!(ColumnType::from_sql_type("TIMESTAMPTZ"), ColumnType::DateTime);
        assert_eq!(ColumnType::from_sql_type("jsonb"), ColumnType::Json);
        assert_eq!(
            ColumnType::from_sql_type("tsvector"),
            ColumnType::Other("tsvector".to_string())
        );
    }

    #[test]
    fn test_schema_lookup_case_insensitive() {
        let mut schema = Schema::new();
        schema.add_table(TableSchema::new("tb_users".to_string(), TableId(0)));
        assert!(schema.get_table("TB_USERS").is_some());
        assert!(schema.get_table("tb_orders").is_none());
    }

    #[test]
    fn test_leading_index_detection() {
        let mut table = TableSchema::new("tb_orders".to_string(), TableId(0));
        table.indexes.push(IndexDef {
            name: "idx_orders_customer".to_string(),
            columns: vec!["fk_customer".to_string(), "created_at".to_string()],
            is_unique: false,
            index_type: None,
        });
        assert!(table.has_leading_index_on("fk_customer"));
        assert!(!table.has_leading_index_on("created_at"));
    }
}
