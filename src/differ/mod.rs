//! Schema comparison between two DDL snapshots.
//!
//! Feeds `migrate diff` and migration generation: parse both snapshots into
//! the shared schema model, compare, and render the differences as text,
//! JSON, or a SQL migration body.

use serde::Serialize;

use crate::schema::{Column, ForeignKey, IndexDef, Schema, TableSchema};

/// Differences between two schemas
#[derive(Debug, Serialize)]
pub struct SchemaDiff {
    /// Tables that exist only in the new schema
    pub tables_added: Vec<TableInfo>,
    /// Tables that exist only in the old schema
    pub tables_removed: Vec<String>,
    /// Tables that exist in both but have differences
    pub tables_modified: Vec<TableModification>,
}

impl SchemaDiff {
    pub fn has_changes(&self) -> bool {
        !self.tables_added.is_empty()
            || !self.tables_removed.is_empty()
            || !self.tables_modified.is_empty()
    }
}

/// Basic info about an added table
#[derive(Debug, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_statement: Option<String>,
}

impl From<&TableSchema> for TableInfo {
    fn from(t: &TableSchema) -> Self {
        Self {
            name: t.name.clone(),
            columns: t.columns.iter().map(ColumnInfo::from).collect(),
            primary_key: t.primary_key.clone(),
            create_statement: t.create_statement.clone(),
        }
    }
}

/// Column info for serialization
#[derive(Debug, Serialize, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub col_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

impl From<&Column> for ColumnInfo {
    fn from(c: &Column) -> Self {
        Self {
            name: c.name.clone(),
            col_type: c.sql_type.clone(),
            is_nullable: c.is_nullable,
            is_primary_key: c.is_primary_key,
        }
    }
}

/// Modifications to an existing table
#[derive(Debug, Serialize)]
pub struct TableModification {
    pub table_name: String,
    pub columns_added: Vec<ColumnInfo>,
    pub columns_removed: Vec<ColumnInfo>,
    pub columns_modified: Vec<ColumnChange>,
    pub pk_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_pk: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_pk: Option<Vec<String>>,
    pub fks_added: Vec<FkInfo>,
    pub fks_removed: Vec<FkInfo>,
    pub indexes_added: Vec<IndexInfo>,
    pub indexes_removed: Vec<IndexInfo>,
}

impl TableModification {
    pub fn has_changes(&self) -> bool {
        !self.columns_added.is_empty()
            || !self.columns_removed.is_empty()
            || !self.columns_modified.is_empty()
            || self.pk_changed
            || !self.fks_added.is_empty()
            || !self.fks_removed.is_empty()
            || !self.indexes_added.is_empty()
            || !self.indexes_removed.is_empty()
    }
}

/// Change to a column definition
#[derive(Debug, Serialize)]
pub struct ColumnChange {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_nullable: Option<bool>,
}

/// Foreign key info for serialization
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FkInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl From<&ForeignKey> for FkInfo {
    fn from(fk: &ForeignKey) -> Self {
        Self {
            name: fk.name.clone(),
            columns: fk.column_names.clone(),
            referenced_table: fk.referenced_table.clone(),
            referenced_columns: fk.referenced_columns.clone(),
        }
    }
}

/// Index info for serialization
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
}

impl From<&IndexDef> for IndexInfo {
    fn from(idx: &IndexDef) -> Self {
        Self {
            name: idx.name.clone(),
            columns: idx.columns.clone(),
            is_unique: idx.is_unique,
            index_type: idx.index_type.clone(),
        }
    }
}

/// Compare two schemas and return the differences
pub fn compare_schemas(old_schema: &Schema, new_schema: &Schema) -> SchemaDiff {
    let mut tables_added = Vec::new();
    let mut tables_removed = Vec::new();
    let mut tables_modified = Vec::new();

    for new_table in new_schema.iter() {
        if old_schema.get_table(&new_table.name).is_none() {
            tables_added.push(TableInfo::from(new_table));
        }
    }

    for old_table in old_schema.iter() {
        match new_schema.get_table(&old_table.name) {
            None => tables_removed.push(old_table.name.clone()),
            Some(new_table) => {
                let modification = compare_tables(old_table, new_table);
                if modification.has_changes() {
                    tables_modified.push(modification);
                }
            }
        }
    }

    SchemaDiff {
        tables_added,
        tables_removed,
        tables_modified,
    }
}

fn compare_tables(old_table: &TableSchema, new_table: &TableSchema) -> TableModification {
    let mut columns_added = Vec::new();
    let mut columns_removed = Vec::new();
    let mut columns_modified = Vec::new();

    for new_col in &new_table.columns {
        match old_table.get_column(&new_col.name) {
            None => columns_added.push(ColumnInfo::from(new_col)),
            Some(old_col) => {
                let type_changed =
                    !old_col.sql_type.eq_ignore_ascii_case(&new_col.sql_type);
                let nullability_changed = old_col.is_nullable != new_col.is_nullable;
                if type_changed || nullability_changed {
                    columns_modified.push(ColumnChange {
                        name: new_col.name.clone(),
                        old_type: type_changed.then(|| old_col.sql_type.clone()),
                        new_type: type_changed.then(|| new_col.sql_type.clone()),
                        old_nullable: nullability_changed.then_some(old_col.is_nullable),
                        new_nullable: nullability_changed.then_some(new_col.is_nullable),
                    });
                }
            }
        }
    }

    for old_col in &old_table.columns {
        if new_table.get_column(&old_col.name).is_none() {
            columns_removed.push(ColumnInfo::from(old_col));
        }
    }

    let old_pk: Vec<String> = old_table.primary_key.iter().map(|c| c.to_lowercase()).collect();
    let new_pk: Vec<String> = new_table.primary_key.iter().map(|c| c.to_lowercase()).collect();
    let pk_changed = old_pk != new_pk;

    let old_fks: Vec<FkInfo> = old_table.foreign_keys.iter().map(FkInfo::from).collect();
    let new_fks: Vec<FkInfo> = new_table.foreign_keys.iter().map(FkInfo::from).collect();
    let fks_added = new_fks
        .iter()
        .filter(|fk| !old_fks.iter().any(|o| fk_equivalent(o, fk)))
        .cloned()
        .collect();
    let fks_removed = old_fks
        .iter()
        .filter(|fk| !new_fks.iter().any(|n| fk_equivalent(n, fk)))
        .cloned()
        .collect();

    let old_indexes: Vec<IndexInfo> = old_table.indexes.iter().map(IndexInfo::from).collect();
    let new_indexes: Vec<IndexInfo> = new_table.indexes.iter().map(IndexInfo::from).collect();
    let indexes_added = new_indexes
        .iter()
        .filter(|idx| !old_indexes.iter().any(|o| o.name == idx.name))
        .cloned()
        .collect();
    let indexes_removed = old_indexes
        .iter()
        .filter(|idx| !new_indexes.iter().any(|n| n.name == idx.name))
        .cloned()
        .collect();

    TableModification {
        table_name: old_table.name.clone(),
        columns_added,
        columns_removed,
        columns_modified,
        pk_changed,
        old_pk: pk_changed.then_some(old_table.primary_key.clone()),
        new_pk: pk_changed.then_some(new_table.primary_key.clone()),
        fks_added,
        fks_removed,
        indexes_added,
        indexes_removed,
    }
}

/// FKs match when they cover the same columns against the same target.
fn fk_equivalent(a: &FkInfo, b: &FkInfo) -> bool {
    a.columns == b.columns
        && a.referenced_table.eq_ignore_ascii_case(&b.referenced_table)
        && a.referenced_columns == b.referenced_columns
}

/// Render a diff as a SQL migration body (forward direction).
pub fn render_sql(diff: &SchemaDiff) -> String {
    let mut out = String::new();

    for table in &diff.tables_added {
        if let Some(stmt) = &table.create_statement {
            out.push_str(stmt.trim_end());
            out.push_str(";\n\n");
        } else {
            out.push_str(&format!("-- TODO: CREATE TABLE {}\n\n", table.name));
        }
    }

    for modification in &diff.tables_modified {
        for col in &modification.columns_added {
            let nullability = if col.is_nullable { "" } else { " NOT NULL" };
            out.push_str(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}{};\n",
                modification.table_name, col.name, col.col_type, nullability
            ));
        }
        for col in &modification.columns_removed {
            out.push_str(&format!(
                "ALTER TABLE {} DROP COLUMN {};\n",
                modification.table_name, col.name
            ));
        }
        for change in &modification.columns_modified {
            if let Some(new_type) = &change.new_type {
                out.push_str(&format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {};\n",
                    modification.table_name, change.name, new_type
                ));
            }
            if let Some(new_nullable) = change.new_nullable {
                let action = if new_nullable { "DROP" } else { "SET" };
                out.push_str(&format!(
                    "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL;\n",
                    modification.table_name, change.name, action
                ));
            }
        }
        for fk in &modification.fks_added {
            let name_clause = fk
                .name
                .as_ref()
                .map(|n| format!("CONSTRAINT {} ", n))
                .unwrap_or_default();
            out.push_str(&format!(
                "ALTER TABLE {} ADD {}FOREIGN KEY ({}) REFERENCES {} ({});\n",
                modification.table_name,
                name_clause,
                fk.columns.join(", "),
                fk.referenced_table,
                fk.referenced_columns.join(", ")
            ));
        }
        for fk in &modification.fks_removed {
            if let Some(name) = &fk.name {
                out.push_str(&format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};\n",
                    modification.table_name, name
                ));
            }
        }
        for idx in &modification.indexes_added {
            let unique = if idx.is_unique { "UNIQUE " } else { "" };
            out.push_str(&format!(
                "CREATE {}INDEX {} ON {} ({});\n",
                unique,
                idx.name,
                modification.table_name,
                idx.columns.join(", ")
            ));
        }
        for idx in &modification.indexes_removed {
            out.push_str(&format!("DROP INDEX {};\n", idx.name));
        }
        if modification.has_changes() {
            out.push('\n');
        }
    }

    for table in &diff.tables_removed {
        out.push_str(&format!("DROP TABLE {};\n", table));
    }

    out.trim_end().to_string()
}

/// Render a diff as human-readable text.
pub fn render_text(diff: &SchemaDiff) -> String {
    let mut out = String::new();

    if !diff.has_changes() {
        return "No schema changes detected.".to_string();
    }

    for table in &diff.tables_added {
        out.push_str(&format!("+ table {} ({} columns)\n", table.name, table.columns.len()));
    }
    for table in &diff.tables_removed {
        out.push_str(&format!("- table {}\n", table));
    }
    for m in &diff.tables_modified {
        out.push_str(&format!("~ table {}\n", m.table_name));
        for col in &m.columns_added {
            out.push_str(&format!("  + column {} {}\n", col.name, col.col_type));
        }
        for col in &m.columns_removed {
            out.push_str(&format!("  - column {}\n", col.name));
        }
        for change in &m.columns_modified {
            if let (Some(old), Some(new)) = (&change.old_type, &change.new_type) {
                out.push_str(&format!("  ~ column {}: {} -> {}\n", change.name, old, new));
            }
            if let (Some(old), Some(new)) = (change.old_nullable, change.new_nullable) {
                out.push_str(&format!(
                    "  ~ column {}: nullable {} -> {}\n",
                    change.name, old, new
                ));
            }
        }
        for fk in &m.fks_added {
            out.push_str(&format!(
                "  + fk ({}) -> {}\n",
                fk.columns.join(", "),
                fk.referenced_table
            ));
        }
        for idx in &m.indexes_added {
            out.push_str(&format!("  + index {}\n", idx.name));
        }
        for idx in &m.indexes_removed {
            out.push_str(&format!("  - index {}\n", idx.name));
        }
    }

    out.trim_end().to_string()
}
