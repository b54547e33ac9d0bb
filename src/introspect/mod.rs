//! Live database introspection into the shared schema model.
//!
//! Reads tables, columns, primary keys, foreign keys, unique constraints,
//! indexes, and table comments from the catalogs. Feeds `introspect`,
//! `migrate diff --live`, and baseline detection.

use crate::error::ConfitureError;
use crate::migrate::Db;
use crate::schema::{
    Column, ColumnId, ColumnType, ForeignKey, IndexDef, Schema, TableId, TableSchema,
    UniqueConstraint,
};

const TABLES_SQL: &str = r#"
SELECT n.nspname, c.relname, obj_description(c.oid)
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p')
  AND n.nspname = ANY($1)
ORDER BY n.nspname, c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT column_name, data_type, is_nullable
FROM information_schema.columns
WHERE table_schema = $1 AND table_name = $2
ORDER BY ordinal_position
"#;

const PRIMARY_KEY_SQL: &str = r#"
SELECT a.attname
FROM pg_index i
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey)
WHERE n.nspname = $1 AND c.relname = $2 AND i.indisprimary
ORDER BY array_position(i.indkey, a.attnum)
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT
    con.conname,
    att.attname,
    ref_cls.relname,
    ref_att.attname
FROM pg_constraint con
JOIN pg_class cls ON cls.oid = con.conrelid
JOIN pg_namespace n ON n.oid = cls.relnamespace
JOIN unnest(con.conkey) WITH ORDINALITY AS src(attnum, ord) ON true
JOIN pg_attribute att ON att.attrelid = cls.oid AND att.attnum = src.attnum
JOIN pg_class ref_cls ON ref_cls.oid = con.confrelid
JOIN unnest(con.confkey) WITH ORDINALITY AS dst(attnum, ord) ON dst.ord = src.ord
JOIN pg_attribute ref_att ON ref_att.attrelid = ref_cls.oid AND ref_att.attnum = dst.attnum
WHERE con.contype = 'f' AND n.nspname = $1 AND cls.relname = $2
ORDER BY con.conname, src.ord
"#;

const UNIQUE_CONSTRAINTS_SQL: &str = r#"
SELECT con.conname, att.attname
FROM pg_constraint con
JOIN pg_class cls ON cls.oid = con.conrelid
JOIN pg_namespace n ON n.oid = cls.relnamespace
JOIN unnest(con.conkey) WITH ORDINALITY AS src(attnum, ord) ON true
JOIN pg_attribute att ON att.attrelid = cls.oid AND att.attnum = src.attnum
WHERE con.contype = 'u' AND n.nspname = $1 AND cls.relname = $2
ORDER BY con.conname, src.ord
"#;

const INDEXES_SQL: &str = r#"
SELECT
    ic.relname,
    i.indisunique,
    am.amname,
    a.attname
FROM pg_index i
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_class ic ON ic.oid = i.indexrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_am am ON am.oid = ic.relam
JOIN unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) ON true
JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
WHERE n.nspname = $1 AND c.relname = $2 AND NOT i.indisprimary
ORDER BY ic.relname, k.ord
"#;

/// Reads the live schema out of the catalogs.
pub struct Introspector<'a> {
    db: &'a mut Db,
}

impl<'a> Introspector<'a> {
    pub fn new(db: &'a mut Db) -> Self {
        Self { db }
    }

    /// Introspect the given schemas (default: just `public`).
    pub fn introspect(&mut self, schemas: Option<&[String]>) -> Result<Schema, ConfitureError> {
        let schemas: Vec<String> = match schemas {
            Some(schemas) => schemas.to_vec(),
            None => vec!["public".to_string()],
        };

        let mut result = Schema::new();
        let tables = self.db.query(TABLES_SQL, &[&schemas])?;

        for row in &tables {
            let schema_name: String = row.get(0);
            let table_name: String = row.get(1);
            let comment: Option<String> = row.get(2);

            let mut table = TableSchema::new(table_name.clone(), TableId(0));
            table.schema = Some(schema_name.clone());
            table.comment = comment;

            for (ordinal, column_row) in self
                .db
                .query(COLUMNS_SQL, &[&schema_name, &table_name])?
                .iter()
                .enumerate()
            {
                let name: String = column_row.get(0);
                let sql_type: String = column_row.get(1);
                let is_nullable: String = column_row.get(2);
                table.columns.push(Column {
                    col_type: ColumnType::from_sql_type(&sql_type),
                    sql_type,
                    name,
                    ordinal: ColumnId(ordinal as u16),
                    is_primary_key: false,
                    is_nullable: is_nullable == "YES",
                    is_unique: false,
                    is_foreign_key: false,
                });
            }

            let pk_columns: Vec<String> = self
                .db
                .query(PRIMARY_KEY_SQL, &[&schema_name, &table_name])?
                .iter()
                .map(|r| r.get(0))
                .collect();
            for pk_column in &pk_columns {
                if let Some(column) = table.get_column_mut(pk_column) {
                    column.is_primary_key = true;
                }
            }
            table.primary_key = pk_columns;

            for fk_row in self.db.query(FOREIGN_KEYS_SQL, &[&schema_name, &table_name])? {
                let constraint_name: String = fk_row.get(0);
                let column: String = fk_row.get(1);
                let referenced_table: String = fk_row.get(2);
                let referenced_column: String = fk_row.get(3);

                match table
                    .foreign_keys
                    .iter_mut()
                    .find(|fk| fk.name.as_deref() == Some(constraint_name.as_str()))
                {
                    Some(fk) => {
                        fk.column_names.push(column);
                        fk.referenced_columns.push(referenced_column);
                    }
                    None => table.foreign_keys.push(ForeignKey {
                        name: Some(constraint_name),
                        column_names: vec![column],
                        referenced_table,
                        referenced_columns: vec![referenced_column],
                    }),
                }
            }

            for uc_row in self
                .db
                .query(UNIQUE_CONSTRAINTS_SQL, &[&schema_name, &table_name])?
            {
                let constraint_name: String = uc_row.get(0);
                let column: String = uc_row.get(1);
                match table
                    .unique_constraints
                    .iter_mut()
                    .find(|uc| uc.name.as_deref() == Some(constraint_name.as_str()))
                {
                    Some(uc) => uc.columns.push(column),
                    None => table.unique_constraints.push(UniqueConstraint {
                        name: Some(constraint_name),
                        columns: vec![column],
                    }),
                }
            }
            let single_unique_columns: Vec<String> = table
                .unique_constraints
                .iter()
                .filter(|uc| uc.columns.len() == 1)
                .map(|uc| uc.columns[0].clone())
                .collect();
            for col_name in &single_unique_columns {
                if let Some(column) = table.get_column_mut(col_name) {
                    column.is_unique = true;
                }
            }

            for index_row in self.db.query(INDEXES_SQL, &[&schema_name, &table_name])? {
                let index_name: String = index_row.get(0);
                let is_unique: bool = index_row.get(1);
                let method: String = index_row.get(2);
                let column: String = index_row.get(3);
                match table.indexes.iter_mut().find(|idx| idx.name == index_name) {
                    Some(index) => index.columns.push(column),
                    None => table.indexes.push(IndexDef {
                        name: index_name,
                        columns: vec![column],
                        is_unique,
                        index_type: Some(method.to_uppercase()),
                    }),
                }
            }

            result.add_table(table);
        }

        result.mark_foreign_key_columns();
        Ok(result)
    }
}

/// Render an introspected schema as canonical DDL text.
///
/// Used for baseline detection: the output round-trips through
/// `normalize_schema` the same way a history snapshot does.
pub fn render_ddl(schema: &Schema) -> String {
    let mut out = String::new();
    for table in schema.iter() {
        out.push_str(&format!("CREATE TABLE {} (\n", table.name));
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                let mut line = format!("    {} {}", column.name, column.sql_type);
                if !column.is_nullable {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();
        if !table.primary_key.is_empty() {
            lines.push(format!("    PRIMARY KEY ({})", table.primary_key.join(", ")));
        }
        out.push_str(&lines.join(",\n"));
        out.push_str("\n);\n");
    }
    out
}
