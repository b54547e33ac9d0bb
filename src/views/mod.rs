//! View dependency management for ALTER COLUMN TYPE migrations.
//!
//! PostgreSQL refuses ALTER COLUMN TYPE while views depend on the column.
//! The manager discovers all dependent views (including views-on-views)
//! through pg_depend/pg_rewrite, saves their definitions, indexes, and
//! comments, drops them deepest-first, and recreates them shallowest-first
//! after the ALTER statements ran. SQL helper functions installable into a
//! `confiture` schema give `.up.sql` migrations the same workflow.

use tracing::{debug, info};

use crate::error::ConfitureError;
use crate::migrate::Db;

/// Recursive walk from base tables (r/p) to dependent views (v/m).
const DISCOVER_VIEWS_SQL: &str = r#"
WITH RECURSIVE
base_tables AS (
    SELECT c.oid
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = ANY($1)
      AND c.relkind IN ('r', 'p')
),
view_deps AS (
    SELECT DISTINCT
        dep_view.oid,
        dep_ns.nspname  AS schema,
        dep_view.relname AS name,
        dep_view.relkind::text AS kind,
        0 AS depth
    FROM pg_depend d
    JOIN pg_rewrite rw ON d.objid = rw.oid
    JOIN pg_class dep_view ON rw.ev_class = dep_view.oid
    JOIN pg_namespace dep_ns ON dep_view.relnamespace = dep_ns.oid
    WHERE d.refobjid IN (SELECT oid FROM base_tables)
      AND dep_view.relkind IN ('v', 'm')
      AND d.deptype = 'n'
      AND dep_view.oid != d.refobjid

    UNION

    SELECT DISTINCT
        dep_view.oid,
        dep_ns.nspname,
        dep_view.relname,
        dep_view.relkind::text,
        vd.depth + 1
    FROM view_deps vd
    JOIN pg_depend d ON d.refobjid = vd.oid
    JOIN pg_rewrite rw ON d.objid = rw.oid
    JOIN pg_class dep_view ON rw.ev_class = dep_view.oid
    JOIN pg_namespace dep_ns ON dep_view.relnamespace = dep_ns.oid
    WHERE dep_view.relkind IN ('v', 'm')
      AND dep_view.oid != vd.oid
      AND d.deptype = 'n'
)
SELECT DISTINCT ON (oid) oid, schema, name, kind, depth
FROM view_deps
ORDER BY oid, depth DESC
"#;

const MATVIEW_INDEXES_SQL: &str = r#"
SELECT indexname, indexdef
FROM pg_indexes
WHERE schemaname = $1 AND tablename = $2
ORDER BY indexname
"#;

const VIEW_COMMENT_SQL: &str = r#"
SELECT obj_description(c.oid)
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2
"#;

/// SQL helper functions mirroring the in-process workflow, for use from
/// `.up.sql` migrations.
const VIEW_HELPERS_SQL: &str = r#"
CREATE SCHEMA IF NOT EXISTS confiture;

CREATE TABLE IF NOT EXISTS confiture.saved_views (
    oid BIGINT,
    schema_name TEXT NOT NULL,
    view_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    depth INTEGER NOT NULL,
    definition TEXT NOT NULL,
    index_defs TEXT[] NOT NULL DEFAULT '{}',
    view_comment TEXT,
    saved_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE OR REPLACE FUNCTION confiture.save_and_drop_dependent_views(p_schemas TEXT[])
RETURNS INTEGER AS $confiture$
DECLARE
    v RECORD;
    dropped INTEGER := 0;
BEGIN
    DELETE FROM confiture.saved_views;

    INSERT INTO confiture.saved_views
        (oid, schema_name, view_name, kind, depth, definition, index_defs, view_comment)
    SELECT
        deps.oid,
        deps.schema,
        deps.name,
        deps.kind,
        deps.depth,
        pg_get_viewdef(deps.oid, true),
        COALESCE(
            (SELECT array_agg(pi.indexdef ORDER BY pi.indexname)
             FROM pg_indexes pi
             WHERE pi.schemaname = deps.schema AND pi.tablename = deps.name),
            '{}'
        ),
        obj_description(deps.oid)
    FROM (
        WITH RECURSIVE
        base_tables AS (
            SELECT c.oid
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = ANY(p_schemas)
              AND c.relkind IN ('r', 'p')
        ),
        view_deps AS (
            SELECT DISTINCT dep_view.oid, dep_ns.nspname AS schema,
                   dep_view.relname AS name, dep_view.relkind::text AS kind, 0 AS depth
            FROM pg_depend d
            JOIN pg_rewrite rw ON d.objid = rw.oid
            JOIN pg_class dep_view ON rw.ev_class = dep_view.oid
            JOIN pg_namespace dep_ns ON dep_view.relnamespace = dep_ns.oid
            WHERE d.refobjid IN (SELECT oid FROM base_tables)
              AND dep_view.relkind IN ('v', 'm')
              AND d.deptype = 'n'
              AND dep_view.oid != d.refobjid
            UNION
            SELECT DISTINCT dep_view.oid, dep_ns.nspname, dep_view.relname,
                   dep_view.relkind::text, vd.depth + 1
            FROM view_deps vd
            JOIN pg_depend d ON d.refobjid = vd.oid
            JOIN pg_rewrite rw ON d.objid = rw.oid
            JOIN pg_class dep_view ON rw.ev_class = dep_view.oid
            JOIN pg_namespace dep_ns ON dep_view.relnamespace = dep_ns.oid
            WHERE dep_view.relkind IN ('v', 'm')
              AND dep_view.oid != vd.oid
              AND d.deptype = 'n'
        )
        SELECT DISTINCT ON (oid) oid, schema, name, kind, depth
        FROM view_deps
        ORDER BY oid, depth DESC
    ) deps;

    FOR v IN
        SELECT schema_name, view_name, kind
        FROM confiture.saved_views
        ORDER BY depth DESC, schema_name, view_name
    LOOP
        IF v.kind = 'm' THEN
            EXECUTE format('DROP MATERIALIZED VIEW IF EXISTS %I.%I CASCADE',
                           v.schema_name, v.view_name);
        ELSE
            EXECUTE format('DROP VIEW IF EXISTS %I.%I CASCADE',
                           v.schema_name, v.view_name);
        END IF;
        dropped := dropped + 1;
    END LOOP;

    RETURN dropped;
END;
$confiture$ LANGUAGE plpgsql;

CREATE OR REPLACE FUNCTION confiture.recreate_saved_views()
RETURNS INTEGER AS $confiture$
DECLARE
    v RECORD;
    idx TEXT;
    recreated INTEGER := 0;
BEGIN
    FOR v IN
        SELECT *
        FROM confiture.saved_views
        ORDER BY depth ASC, schema_name, view_name
    LOOP
        IF v.kind = 'm' THEN
            EXECUTE format('CREATE MATERIALIZED VIEW %I.%I AS %s WITH NO DATA',
                           v.schema_name, v.view_name,
                           rtrim(rtrim(v.definition), ';'));
            EXECUTE format('REFRESH MATERIALIZED VIEW %I.%I', v.schema_name, v.view_name);
        ELSE
            EXECUTE format('CREATE VIEW %I.%I AS %s',
                           v.schema_name, v.view_name,
                           rtrim(rtrim(v.definition), ';'));
        END IF;

        FOREACH idx IN ARRAY v.index_defs LOOP
            EXECUTE idx;
        END LOOP;

        IF v.view_comment IS NOT NULL THEN
            IF v.kind = 'm' THEN
                EXECUTE format('COMMENT ON MATERIALIZED VIEW %I.%I IS %L',
                               v.schema_name, v.view_name, v.view_comment);
            ELSE
                EXECUTE format('COMMENT ON VIEW %I.%I IS %L',
                               v.schema_name, v.view_name, v.view_comment);
            END IF;
        END IF;

        recreated := recreated + 1;
    END LOOP;

    DELETE FROM confiture.saved_views;
    RETURN recreated;
END;
$confiture$ LANGUAGE plpgsql;
"#;

/// A saved index definition for a materialized view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedViewIndex {
    pub name: String,
    /// Full CREATE INDEX DDL
    pub definition: String,
}

/// A saved view definition with everything needed to recreate it.
#[derive(Debug, Clone)]
pub struct SavedView {
    pub oid: u32,
    pub schema: String,
    pub name: String,
    /// 'v' = regular view, 'm' = materialized view
    pub kind: String,
    /// Distance from a base table in the dependency DAG
    pub depth: i32,
    /// View body from pg_get_viewdef
    pub definition: String,
    pub indexes: Vec<SavedViewIndex>,
    pub comment: Option<String>,
}

impl SavedView {
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }

    pub fn is_materialized(&self) -> bool {
        self.kind == "m"
    }
}

/// Manages view lifecycle around ALTER COLUMN TYPE.
///
/// Saved state lives in this instance between `save_and_drop_dependent_views`
/// and `recreate_saved_views`; cycles are impossible because PostgreSQL
/// forbids circular view dependencies.
pub struct ViewManager<'a> {
    db: &'a mut Db,
    saved_views: Vec<SavedView>,
}

impl<'a> ViewManager<'a> {
    pub fn new(db: &'a mut Db) -> Self {
        Self {
            db,
            saved_views: Vec::new(),
        }
    }

    /// Install the SQL helper functions. Idempotent.
    pub fn install_helpers(&mut self) -> Result<(), ConfitureError> {
        self.db.execute(VIEW_HELPERS_SQL)?;
        info!("installed confiture view helper functions");
        Ok(())
    }

    /// Are both helper functions present?
    pub fn helpers_installed(&mut self) -> Result<bool, ConfitureError> {
        let row = self.db.query_one(
            "SELECT COUNT(*) FROM pg_proc p
             JOIN pg_namespace n ON n.oid = p.pronamespace
             WHERE n.nspname = 'confiture'
               AND p.proname IN ('save_and_drop_dependent_views', 'recreate_saved_views')",
            &[],
        )?;
        let count: i64 = row.get(0);
        Ok(count >= 2)
    }

    /// Discover all views depending on tables in the given schemas,
    /// deepest-first (drop order), with definitions, indexes, and comments.
    pub fn discover_dependent_views(
        &mut self,
        schemas: Option<&[String]>,
    ) -> Result<Vec<SavedView>, ConfitureError> {
        let schemas = match schemas {
            Some(schemas) => schemas.to_vec(),
            None => self.user_schemas()?,
        };

        let rows = self.db.query(DISCOVER_VIEWS_SQL, &[&schemas])?;

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let oid: postgres::types::Oid = row.get(0);
            let schema: String = row.get(1);
            let name: String = row.get(2);
            let kind: String = row.get(3);
            let depth: i32 = row.get(4);

            let definition: String = self
                .db
                .query_one("SELECT pg_get_viewdef($1, true)", &[&oid])?
                .get(0);

            let indexes = if kind == "m" {
                self.db
                    .query(MATVIEW_INDEXES_SQL, &[&schema, &name])?
                    .iter()
                    .map(|r| SavedViewIndex {
                        name: r.get(0),
                        definition: r.get(1),
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let comment: Option<String> = self
                .db
                .query_one(VIEW_COMMENT_SQL, &[&schema, &name])?
                .get(0);

            views.push(SavedView {
                oid,
                schema,
                name,
                kind,
                depth,
                definition,
                indexes,
                comment,
            });
        }

        // Deepest first = drop order
        views.sort_by(|a, b| {
            b.depth
                .cmp(&a.depth)
                .then_with(|| a.schema.cmp(&b.schema))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(views)
    }

    /// Save definitions of all dependent views, then drop them
    /// deepest-first. Returns the number dropped.
    pub fn save_and_drop_dependent_views(
        &mut self,
        schemas: Option<&[String]>,
    ) -> Result<usize, ConfitureError> {
        self.saved_views = self.discover_dependent_views(schemas)?;

        if self.saved_views.is_empty() {
            info!("no dependent views found, nothing to drop");
            return Ok(0);
        }

        info!(
            count = self.saved_views.len(),
            "saving and dropping dependent views"
        );

        for view in &self.saved_views {
            let statement = if view.is_materialized() {
                format!("DROP MATERIALIZED VIEW IF EXISTS {} CASCADE", view.qualified())
            } else {
                format!("DROP VIEW IF EXISTS {} CASCADE", view.qualified())
            };
            self.db.execute(&statement)?;
            debug!(view = %view.qualified(), "dropped");
        }

        Ok(self.saved_views.len())
    }

    /// Recreate saved views shallowest-first, restoring indexes and
    /// comments. Returns the number recreated and clears the saved state.
    pub fn recreate_saved_views(&mut self) -> Result<usize, ConfitureError> {
        if self.saved_views.is_empty() {
            info!("no saved views to recreate");
            return Ok(0);
        }

        let mut ordered = self.saved_views.clone();
        ordered.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.schema.cmp(&b.schema))
                .then_with(|| a.name.cmp(&b.name))
        });

        for view in &ordered {
            let qualified = view.qualified();
            let definition = view.definition.trim_end().trim_end_matches(';');

            if view.is_materialized() {
                self.db.execute(&format!(
                    "CREATE MATERIALIZED VIEW {} AS {} WITH NO DATA",
                    qualified, definition
                ))?;
                self.db
                    .execute(&format!("REFRESH MATERIALIZED VIEW {}", qualified))?;
            } else {
                self.db
                    .execute(&format!("CREATE VIEW {} AS {}", qualified, definition))?;
            }
            debug!(view = %qualified, "recreated");

            for index in &view.indexes {
                self.db.execute(&index.definition)?;
                debug!(index = %index.name, "recreated index");
            }

            if let Some(comment) = &view.comment {
                let label = if view.is_materialized() {
                    "MATERIALIZED VIEW"
                } else {
                    "VIEW"
                };
                // COMMENT ON is DDL and cannot take bound parameters, so
                // single quotes are doubled into a literal.
                let escaped = comment.replace('\'', "''");
                self.db.execute(&format!(
                    "COMMENT ON {} {} IS '{}'",
                    label, qualified, escaped
                ))?;
            }
        }

        let count = self.saved_views.len();
        self.saved_views.clear();
        Ok(count)
    }

    /// Currently saved views (for inspection).
    pub fn saved_views(&self) -> &[SavedView] {
        &self.saved_views
    }

    fn user_schemas(&mut self) -> Result<Vec<String>, ConfitureError> {
        let rows = self.db.query(
            "SELECT nspname FROM pg_namespace
             WHERE nspname NOT LIKE 'pg\\_%'
               AND nspname <> 'information_schema'
             ORDER BY nspname",
            &[],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}
