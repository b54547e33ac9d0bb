//! Schema linting over the parsed schema model.
//!
//! Six built-in rules:
//! - NamingConventionRule: snake_case on tables and columns
//! - PrimaryKeyRule: every table needs a PRIMARY KEY
//! - DocumentationRule: every table needs a COMMENT
//! - MultiTenantRule: tenant-shaped tables need the tenant column
//! - MissingIndexRule: FK columns should lead an index
//! - SecurityRule: password/token/secret/key columns flagged

use std::collections::BTreeMap;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::schema::{Schema, TableSchema};

/// Violation severity, ordered by weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LintSeverity::Info => write!(f, "INFO"),
            LintSeverity::Warning => write!(f, "WARNING"),
            LintSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single rule violation.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub rule_name: &'static str,
    pub severity: LintSeverity,
    pub message: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

/// Per-rule configuration values.
pub type RuleConfig = BTreeMap<String, String>;

/// Linter configuration: enabled rules and their settings.
#[derive(Debug, Clone)]
pub struct LintConfig {
    /// rule key → rule-specific config
    pub rules: BTreeMap<String, RuleConfig>,
    pub exclude_tables: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        for key in [
            "naming_convention",
            "primary_key",
            "documentation",
            "multi_tenant",
            "missing_index",
            "security",
        ] {
            rules.insert(key.to_string(), RuleConfig::new());
        }
        Self {
            rules,
            exclude_tables: Vec::new(),
        }
    }
}

impl LintConfig {
    /// Enable only the given rules.
    pub fn with_rules(rule_keys: &[&str]) -> Self {
        let mut rules = BTreeMap::new();
        for key in rule_keys {
            rules.insert(key.to_string(), RuleConfig::new());
        }
        Self {
            rules,
            exclude_tables: Vec::new(),
        }
    }
}

/// Aggregated linting report.
#[derive(Debug, Serialize)]
pub struct LintReport {
    pub violations: Vec<Violation>,
    pub schema_name: String,
    pub tables_checked: usize,
    pub columns_checked: usize,
    pub errors_count: usize,
    pub warnings_count: usize,
    pub info_count: usize,
    pub execution_time_ms: u64,
}

impl LintReport {
    pub fn has_errors(&self) -> bool {
        self.errors_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings_count > 0
    }
}

/// A schema linting rule.
pub trait LintRule {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn lint(&self, tables: &[&TableSchema], config: &RuleConfig) -> Vec<Violation>;
}

static SNAKE_CASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
static CAMEL_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
static LOWER_UPPER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

/// Convert CamelCase/PascalCase to snake_case.
fn to_snake_case(name: &str) -> String {
    let step1 = CAMEL_BOUNDARY_RE.replace_all(name, "${1}_${2}");
    LOWER_UPPER_RE.replace_all(&step1, "${1}_${2}").to_lowercase()
}

/// Enforce snake_case naming for tables and columns.
pub struct NamingConventionRule;

impl LintRule for NamingConventionRule {
    fn name(&self) -> &'static str {
        "NamingConventionRule"
    }

    fn description(&self) -> &'static str {
        "Enforces snake_case naming for tables and columns"
    }

    fn lint(&self, tables: &[&TableSchema], _config: &RuleConfig) -> Vec<Violation> {
        let mut violations = Vec::new();
        for table in tables {
            if !SNAKE_CASE_RE.is_match(&table.name) {
                violations.push(Violation {
                    rule_name: self.name(),
                    severity: LintSeverity::Error,
                    message: format!("Table '{}' should use snake_case", table.name),
                    location: format!("Table: {}", table.name),
                    suggested_fix: Some(to_snake_case(&table.name)),
                });
            }
            for column in &table.columns {
                if !SNAKE_CASE_RE.is_match(&column.name) {
                    violations.push(Violation {
                        rule_name: self.name(),
                        severity: LintSeverity::Error,
                        message: format!("Column '{}' should use snake_case", column.name),
                        location: format!("{}.{}", table.name, column.name),
                        suggested_fix: Some(to_snake_case(&column.name)),
                    });
                }
            }
        }
        violations
    }
}

/// Require a PRIMARY KEY on every non-system table.
pub struct PrimaryKeyRule;

impl LintRule for PrimaryKeyRule {
    fn name(&self) -> &'static str {
        "PrimaryKeyRule"
    }

    fn description(&self) -> &'static str {
        "Ensures all tables have a PRIMARY KEY"
    }

    fn lint(&self, tables: &[&TableSchema], _config: &RuleConfig) -> Vec<Violation> {
        let mut violations = Vec::new();
        for table in tables {
            if table.name.starts_with("pg_") {
                continue;
            }
            if !table.has_primary_key() {
                violations.push(Violation {
                    rule_name: self.name(),
                    severity: LintSeverity::Error,
                    message: format!("Table '{}' missing PRIMARY KEY", table.name),
                    location: format!("Table: {}", table.name),
                    suggested_fix: Some("Add PRIMARY KEY constraint".to_string()),
                });
            }
        }
        violations
    }
}

/// Require a COMMENT on every non-system table.
pub struct DocumentationRule;

impl LintRule for DocumentationRule {
    fn name(&self) -> &'static str {
        "DocumentationRule"
    }

    fn description(&self) -> &'static str {
        "Requires COMMENT on all tables"
    }

    fn lint(&self, tables: &[&TableSchema], _config: &RuleConfig) -> Vec<Violation> {
        let mut violations = Vec::new();
        for table in tables {
            if table.name.starts_with("pg_") {
                continue;
            }
            let documented = table
                .comment
                .as_ref()
                .map(|c| !c.trim().is_empty())
                .unwrap_or(false);
            if !documented {
                violations.push(Violation {
                    rule_name: self.name(),
                    severity: LintSeverity::Warning,
                    message: format!("Table '{}' missing documentation", table.name),
                    location: format!("Table: {}", table.name),
                    suggested_fix: Some(format!(
                        "Add: COMMENT ON TABLE {} IS 'Description...'",
                        table.name
                    )),
                });
            }
        }
        violations
    }
}

const MULTI_TENANT_PATTERNS: &[&str] = &[
    "customer",
    "tenant",
    "organization",
    "account",
    "workspace",
    "company",
];

/// Enforce the tenant column on multi-tenant-shaped tables.
pub struct MultiTenantRule;

impl LintRule for MultiTenantRule {
    fn name(&self) -> &'static str {
        "MultiTenantRule"
    }

    fn description(&self) -> &'static str {
        "Enforces tenant_id in multi-tenant tables"
    }

    fn lint(&self, tables: &[&TableSchema], config: &RuleConfig) -> Vec<Violation> {
        let identifier = config
            .get("identifier")
            .map(String::as_str)
            .unwrap_or("tenant_id");
        let mut violations = Vec::new();

        for table in tables {
            let lower = table.name.to_lowercase();
            let is_multi_tenant = MULTI_TENANT_PATTERNS.iter().any(|p| lower.contains(p));
            if !is_multi_tenant {
                continue;
            }
            let has_identifier = table.columns.iter().any(|c| c.name == identifier);
            if !has_identifier {
                violations.push(Violation {
                    rule_name: self.name(),
                    severity: LintSeverity::Error,
                    message: format!(
                        "Multi-tenant table '{}' missing '{}'",
                        table.name, identifier
                    ),
                    location: format!("Table: {}", table.name),
                    suggested_fix: Some(format!(
                        "Add column: {} UUID REFERENCES tenants(id)",
                        identifier
                    )),
                });
            }
        }
        violations
    }
}

/// Warn about FK columns without a leading index.
pub struct MissingIndexRule;

impl LintRule for MissingIndexRule {
    fn name(&self) -> &'static str {
        "MissingIndexRule"
    }

    fn description(&self) -> &'static str {
        "Detects unindexed foreign keys"
    }

    fn lint(&self, tables: &[&TableSchema], _config: &RuleConfig) -> Vec<Violation> {
        let mut violations = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !column.is_foreign_key {
                    continue;
                }
                if !table.has_leading_index_on(&column.name) {
                    violations.push(Violation {
                        rule_name: self.name(),
                        severity: LintSeverity::Warning,
                        message: format!("Foreign key '{}' should be indexed", column.name),
                        location: format!("{}.{}", table.name, column.name),
                        suggested_fix: Some(format!(
                            "Add: CREATE INDEX ON {}({})",
                            table.name, column.name
                        )),
                    });
                }
            }
        }
        violations
    }
}

/// Flag password-as-text and sensitive-data columns.
pub struct SecurityRule;

impl LintRule for SecurityRule {
    fn name(&self) -> &'static str {
        "SecurityRule"
    }

    fn description(&self) -> &'static str {
        "Checks for security best practices"
    }

    fn lint(&self, tables: &[&TableSchema], _config: &RuleConfig) -> Vec<Violation> {
        let mut violations = Vec::new();
        for table in tables {
            for column in &table.columns {
                let lower = column.name.to_lowercase();

                if lower.contains("password") && column.col_type.is_textual() {
                    violations.push(Violation {
                        rule_name: self.name(),
                        severity: LintSeverity::Warning,
                        message: format!(
                            "Column '{}' may contain passwords - should be hashed",
                            column.name
                        ),
                        location: format!("{}.{}", table.name, column.name),
                        suggested_fix: Some(
                            "Use bcrypt/argon2 hashing, never store plain passwords".to_string(),
                        ),
                    });
                }

                if ["token", "secret", "key"].iter().any(|w| lower.contains(w)) {
                    violations.push(Violation {
                        rule_name: self.name(),
                        severity: LintSeverity::Warning,
                        message: format!(
                            "Column '{}' contains sensitive data - should be encrypted",
                            column.name
                        ),
                        location: format!("{}.{}", table.name, column.name),
                        suggested_fix: Some(
                            "Use encrypted column or external secrets manager".to_string(),
                        ),
                    });
                }
            }
        }
        violations
    }
}

/// Run all configured rules over a parsed schema.
pub struct SchemaLinter {
    pub config: LintConfig,
}

impl SchemaLinter {
    pub fn new(config: LintConfig) -> Self {
        Self { config }
    }

    fn rules() -> Vec<(&'static str, Box<dyn LintRule>)> {
        vec![
            ("naming_convention", Box::new(NamingConventionRule)),
            ("primary_key", Box::new(PrimaryKeyRule)),
            ("documentation", Box::new(DocumentationRule)),
            ("multi_tenant", Box::new(MultiTenantRule)),
            ("missing_index", Box::new(MissingIndexRule)),
            ("security", Box::new(SecurityRule)),
        ]
    }

    /// Lint a parsed schema and aggregate results.
    pub fn lint(&self, schema: &Schema, schema_name: &str) -> LintReport {
        let start = Instant::now();

        let tables: Vec<&TableSchema> = schema
            .iter()
            .filter(|t| !self.config.exclude_tables.contains(&t.name))
            .collect();

        let mut violations = Vec::new();
        for (key, rule) in Self::rules() {
            let Some(rule_config) = self.config.rules.get(key) else {
                continue;
            };
            violations.extend(rule.lint(&tables, rule_config));
        }

        let errors_count = violations
            .iter()
            .filter(|v| v.severity == LintSeverity::Error)
            .count();
        let warnings_count = violations
            .iter()
            .filter(|v| v.severity == LintSeverity::Warning)
            .count();
        let info_count = violations
            .iter()
            .filter(|v| v.severity == LintSeverity::Info)
            .count();

        LintReport {
            schema_name: schema_name.to_string(),
            tables_checked: tables.len(),
            columns_checked: tables.iter().map(|t| t.columns.len()).sum(),
            errors_count,
            warnings_count,
            info_count,
            execution_time_ms: start.elapsed().as_millis() as u64,
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_sql;

    fn lint_sql(sql: &str) -> LintReport {
        let schema = parse_sql(sql);
        SchemaLinter::new(LintConfig::default()).lint(&schema, "test")
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("UserAccounts"), "user_accounts");
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
    }

    #[test]
    fn test_naming_convention_violation() {
        let report = lint_sql(
            r#"CREATE TABLE "UserAccounts" (pk_account BIGINT PRIMARY KEY);
               COMMENT ON TABLE "UserAccounts" IS 'accounts';"#,
        );
        let naming: Vec<_> = report
            .violations
            .iter()
            .filter(|v| v.rule_name == "NamingConventionRule")
            .collect();
        assert_eq!(naming.len(), 1);
        assert_eq!(naming[0].suggested_fix.as_deref(), Some("user_accounts"));
    }

    #[test]
    fn test_primary_key_rule() {
        let report = lint_sql("CREATE TABLE tb_logs (message TEXT);");
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "PrimaryKeyRule" && v.severity == LintSeverity::Error));
    }

    #[test]
    fn test_documentation_rule_warning() {
        let report = lint_sql("CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY);");
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "DocumentationRule" && v.severity == LintSeverity::Warning));
    }

    #[test]
    fn test_documented_table_passes() {
        let report = lint_sql(
            "CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY);\
             COMMENT ON TABLE tb_users IS 'All users';",
        );
        assert!(!report
            .violations
            .iter()
            .any(|v| v.rule_name == "DocumentationRule"));
    }

    #[test]
    fn test_multi_tenant_rule() {
        let report = lint_sql(
            "CREATE TABLE tb_customer_orders (pk_order BIGINT PRIMARY KEY);\
             COMMENT ON TABLE tb_customer_orders IS 'orders';",
        );
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "MultiTenantRule" && v.message.contains("tenant_id")));
    }

    #[test]
    fn test_multi_tenant_satisfied() {
        let report = lint_sql(
            "CREATE TABLE tb_customer_orders (pk_order BIGINT PRIMARY KEY, tenant_id UUID NOT NULL);\
             COMMENT ON TABLE tb_customer_orders IS 'orders';",
        );
        assert!(!report
            .violations
            .iter()
            .any(|v| v.rule_name == "MultiTenantRule"));
    }

    #[test]
    fn test_missing_index_rule() {
        let report = lint_sql(
            r#"
            CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY);
            CREATE TABLE tb_posts (
                pk_post BIGINT PRIMARY KEY,
                fk_user BIGINT NOT NULL,
                CONSTRAINT fk_posts_user FOREIGN KEY (fk_user) REFERENCES tb_users (pk_user)
            );
            "#,
        );
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "MissingIndexRule" && v.location == "tb_posts.fk_user"));
    }

    #[test]
    fn test_indexed_fk_passes() {
        let report = lint_sql(
            r#"
            CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY);
            CREATE TABLE tb_posts (
                pk_post BIGINT PRIMARY KEY,
                fk_user BIGINT NOT NULL,
                CONSTRAINT fk_posts_user FOREIGN KEY (fk_user) REFERENCES tb_users (pk_user)
            );
            CREATE INDEX idx_posts_user ON tb_posts (fk_user);
            "#,
        );
        assert!(!report
            .violations
            .iter()
            .any(|v| v.rule_name == "MissingIndexRule"));
    }

    #[test]
    fn test_security_rule_password() {
        let report = lint_sql("CREATE TABLE tb_users (pk_user BIGINT PRIMARY KEY, password TEXT);");
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "SecurityRule" && v.message.contains("hashed")));
    }

    #[test]
    fn test_security_rule_token() {
        let report =
            lint_sql("CREATE TABLE tb_sessions (pk_session BIGINT PRIMARY KEY, api_token TEXT);");
        assert!(report
            .violations
            .iter()
            .any(|v| v.rule_name == "SecurityRule" && v.message.contains("encrypted")));
    }

    #[test]
    fn test_exclude_tables() {
        let schema = parse_sql("CREATE TABLE tb_scratch (note TEXT);");
        let mut config = LintConfig::default();
        config.exclude_tables.push("tb_scratch".to_string());
        let report = SchemaLinter::new(config).lint(&schema, "test");
        assert!(report.violations.is_empty());
        assert_eq!(report.tables_checked, 0);
    }

    #[test]
    fn test_severity_counts() {
        let report = lint_sql("CREATE TABLE tb_logs (message TEXT);");
        assert_eq!(
            report.errors_count,
            report
                .violations
                .iter()
                .filter(|v| v.severity == LintSeverity::Error)
                .count()
        );
    }
}
