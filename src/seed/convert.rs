//! INSERT → COPY conversion for seed files.
//!
//! `COPY ... FROM stdin` loads bulk rows far faster than multi-row INSERT,
//! but only pure literal-row VALUES can be rewritten safely. The
//! convertibility predicate below is a small literal-aware lexer: a false
//! positive here silently corrupts data, so anything expression-shaped
//! disqualifies the statement with a reason naming the exact disqualifier.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::schema::{split_statements, strip_leading_comments};

static SELECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").unwrap());
static CASE_WHEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCASE\s+WHEN\b").unwrap());
static CURRENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(CURRENT_TIMESTAMP|CURRENT_DATE|CURRENT_TIME|CURRENT_USER)\b").unwrap()
});
static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)INSERT\s+INTO\s+([\w.]+)\s*\("#).unwrap());
static COLUMNS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\(([\w\s,"]+)\)\s*VALUES"#).unwrap());
static ARITHMETIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\s*[+*/%]\s*\d").unwrap());
static SUBTRACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\s*-\s*\d").unwrap());

/// Parenthesised type names that are literal casts, not function calls
/// (`NULL::varchar(50)`, `'1.5'::numeric(10,2)`).
const TYPE_NAMES: &[&str] = &[
    "varchar",
    "character",
    "char",
    "numeric",
    "decimal",
    "bit",
    "float",
    "time",
    "timestamp",
    "timestamptz",
    "interval",
];

/// Outcome of converting one file or statement.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub file_path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_format: Option<String>,
    pub rows_converted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate outcome of a batch conversion.
#[derive(Debug, Serialize)]
pub struct ConversionReport {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ConversionResult>,
}

/// A parsed literal value. `None` is SQL NULL.
pub type SqlValue = Option<String>;

/// Converts INSERT statements to COPY format.
#[derive(Debug, Default)]
pub struct InsertToCopyConverter;

impl InsertToCopyConverter {
    pub fn new() -> Self {
        Self
    }

    /// Attempt to convert a seed file's content with graceful fallback.
    ///
    /// The content is split into statements first (quote- and
    /// comment-aware), so files with many INSERTs and strings containing
    /// semicolons convert whole. Every INSERT must be convertible for the
    /// file to convert; the first disqualifier fails the file with its
    /// reason. Non-INSERT statements pass through unchanged so the output
    /// stays loadable. Never panics on malformed SQL.
    pub fn try_convert(&self, sql: &str, file_path: &str) -> ConversionResult {
        let failure = |reason: String| ConversionResult {
            file_path: file_path.to_string(),
            success: false,
            copy_format: None,
            rows_converted: 0,
            reason: Some(reason),
        };

        let mut output = String::new();
        let mut rows_converted = 0;
        let mut inserts_seen = 0;

        for statement in split_statements(sql) {
            if !is_insert_like(&statement) {
                output.push_str(statement.trim());
                output.push_str(";\n");
                continue;
            }
            inserts_seen += 1;

            if let Some(reason) = self.conversion_failure_reason(&statement) {
                return failure(reason);
            }
            match self.convert(&statement) {
                Ok((copy, rows)) => {
                    output.push_str(&copy);
                    rows_converted += rows;
                }
                Err(e) => return failure(format!("Parse error: {}", e)),
            }
        }

        if inserts_seen == 0 {
            return failure("No INSERT statements found".to_string());
        }

        ConversionResult {
            file_path: file_path.to_string(),
            success: true,
            copy_format: Some(output),
            rows_converted,
            reason: None,
        }
    }

    /// Convert a batch of files, aggregating per-file results.
    pub fn convert_batch(&self, files: &BTreeMap<String, String>) -> ConversionReport {
        let results: Vec<ConversionResult> = files
            .iter()
            .map(|(path, sql)| self.try_convert(sql, path))
            .collect();
        let successful = results.iter().filter(|r| r.success).count();
        ConversionReport {
            total_files: files.len(),
            successful,
            failed: files.len() - successful,
            results,
        }
    }

    /// Can this statement be converted? (`None` means convertible.)
    pub fn can_convert(&self, insert_sql: &str) -> bool {
        self.conversion_failure_reason(insert_sql).is_none()
    }

    /// Why the statement cannot be converted, naming the exact disqualifier.
    pub fn conversion_failure_reason(&self, insert_sql: &str) -> Option<String> {
        let normalized = insert_sql.trim().to_uppercase();

        if normalized.contains("ON CONFLICT") {
            return Some("ON CONFLICT clause is not compatible with COPY format".to_string());
        }
        if normalized.contains("ON DUPLICATE") {
            return Some("ON DUPLICATE KEY clause is not compatible with COPY format".to_string());
        }
        if normalized.contains("WITH ") || normalized.contains("INSERT OR") {
            return Some("CTE or INSERT OR clause is not compatible with COPY format".to_string());
        }
        if normalized.contains("RETURNING") {
            return Some("RETURNING clause is not compatible with COPY format".to_string());
        }

        let values_clause = match extract_values_clause(insert_sql) {
            Some(clause) => clause,
            None => return Some("No VALUES clause found".to_string()),
        };

        if SELECT_RE.is_match(&values_clause) {
            return Some(
                "SELECT query in VALUES clause is not compatible with COPY format".to_string(),
            );
        }
        if CASE_WHEN_RE.is_match(&values_clause) {
            return Some(
                "CASE WHEN expression in VALUES is not compatible with COPY format".to_string(),
            );
        }
        if CURRENT_RE.is_match(&values_clause) {
            return Some(
                "SQL function (CURRENT_TIMESTAMP, CURRENT_DATE, etc.) in VALUES is not \
                 compatible with COPY format"
                    .to_string(),
            );
        }

        if let Some(func_name) = find_function_call(&values_clause) {
            return Some(format!(
                "Function call in VALUES: {}() is not compatible with COPY format",
                func_name
            ));
        }

        if has_outside_strings(&values_clause, "||") {
            return Some(
                "String concatenation (||) in VALUES is not compatible with COPY format"
                    .to_string(),
            );
        }

        let masked = mask_string_contents(&values_clause);
        if ARITHMETIC_RE.is_match(&masked) || SUBTRACTION_RE.is_match(&masked) {
            return Some(
                "Arithmetic expression in VALUES is not compatible with COPY format".to_string(),
            );
        }

        None
    }

    /// Convert an INSERT statement to COPY format.
    ///
    /// Returns the COPY text and the number of rows converted.
    pub fn convert(&self, insert_sql: &str) -> Result<(String, usize), String> {
        let normalized = normalize_whitespace(insert_sql);

        let table_name = TABLE_NAME_RE
            .captures(&normalized)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| "Could not extract table name from INSERT statement".to_string())?;

        let columns: Vec<String> = COLUMNS_RE
            .captures(&normalized)
            .and_then(|c| c.get(1))
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|c| c.trim().trim_matches('"').to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .ok_or_else(|| "Could not extract columns from INSERT statement".to_string())?;

        let values_clause = extract_values_clause(&normalized)
            .ok_or_else(|| "Could not extract values from INSERT statement".to_string())?;

        let rows: Vec<Vec<SqlValue>> = split_value_rows(&values_clause)
            .iter()
            .map(|row| parse_values(row))
            .filter(|values| values.len() == columns.len())
            .collect();

        let copy = format_copy(&table_name, &columns, &rows);
        Ok((copy, rows.len()))
    }
}

/// A statement the converter must account for: a plain INSERT or a
/// CTE-wrapped one (which the disqualifier checks then reject).
fn is_insert_like(statement: &str) -> bool {
    let head = strip_leading_comments(statement).trim_start();
    let upper = head.chars().take(6).collect::<String>().to_uppercase();
    upper.starts_with("INSERT") || upper.starts_with("WITH")
}

/// Everything after the top-level VALUES keyword, trailing semicolon
/// stripped. Walks characters respecting single/double quotes so a
/// `VALUES` (or a semicolon) inside a string literal never ends the
/// clause early.
fn extract_values_clause(sql: &str) -> Option<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut in_string = false;
    let mut quote_char = ' ';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if (c == '\'' || c == '"') && (i == 0 || chars[i - 1] != '\\') {
            if !in_string {
                in_string = true;
                quote_char = c;
            } else if c == quote_char {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if !in_string && (c.is_ascii_alphabetic() || c == '_') {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.eq_ignore_ascii_case("values") {
                let rest: String = chars[i..].iter().collect();
                let rest = rest.trim().trim_end_matches(';').trim_end();
                return Some(rest.to_string());
            }
            continue;
        }

        i += 1;
    }

    None
}

/// First disallowed function call in the clause, if any.
///
/// Walks characters respecting single/double quotes and backslash escapes;
/// after each identifier run, peeks past whitespace for `(`. Parenthesised
/// type names (casts) are not function calls.
fn find_function_call(clause: &str) -> Option<String> {
    let chars: Vec<char> = clause.chars().collect();
    let mut in_string = false;
    let mut quote_char = ' ';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if (c == '\'' || c == '"') && (i == 0 || chars[i - 1] != '\\') {
            if !in_string {
                in_string = true;
                quote_char = c;
            } else if c == quote_char {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if !in_string && (c.is_ascii_alphabetic() || c == '_') {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let end = j;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j] == '(' {
                let name: String = chars[start..end].iter().collect();
                let lower = name.to_lowercase();
                let is_keyword = matches!(lower.as_str(), "values" | "null" | "true" | "false");
                if !is_keyword && !TYPE_NAMES.contains(&lower.as_str()) {
                    return Some(name);
                }
            }
            i = end;
            continue;
        }

        i += 1;
    }
    None
}

/// Does `needle` occur outside string literals?
fn has_outside_strings(clause: &str, needle: &str) -> bool {
    mask_string_contents(clause).contains(needle)
}

/// Replace string literal contents with spaces, keeping positions stable.
fn mask_string_contents(clause: &str) -> String {
    let chars: Vec<char> = clause.chars().collect();
    let mut out = String::with_capacity(clause.len());
    let mut in_string = false;
    let mut quote_char = ' ';

    for (i, &c) in chars.iter().enumerate() {
        if (c == '\'' || c == '"') && (i == 0 || chars[i - 1] != '\\') {
            if !in_string {
                in_string = true;
                quote_char = c;
                out.push(c);
                continue;
            } else if c == quote_char {
                in_string = false;
                out.push(c);
                continue;
            }
        }
        out.push(if in_string { ' ' } else { c });
    }
    out
}

/// Collapse whitespace outside string literals.
fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    let mut quote_char = ' ';

    for c in sql.trim().chars() {
        if (c == '\'' || c == '"') && (!in_string || quote_char == c) {
            in_string = !in_string;
            quote_char = if in_string { c } else { ' ' };
            out.push(c);
        } else if c.is_whitespace() && !in_string {
            if !out.ends_with(' ') {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a VALUES clause into parenthesised row bodies, quote-aware.
fn split_value_rows(values_clause: &str) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut in_string = false;
    let mut quote_char = ' ';
    let chars: Vec<char> = values_clause.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if (c == '\'' || c == '"') && (i == 0 || chars[i - 1] != '\\') {
            if !in_string {
                in_string = true;
                quote_char = c;
            } else if c == quote_char {
                in_string = false;
            }
        }

        if !in_string {
            if c == '(' {
                depth += 1;
                if depth == 1 {
                    current.clear();
                    continue;
                }
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    rows.push(current.clone());
                    continue;
                }
            }
        }

        if depth >= 1 {
            current.push(c);
        }
    }

    rows
}

/// Parse a comma-separated value list into literals.
///
/// Quoted strings handle doubled-quote and backslash escapes; `NULL`
/// becomes `None`; numbers and booleans keep their textual form.
pub fn parse_values(row: &str) -> Vec<SqlValue> {
    let chars: Vec<char> = row.chars().collect();
    let mut values = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        if chars[i] == '\'' || chars[i] == '"' {
            let quote = chars[i];
            i += 1;
            let mut content = String::new();
            while i < chars.len() {
                let c = chars[i];
                if c == quote {
                    if i + 1 < chars.len() && chars[i + 1] == quote {
                        content.push(quote);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                } else if c == '\\' && i + 1 < chars.len() {
                    content.push(chars[i + 1]);
                    i += 2;
                } else {
                    content.push(c);
                    i += 1;
                }
            }
            values.push(Some(content));

            // Skip any trailing cast and whitespace up to the comma
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
        } else {
            let mut raw = String::new();
            while i < chars.len() && chars[i] != ',' {
                raw.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
            values.push(parse_bare_value(raw.trim()));
        }
    }

    values
}

fn parse_bare_value(raw: &str) -> SqlValue {
    // Strip a trailing ::type cast from bare literals
    let raw = raw.split("::").next().unwrap_or(raw).trim();
    if raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Some("true".to_string());
    }
    if raw.eq_ignore_ascii_case("false") {
        return Some("false".to_string());
    }
    Some(raw.to_string())
}

/// Render rows as `COPY ... FROM stdin;` text.
///
/// Tab-separated fields, `\N` for NULL, COPY escapes for backslash, tab,
/// newline, and carriage return. Terminated by `\.`.
pub fn format_copy(table: &str, columns: &[String], rows: &[Vec<SqlValue>]) -> String {
    let mut out = format!("COPY {} ({}) FROM stdin;\n", table, columns.join(", "));
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|value| match value {
                None => "\\N".to_string(),
                Some(text) => text
                    .replace('\\', "\\\\")
                    .replace('\t', "\\t")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r"),
            })
            .collect();
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out.push_str("\\.\n");
    out
}
