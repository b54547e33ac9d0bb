//! Violation records and the aggregated validation report.

use serde::Serialize;

/// Violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Info => write!(f, "INFO"),
            ViolationSeverity::Warning => write!(f, "WARNING"),
            ViolationSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Rule or validator that produced the finding
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Violation {
    pub fn error(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, ViolationSeverity::Error, message)
    }

    pub fn warning(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, ViolationSeverity::Warning, message)
    }

    pub fn info(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule, ViolationSeverity::Info, message)
    }

    fn new(
        rule: impl Into<String>,
        severity: ViolationSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
            file: None,
            table: None,
            column: None,
            line: None,
            suggestion: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.severity, self.rule)?;
        if let Some(file) = &self.file {
            write!(f, " file={}", file)?;
        }
        if let Some(table) = &self.table {
            write!(f, " table={}", table)?;
        }
        if let Some(column) = &self.column {
            write!(f, " column={}", column)?;
        }
        if let Some(line) = self.line {
            write!(f, " line={}", line)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Aggregated result of a validation run.
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    /// Validators that actually ran, in order
    pub validators_run: Vec<String>,
    /// Highest level reached (0 when no level ran)
    pub max_level_reached: u8,
    pub files_scanned: usize,
    pub tables_scanned: usize,
    pub stopped_early: bool,
}

impl ValidationReport {
    pub fn errors(&self) -> usize {
        self.count(ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(ViolationSeverity::Warning)
    }

    pub fn infos(&self) -> usize {
        self.count(ViolationSeverity::Info)
    }

    fn count(&self, severity: ViolationSeverity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors() > 0
    }

    /// Plain-text rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for violation in &self.violations {
            out.push_str(&violation.to_string());
            out.push('\n');
        }
        if !self.violations.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "Validators run: {}\n",
            self.validators_run.join(", ")
        ));
        out.push_str(&format!(
            "Scanned {} file(s), {} table(s)\n",
            self.files_scanned, self.tables_scanned
        ));
        out.push_str(&format!(
            "Total: {} errors, {} warnings, {} info\n",
            self.errors(),
            self.warnings(),
            self.infos()
        ));
        if self.stopped_early {
            out.push_str("Validation stopped early on critical errors.\n");
        }
        out
    }

    /// JSON rendering.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// CSV rendering (one row per violation).
    pub fn to_csv(&self) -> String {
        let mut out = String::from("severity,rule,table,column,file,line,message\n");
        for v in &self.violations {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                v.severity,
                csv_escape(&v.rule),
                csv_escape(v.table.as_deref().unwrap_or("")),
                csv_escape(v.column.as_deref().unwrap_or("")),
                csv_escape(v.file.as_deref().unwrap_or("")),
                v.line.map(|l| l.to_string()).unwrap_or_default(),
                csv_escape(&v.message),
            ));
        }
        out
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
