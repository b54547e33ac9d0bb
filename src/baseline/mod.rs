//! Baseline detection against schema-history snapshots.
//!
//! Given a live database schema and a directory of `{version}_{name}.sql`
//! snapshots, determine which migration version the database corresponds to,
//! even when snapshots are sparse. Exact match on normalised text wins;
//! otherwise the closest snapshot by sequence ratio wins when it clears the
//! configured threshold.

use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

static IF_NOT_EXISTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bif\s+not\s+exists\b").unwrap());
static IF_EXISTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bif\s+exists\b").unwrap());
static SNAPSHOT_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)_.*\.sql$").unwrap());

/// Default similarity threshold for fuzzy snapshot matching.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Detects the migration baseline of a live schema from history snapshots.
#[derive(Debug)]
pub struct BaselineDetector {
    snapshots_dir: PathBuf,
    pub similarity_threshold: f64,
    /// Closest (version, ratio) seen by the last fuzzy scan that found no
    /// acceptable match.
    pub last_closest: Option<(String, f64)>,
}

impl BaselineDetector {
    pub fn new(snapshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshots_dir: snapshots_dir.into(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            last_closest: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Normalise a schema for comparison. Pure and idempotent.
    ///
    /// Collapses whitespace, lowercases, strips comments, removes
    /// `IF [NOT] EXISTS`, and sorts top-level CREATE TABLE statements
    /// alphabetically (stable slot replacement, so surrounding statements
    /// keep their positions).
    pub fn normalize_schema(&self, sql: &str) -> String {
        let stripped = strip_comments(sql);
        let no_guards = IF_NOT_EXISTS_RE.replace_all(&stripped, " ");
        let no_guards = IF_EXISTS_RE.replace_all(&no_guards, " ");
        let lowered = no_guards.to_lowercase();
        let collapsed = collapse_whitespace(&lowered);

        let statements: Vec<String> = collapsed
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if statements.is_empty() {
            return String::new();
        }

        // Sort CREATE TABLE statements into the slots they occupy
        let mut create_tables: Vec<&String> = statements
            .iter()
            .filter(|s| s.starts_with("create table"))
            .collect();
        create_tables.sort();

        let mut sorted_iter = create_tables.into_iter();
        let ordered: Vec<String> = statements
            .iter()
            .map(|s| {
                if s.starts_with("create table") {
                    sorted_iter.next().unwrap().clone()
                } else {
                    s.clone()
                }
            })
            .collect();

        ordered.join("; ")
    }

    /// Load snapshots newest-first as (version, content) pairs.
    pub fn load_snapshots(&self) -> Vec<(String, String)> {
        if !self.snapshots_dir.exists() {
            return Vec::new();
        }

        let mut snapshots: Vec<(String, String)> = Vec::new();
        let entries = match fs::read_dir(&self.snapshots_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let caps = match SNAPSHOT_FILE_RE.captures(&name) {
                Some(c) => c,
                None => continue,
            };
            let version = caps.get(1).unwrap().as_str().to_string();
            if let Ok(content) = fs::read_to_string(&path) {
                snapshots.push((version, content));
            }
        }

        // Newest first; version strings are zero-padded so string order works,
        // but compare numerically to be safe with mixed widths.
        snapshots.sort_by(|a, b| {
            let av: u64 = a.0.parse().unwrap_or(0);
            let bv: u64 = b.0.parse().unwrap_or(0);
            bv.cmp(&av).then_with(|| b.0.cmp(&a.0))
        });
        snapshots
    }

    /// Find the snapshot matching the live schema.
    ///
    /// Returns the version of the first exact normalised match (newest
    /// first), or the highest-ratio snapshot when its ratio clears the
    /// threshold. `last_closest` records the best candidate whenever no
    /// exact match exists.
    pub fn find_matching_snapshot(&mut self, live_sql: &str) -> Option<String> {
        self.last_closest = None;
        let snapshots = self.load_snapshots();
        if snapshots.is_empty() {
            return None;
        }

        let live_normalized = self.normalize_schema(live_sql);

        let mut best: Option<(String, f64)> = None;
        for (version, content) in &snapshots {
            let snapshot_normalized = self.normalize_schema(content);
            if snapshot_normalized == live_normalized {
                return Some(version.clone());
            }
            let ratio = sequence_ratio(&live_normalized, &snapshot_normalized);
            match &best {
                Some((_, best_ratio)) if *best_ratio >= ratio => {}
                _ => best = Some((version.clone(), ratio)),
            }
        }

        self.last_closest = best.clone();
        match best {
            Some((version, ratio)) if ratio >= self.similarity_threshold => Some(version),
            _ => None,
        }
    }
}

/// Strip `--` and `/* */` comments, preserving string literals.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Similarity ratio between two strings in [0, 1].
///
/// Ratcliff/Obershelp: twice the total length of matching blocks over the
/// combined length.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    (2.0 * matches as f64) / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (a_start, b_start, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..a_start], &b[..b_start])
        + matching_chars(&a[a_start + len..], &b[b_start + len..])
}

fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = length of match ending at a[i], b[j]
    let mut lengths = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut prev = 0;
        for j in 0..b.len() {
            let current = lengths[j + 1];
            if a[i] == b[j] {
                let len = prev + 1;
                lengths[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            } else {
                lengths[j + 1] = 0;
            }
            prev = current;
        }
    }
    best
}
