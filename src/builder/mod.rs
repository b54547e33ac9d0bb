//! Deterministic schema builder.
//!
//! Concatenates all DDL files from the configured include directories into a
//! single SQL string, in an order that is byte-identical across platforms:
//! include groups by ascending `order` (declaration index as tiebreak), files
//! within a group by filename. Optionally validates block comments across
//! file boundaries and writes the artifact to disk.

pub mod comments;

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};

use crate::config::{
    BuildConfig, DirectoryConfig, Environment, SeparatorConfig, SeparatorStyle, SortMode,
};
use crate::error::ConfitureError;

/// Classification of a SQL file within the schema tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFileKind {
    Schema,
    Seed,
}

/// Classify a file: any case-insensitive `seed`/`seeds` path component makes
/// it a seed file.
pub fn categorize_path(path: &Path) -> SqlFileKind {
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        if name == "seed" || name == "seeds" {
            return SqlFileKind::Seed;
        }
    }
    SqlFileKind::Schema
}

/// Render the separator line for one file.
pub fn render_separator(
    config: &SeparatorConfig,
    file_path: &str,
) -> Result<String, ConfitureError> {
    match config.style {
        SeparatorStyle::BlockComment => Ok(format!("/* ===== {} ===== */", file_path)),
        SeparatorStyle::LineComment => Ok(format!("-- ===== {} =====", file_path)),
        SeparatorStyle::Mysql => Ok(format!("# ===== {} =====", file_path)),
        SeparatorStyle::Custom => {
            let template = config.custom_template.as_deref().ok_or_else(|| {
                ConfitureError::Config(
                    "separator style 'custom' requires separators.custom_template".to_string(),
                )
            })?;
            if !template.contains("{file_path}") {
                return Err(ConfitureError::Config(
                    "custom separator template must contain {file_path}".to_string(),
                ));
            }
            Ok(template.replace("{file_path}", file_path))
        }
    }
}

/// Deterministic schema builder over the environment's include tree.
pub struct SchemaBuilder {
    project_dir: PathBuf,
    include_dirs: Vec<DirectoryConfig>,
    exclude_dirs: Vec<PathBuf>,
    pub build_config: BuildConfig,
}

impl SchemaBuilder {
    pub fn new(env: &Environment, project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            include_dirs: env.directory_configs(),
            exclude_dirs: env.exclude_dirs.iter().map(PathBuf::from).collect(),
            build_config: env.build.clone(),
        }
    }

    /// Builder for tests and ad-hoc use, without a full environment config.
    pub fn from_parts(
        project_dir: &Path,
        include_dirs: Vec<DirectoryConfig>,
        build_config: BuildConfig,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            include_dirs,
            exclude_dirs: Vec::new(),
            build_config,
        }
    }

    /// All SQL files in deterministic build order.
    ///
    /// Scan → collect → sort by an explicit key; never relies on the
    /// filesystem's directory-entry order.
    pub fn find_sql_files(&self) -> Result<Vec<PathBuf>, ConfitureError> {
        // (order, declaration index) groups
        let mut groups: Vec<(i32, usize, Vec<PathBuf>)> = Vec::new();

        for (decl_index, dir) in self.include_dirs.iter().enumerate() {
            let base = Path::new(&dir.path);
            if !base.exists() {
                if dir.auto_discover {
                    continue;
                }
                return Err(ConfitureError::Schema(format!(
                    "Schema directory not found: {}",
                    base.display()
                )));
            }

            let mut files = Vec::new();
            for pattern in &dir.include {
                let full_pattern = base.join(pattern);
                let matches = glob::glob(&full_pattern.to_string_lossy()).map_err(|e| {
                    ConfitureError::Config(format!(
                        "Invalid include pattern '{}': {}",
                        pattern, e
                    ))
                })?;
                for entry in matches.flatten() {
                    if !entry.is_file() {
                        continue;
                    }
                    if !dir.recursive && entry.parent() != Some(base) {
                        continue;
                    }
                    if self.is_excluded(base, &entry, &dir.exclude)? {
                        continue;
                    }
                    files.push(entry);
                }
            }

            files.sort_by(|a, b| self.sort_key(a).cmp(&self.sort_key(b)));
            files.dedup();
            groups.push((dir.order, decl_index, files));
        }

        groups.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        Ok(groups.into_iter().flat_map(|(_, _, files)| files).collect())
    }

    fn is_excluded(
        &self,
        base: &Path,
        file: &Path,
        excludes: &[String],
    ) -> Result<bool, ConfitureError> {
        for dir in &self.exclude_dirs {
            if file.starts_with(dir) {
                return Ok(true);
            }
        }
        let relative = file.strip_prefix(base).unwrap_or(file);
        for pattern in excludes {
            let matcher = glob::Pattern::new(pattern).map_err(|e| {
                ConfitureError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
            if matcher.matches_path(relative) || matcher.matches_path(file) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Sort key for files within one include group: filename first, full
    /// path as tiebreak so identical names in different subdirectories
    /// still order identically on every platform.
    fn sort_key(&self, path: &Path) -> (u64, String, String) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let full = path.to_string_lossy().replace('\\', "/");
        match self.build_config.sort_mode {
            SortMode::Alphabetical => (0, name, full),
            SortMode::Hex => {
                // 8-hex-char prefix sorts numerically; anything else after
                let prefix = name.get(..8).unwrap_or("");
                match u64::from_str_radix(prefix, 16) {
                    Ok(n) if prefix.len() == 8 => (n, name, full),
                    _ => (u64::MAX, name, full),
                }
            }
        }
    }

    /// Split the file list into (schema files, seed files).
    pub fn categorize_sql_files(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ConfitureError> {
        let mut schema_files = Vec::new();
        let mut seed_files = Vec::new();
        for file in self.find_sql_files()? {
            match categorize_path(&file) {
                SqlFileKind::Schema => schema_files.push(file),
                SqlFileKind::Seed => seed_files.push(file),
            }
        }
        Ok((schema_files, seed_files))
    }

    /// Build the concatenated schema string.
    ///
    /// `schema_only` drops seed files from the build. The returned string is
    /// exactly what an `output_path` write produces.
    pub fn build(
        &self,
        schema_only: bool,
        output_path: Option<&Path>,
        progress: bool,
    ) -> Result<String, ConfitureError> {
        let files = if schema_only {
            self.categorize_sql_files()?.0
        } else {
            self.find_sql_files()?
        };

        if self.build_config.validate_comments.enabled {
            self.validate_comments(&files)?;
        }

        let pb = if progress {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{bar:40.green} {pos}/{len} {msg}").unwrap(),
            );
            Some(pb)
        } else {
            None
        };

        let mut output = String::new();
        for file in &files {
            let display_path = file
                .strip_prefix(&self.project_dir)
                .unwrap_or(file)
                .to_string_lossy()
                .replace('\\', "/");

            if let Some(ref pb) = pb {
                pb.set_message(display_path.clone());
                pb.inc(1);
            }

            let content = fs::read_to_string(file).map_err(|e| {
                ConfitureError::Schema(format!("Cannot read {}: {}", file.display(), e))
            })?;

            let separator = render_separator(&self.build_config.separators, &display_path)?;
            output.push_str(&separator);
            output.push('\n');
            output.push_str(&content);
            if !content.ends_with('\n') {
                output.push('\n');
            }
            output.push('\n');
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if let Some(path) = output_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ConfitureError::Schema(format!("Cannot create {}: {}", parent.display(), e))
                })?;
            }
            fs::write(path, &output).map_err(|e| {
                ConfitureError::Schema(format!("Cannot write {}: {}", path.display(), e))
            })?;
        }

        Ok(output)
    }

    /// Validate block comments in every file per the configured failure modes.
    fn validate_comments(&self, files: &[PathBuf]) -> Result<(), ConfitureError> {
        let cfg = &self.build_config.validate_comments;
        for file in files {
            let content = fs::read_to_string(file).map_err(|e| {
                ConfitureError::Schema(format!("Cannot read {}: {}", file.display(), e))
            })?;
            let scan = comments::scan(&content);

            if cfg.fail_on_unclosed_blocks && !scan.unclosed_blocks.is_empty() {
                let first = &scan.unclosed_blocks[0];
                return Err(ConfitureError::Schema(format!(
                    "Unclosed block comment in {} at line {} (column {})",
                    file.display(),
                    first.line,
                    first.column
                )));
            }
            if cfg.fail_on_spillover && scan.ends_in_block {
                return Err(ConfitureError::Schema(format!(
                    "File {} ends inside an unclosed block comment; the next file in the \
                     build would be swallowed",
                    file.display()
                )));
            }
        }
        Ok(())
    }

    /// SHA-256 of the built schema (post-separator, pre-write bytes).
    pub fn compute_hash(&self, schema_only: bool) -> Result<String, ConfitureError> {
        let built = self.build(schema_only, None, false)?;
        Ok(hash_schema(&built))
    }
}

/// SHA-256 hex digest of a schema string.
pub fn hash_schema(schema_sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema_sql.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommentValidationConfig;

    fn dir_config(path: &Path, order: i32) -> DirectoryConfig {
        DirectoryConfig {
            path: path.to_string_lossy().into_owned(),
            recursive: true,
            include: vec!["**/*.sql".to_string()],
            exclude: Vec::new(),
            auto_discover: true,
            order,
        }
    }

    #[test]
    fn test_categorize_path() {
        assert_eq!(
            categorize_path(Path::new("db/seeds/users.sql")),
            SqlFileKind::Seed
        );
        assert_eq!(
            categorize_path(Path::new("db/Seed/users.sql")),
            SqlFileKind::Seed
        );
        assert_eq!(
            categorize_path(Path::new("db/schema/users.sql")),
            SqlFileKind::Schema
        );
        // Only whole components count
        assert_eq!(
            categorize_path(Path::new("db/seedlings/users.sql")),
            SqlFileKind::Schema
        );
    }

    #[test]
    fn test_separator_styles() {
        let mut cfg = SeparatorConfig::default();
        assert_eq!(
            render_separator(&cfg, "a.sql").unwrap(),
            "/* ===== a.sql ===== */"
        );
        cfg.style = SeparatorStyle::LineComment;
        assert_eq!(render_separator(&cfg, "a.sql").unwrap(), "-- ===== a.sql =====");
        cfg.style = SeparatorStyle::Mysql;
        assert_eq!(render_separator(&cfg, "a.sql").unwrap(), "# ===== a.sql =====");
    }

    #[test]
    fn test_custom_separator_requires_placeholder() {
        let cfg = SeparatorConfig {
            style: SeparatorStyle::Custom,
            custom_template: Some("-- >> no placeholder".to_string()),
        };
        assert!(render_separator(&cfg, "a.sql").is_err());

        let cfg = SeparatorConfig {
            style: SeparatorStyle::Custom,
            custom_template: Some("-- >> {file_path} <<".to_string()),
        };
        assert_eq!(render_separator(&cfg, "a.sql").unwrap(), "-- >> a.sql <<");
    }

    #[test]
    fn test_deterministic_ordering() {
        let tmp = tempfile::tempdir().unwrap();
        let schema_dir = tmp.path().join("schema");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::write(schema_dir.join("20_views.sql"), "CREATE VIEW v AS SELECT 1;").unwrap();
        std::fs::write(schema_dir.join("10_tables.sql"), "CREATE TABLE t (id INT);").unwrap();
        std::fs::write(schema_dir.join("15_other.sql"), "CREATE TABLE o (id INT);").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&schema_dir, 0)],
            BuildConfig::default(),
        );

        let first = builder.find_sql_files().unwrap();
        let second = builder.find_sql_files().unwrap();
        assert_eq!(first, second);

        let names: Vec<_> = first
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["10_tables.sql", "15_other.sql", "20_views.sql"]);
    }

    #[test]
    fn test_group_order_beats_filename() {
        let tmp = tempfile::tempdir().unwrap();
        let late = tmp.path().join("a_late");
        let early = tmp.path().join("z_early");
        std::fs::create_dir_all(&late).unwrap();
        std::fs::create_dir_all(&early).unwrap();
        std::fs::write(late.join("a.sql"), "-- late").unwrap();
        std::fs::write(early.join("z.sql"), "-- early").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&late, 20), dir_config(&early, 10)],
            BuildConfig::default(),
        );
        let files = builder.find_sql_files().unwrap();
        assert!(files[0].ends_with("z.sql"));
        assert!(files[1].ends_with("a.sql"));
    }

    #[test]
    fn test_hex_sort_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("schema");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("000000ff_second.sql"), "").unwrap();
        std::fs::write(dir.join("00000001_first.sql"), "").unwrap();
        std::fs::write(dir.join("notahex_last.sql"), "").unwrap();

        let mut config = BuildConfig::default();
        config.sort_mode = SortMode::Hex;
        let builder = SchemaBuilder::from_parts(tmp.path(), vec![dir_config(&dir, 0)], config);

        let names: Vec<_> = builder
            .find_sql_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "00000001_first.sql",
                "000000ff_second.sql",
                "notahex_last.sql"
            ]
        );
    }

    #[test]
    fn test_build_concatenates_with_separators() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("schema");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("01_a.sql"), "CREATE TABLE a (id INT);").unwrap();
        std::fs::write(dir.join("02_b.sql"), "CREATE TABLE b (id INT);").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&dir, 0)],
            BuildConfig::default(),
        );
        let built = builder.build(false, None, false).unwrap();
        assert!(built.contains("/* ===== schema/01_a.sql ===== */"));
        assert!(built.contains("CREATE TABLE a"));
        assert!(built.find("CREATE TABLE a").unwrap() < built.find("CREATE TABLE b").unwrap());
    }

    #[test]
    fn test_build_fails_on_unclosed_comment() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("schema");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("01_bad.sql"), "/* unclosed").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&dir, 0)],
            BuildConfig::default(),
        );
        let err = builder.build(false, None, false).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unclosed"));
    }

    #[test]
    fn test_disabled_validation_allows_bad_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("schema");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("01_bad.sql"), "/* unclosed").unwrap();

        let mut config = BuildConfig::default();
        config.validate_comments = CommentValidationConfig {
            enabled: false,
            fail_on_unclosed_blocks: true,
            fail_on_spillover: true,
        };
        let builder = SchemaBuilder::from_parts(tmp.path(), vec![dir_config(&dir, 0)], config);
        assert!(builder.build(false, None, false).is_ok());
    }

    #[test]
    fn test_schema_only_skips_seeds() {
        let tmp = tempfile::tempdir().unwrap();
        let schema_dir = tmp.path().join("db").join("schema");
        let seeds_dir = tmp.path().join("db").join("seeds");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::create_dir_all(&seeds_dir).unwrap();
        std::fs::write(schema_dir.join("01_t.sql"), "CREATE TABLE t (id INT);").unwrap();
        std::fs::write(seeds_dir.join("01_rows.sql"), "INSERT INTO t VALUES (1);").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&tmp.path().join("db"), 0)],
            BuildConfig::default(),
        );
        let built = builder.build(true, None, false).unwrap();
        assert!(built.contains("CREATE TABLE t"));
        assert!(!built.contains("INSERT INTO t"));
    }

    #[test]
    fn test_hash_matches_written_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("schema");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("01_a.sql"), "CREATE TABLE a (id INT);").unwrap();

        let builder = SchemaBuilder::from_parts(
            tmp.path(),
            vec![dir_config(&dir, 0)],
            BuildConfig::default(),
        );

        let out = tmp.path().join("out.sql");
        let built = builder.build(false, Some(&out), false).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(built, written);
        assert_eq!(builder.compute_hash(false).unwrap(), hash_schema(&written));
    }
}
