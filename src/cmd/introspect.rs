use std::fs;
use std::path::PathBuf;

use crate::config::Environment;
use crate::differ::TableInfo;
use crate::error::ConfitureError;
use crate::introspect::Introspector;
use crate::migrate::Db;

pub fn run(
    env: Option<String>,
    project_dir: PathBuf,
    database_url: Option<String>,
    schemas: Option<String>,
    format: String,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let url = match (database_url, env) {
        (Some(url), _) => url,
        (None, Some(env_name)) => Environment::load(&env_name, &project_dir)?.database_url,
        (None, None) => {
            return Err(ConfitureError::Config(
                "Provide --env or --database-url".to_string(),
            )
            .into())
        }
    };

    let schema_list: Option<Vec<String>> = schemas.as_deref().map(super::split_csv);

    let mut db = Db::connect(&url)?;
    let schema = Introspector::new(&mut db).introspect(schema_list.as_deref())?;

    let tables: Vec<TableInfo> = schema.iter().map(TableInfo::from).collect();
    let payload = serde_json::json!({
        "tables": tables,
        "table_count": tables.len(),
    });

    let rendered = match format.as_str() {
        "json" => serde_json::to_string_pretty(&payload)?,
        "yaml" => serde_yaml_ng::to_string(&payload)?,
        other => anyhow::bail!("Unknown format: {}. Use yaml or json", other),
    };

    match output {
        Some(path) => fs::write(&path, rendered)?,
        None => println!("{}", rendered),
    }

    Ok(())
}
