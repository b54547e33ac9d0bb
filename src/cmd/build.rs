use std::path::PathBuf;

use crate::builder::{hash_schema, SchemaBuilder};
use crate::config::{Environment, SeparatorStyle};
use crate::error::ConfitureError;

#[allow(clippy::too_many_arguments)]
pub fn run(
    env: String,
    project_dir: PathBuf,
    schema_only: bool,
    output: Option<PathBuf>,
    validate_comments: Option<bool>,
    fail_on_unclosed: Option<bool>,
    separator_style: Option<String>,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    let env_config = Environment::load(&env, &project_dir)?;
    let mut builder = SchemaBuilder::new(&env_config, &project_dir);

    // CLI overrides beat the environment config
    if let Some(enabled) = validate_comments {
        builder.build_config.validate_comments.enabled = enabled;
    }
    if let Some(fail) = fail_on_unclosed {
        builder.build_config.validate_comments.fail_on_unclosed_blocks = fail;
    }
    if let Some(style) = separator_style {
        let parsed: SeparatorStyle = style
            .parse()
            .map_err(ConfitureError::Config)?;
        builder.build_config.separators.style = parsed;
    }

    let files = builder.find_sql_files()?;
    let built = builder.build(schema_only, output.as_deref(), progress && !json)?;
    let hash = hash_schema(&built);

    if json {
        let payload = serde_json::json!({
            "status": "ok",
            "environment": env,
            "files": files.len(),
            "bytes": built.len(),
            "schema_only": schema_only,
            "hash": hash,
            "output": output.as_ref().map(|p| p.display().to_string()),
            "warnings": Vec::<String>::new(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        eprintln!("Built schema from {} file(s)", files.len());
        eprintln!("  Environment: {}", env);
        eprintln!("  Size: {} bytes", built.len());
        eprintln!("  Hash: {}", hash);
        match &output {
            Some(path) => eprintln!("  Written to: {}", path.display()),
            None => {
                if !schema_only {
                    eprintln!("  (use -o to write the artifact to disk)");
                }
            }
        }
    }

    Ok(())
}
