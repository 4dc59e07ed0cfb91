//! Configuration loading
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults (`PipelineConfig::default()`)
//! 2. `leadflow.toml` in the working directory, or the file named by `LEADFLOW_CONFIG`
//! 3. `LEADFLOW__*` environment variables, `__` between nesting levels
//!    (e.g. `LEADFLOW__RETRY__MAX_ATTEMPTS=5`)

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use leadflow_core::config::PipelineConfig;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_CONFIG_NAME: &str = "leadflow";
const ENV_PREFIX: &str = "LEADFLOW";
const ENV_SEPARATOR: &str = "__";

/// Load, expand and validate the pipeline configuration
pub fn load() -> Result<PipelineConfig> {
    let file = std::env::var("LEADFLOW_CONFIG").ok().map(PathBuf::from);
    load_from(file, None)
}

/// `env` replaces the process environment when given
pub fn load_from(
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
) -> Result<PipelineConfig> {
    let file_source = match &file {
        Some(path) => File::from(path.as_path()).required(true),
        None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    let settings = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to read configuration")?;

    let mut config: PipelineConfig = settings
        .try_deserialize()
        .context("Invalid configuration")?;

    config.database_url = config.database_url.map(|url| expand_database_url(&url));
    config.validate()?;
    Ok(config)
}

/// Expand a leading `~` in the path part of a SQLite URL
pub fn expand_database_url(url: &str) -> String {
    let url = url.trim();
    for scheme in ["sqlite://", "sqlite:"] {
        if let Some(path) = url.strip_prefix(scheme) {
            return format!("{}{}", scheme, shellexpand::tilde(path));
        }
    }
    shellexpand::tilde(url).into_owned()
}
