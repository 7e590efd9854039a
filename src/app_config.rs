//! Config file discovery and loading for the CLI.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use satflow::{FileConfig, PipelineConfig};
use tracing::debug;

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/satflow/config.toml`
/// 2. `$HOME/.config/satflow/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("satflow")
                .join("config.toml"),
        );
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("satflow")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Builds the pipeline config from defaults and the config file.
///
/// An explicit `--config` path must exist; a missing default file is skipped.
pub fn load_pipeline_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();

    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file '{}' does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => resolve_default_config_path().filter(|path| path.exists()),
    };

    if let Some(path) = path {
        let file = load_file_config(&path)?;
        config.apply_file(&file);
        debug!(path = %path.display(), "loaded config file");
    }

    Ok(config)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    FileConfig::from_toml_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}
