use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const CONNECTION_URI_VAR: &str = "DATA_WAREHOUSE_CONNECTION_URI";
pub const INPUT_PATH_VAR: &str = "CSV_FILE_PATH";
pub const OUTPUT_PATH_VAR: &str = "OUTPUT_CSV_FILE_NAME";

/// Partially resolved configuration. Each source (environment, TOML file,
/// command line) produces one of these and they are layered with [`Settings::or`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub connection_uri: Option<String>,
    pub input_csv_path: Option<PathBuf>,
    pub output_csv_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            connection_uri: get(CONNECTION_URI_VAR),
            input_csv_path: get(INPUT_PATH_VAR).map(PathBuf::from),
            output_csv_path: get(OUTPUT_PATH_VAR).map(PathBuf::from),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|err| PipelineError::Config(format!("invalid config file: {err}")))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!(
                "failed to read config file '{}': {err}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Keeps every value already set and fills the gaps from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            connection_uri: self.connection_uri.or(fallback.connection_uri),
            input_csv_path: self.input_csv_path.or(fallback.input_csv_path),
            output_csv_path: self.output_csv_path.or(fallback.output_csv_path),
        }
    }

    pub fn connection_uri(&self) -> Result<&str> {
        self.connection_uri
            .as_deref()
            .ok_or_else(|| missing(CONNECTION_URI_VAR, "connection_uri"))
    }

    pub fn input_csv_path(&self) -> Result<&Path> {
        self.input_csv_path
            .as_deref()
            .ok_or_else(|| missing(INPUT_PATH_VAR, "input_csv_path"))
    }

    pub fn output_csv_path(&self) -> Result<&Path> {
        self.output_csv_path
            .as_deref()
            .ok_or_else(|| missing(OUTPUT_PATH_VAR, "output_csv_path"))
    }

    pub fn into_pipeline_config(self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            connection_uri: self.connection_uri()?.to_string(),
            input_csv_path: self.input_csv_path()?.to_path_buf(),
            output_csv_path: self.output_csv_path()?.to_path_buf(),
        })
    }
}

fn missing(var: &str, key: &str) -> PipelineError {
    PipelineError::Config(format!("{var} (or `{key}` in the config file) must be set"))
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub connection_uri: String,
    pub input_csv_path: PathBuf,
    pub output_csv_path: PathBuf,
}
