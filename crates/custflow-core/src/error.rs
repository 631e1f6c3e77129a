// crates/custflow-core/src/error.rs

use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data access failed: {0}")]
    DataAccess(String),

    #[error("Storage failed: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn data_access(context: impl Display, err: impl Display) -> Self {
        PipelineError::DataAccess(format!("{context}: {err}"))
    }

    pub fn storage(context: impl Display, err: impl Display) -> Self {
        PipelineError::Storage(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
