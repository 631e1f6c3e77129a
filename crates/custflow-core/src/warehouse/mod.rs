//! Relational store holding the tables exchanged between stages.

mod memory;
mod sqlite;

use async_trait::async_trait;
use polars::prelude::DataFrame;

use crate::error::{PipelineError, Result};

pub use memory::MemoryWarehouse;
pub use sqlite::SqliteWarehouse;

/// Storage for whole tables. Writers always replace; there is no append or
/// partial update.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Creates `name` from `frame`, discarding any previous table of that name.
    async fn replace_table(&self, name: &str, frame: &DataFrame) -> Result<()>;

    /// Loads a table written by [`Warehouse::replace_table`], columns and rows in
    /// their original order. Fails with [`PipelineError::NotFound`] if it does not exist.
    async fn read_table(&self, name: &str) -> Result<DataFrame>;
}

/// Opens the warehouse addressed by `uri`.
///
/// `sqlite:` URIs are handled by [`SqliteWarehouse`]; `memory:` gives a
/// process-local [`MemoryWarehouse`] that is dropped with the pipeline.
pub async fn open_warehouse(uri: &str) -> Result<Box<dyn Warehouse>> {
    let scheme = uri.split_once(':').map(|(scheme, _)| scheme).unwrap_or_default();
    match scheme.to_ascii_lowercase().as_str() {
        "sqlite" => Ok(Box::new(SqliteWarehouse::connect(uri).await?)),
        "memory" => Ok(Box::new(MemoryWarehouse::new())),
        _ => Err(PipelineError::Config(format!(
            "unsupported warehouse URI '{uri}': expected a sqlite: or memory: URI"
        ))),
    }
}
