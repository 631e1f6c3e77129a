pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod outputs;
pub mod pipelines;
pub mod processing;
pub mod summary;
pub mod types;
pub mod warehouse;

pub use config::{PipelineConfig, Settings};
pub use error::{PipelineError, Result};
pub use pipelines::{Pipeline, RunReport};
pub use types::TableHandle;
pub use warehouse::{open_warehouse, MemoryWarehouse, SqliteWarehouse, Warehouse};
