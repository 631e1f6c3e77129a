use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use polars::prelude::DataFrame;
use tracing::debug;

use super::Warehouse;
use crate::error::{PipelineError, Result};

/// In-memory warehouse for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, DataFrame>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let tables = self.lock()?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, DataFrame>>> {
        self.tables
            .lock()
            .map_err(|_| PipelineError::Storage("memory warehouse lock poisoned".to_string()))
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn replace_table(&self, name: &str, frame: &DataFrame) -> Result<()> {
        debug!(table = name, rows = frame.height(), "replacing in-memory table");
        self.lock()?.insert(name.to_string(), frame.clone());
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<DataFrame> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("table '{name}' does not exist")))
    }
}
