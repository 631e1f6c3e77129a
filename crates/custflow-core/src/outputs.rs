use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tempfile::{Builder, NamedTempFile};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{ExportSummary, TableHandle};
use crate::warehouse::Warehouse;

/// Final stage: write the cleaned table to the configured CSV path.
#[derive(Debug, Clone)]
pub struct Export {
    output_path: PathBuf,
}

impl Export {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::to_path(&config.output_csv_path)
    }

    pub fn to_path(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub async fn run(&self, warehouse: &dyn Warehouse, source: &TableHandle) -> Result<ExportSummary> {
        info!(table = %source, path = %self.output_path.display(), "exporting table");

        let frame = warehouse.read_table(source.as_str()).await?;
        let summary = write_csv(&frame, &self.output_path)?;

        info!(
            path = %summary.path.display(),
            rows = summary.rows,
            columns = summary.columns,
            digest = %summary.digest,
            "export complete"
        );
        Ok(summary)
    }
}

/// Serializes `frame` as CSV with a header row and no index column.
pub fn write_csv_bytes(frame: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut frame = frame.clone();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut frame)
        .map_err(|err| PipelineError::storage("failed to serialize CSV", err))?;
    Ok(buffer)
}

/// Writes `frame` to `path`, replacing any existing file. The bytes are staged
/// in a temporary file next to `path` and renamed into place, so readers see
/// either the previous file or the complete new one. An existing file keeps
/// its permissions; a new one gets the usual umask-filtered mode.
pub fn write_csv(frame: &DataFrame, path: &Path) -> Result<ExportSummary> {
    let bytes = write_csv_bytes(frame)?;
    let write_err =
        |err: &dyn std::fmt::Display| PipelineError::storage(format!("failed to write '{}'", path.display()), err);

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = staging_file(directory, path).map_err(|err| write_err(&err))?;
    staged.write_all(&bytes).map_err(|err| write_err(&err))?;
    staged.as_file().sync_all().map_err(|err| write_err(&err))?;
    staged.persist(path).map_err(|err| write_err(&err.error))?;

    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows: frame.height(),
        columns: frame.width(),
        digest: blake3::hash(&bytes).to_hex().to_string(),
    })
}

fn staging_file(directory: &Path, target: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let staged = builder.tempfile_in(directory)?;

    if let Ok(existing) = fs::metadata(target) {
        staged.as_file().set_permissions(existing.permissions())?;
    }
    Ok(staged)
}
