use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::summary;
use crate::types::{IngestOutcome, TableHandle, AGE, CUSTOMER_COLUMNS, RAW_TABLE};
use crate::warehouse::Warehouse;

/// Field values read as missing, in addition to empty fields.
const MISSING_TOKENS: [&str; 6] = ["NA", "N/A", "NaN", "nan", "NULL", "null"];

/// First stage: load the customer CSV, drop rows without an age and persist
/// the fixed column subset as `customers_raw`.
#[derive(Debug, Clone)]
pub struct Ingest {
    input_path: PathBuf,
}

impl Ingest {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::from_path(&config.input_csv_path)
    }

    pub fn from_path(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
        }
    }

    pub async fn run(&self, warehouse: &dyn Warehouse) -> Result<IngestOutcome> {
        info!(path = %self.input_path.display(), "ingesting customer file");

        let raw = read_customer_csv(&self.input_path)?;
        summary::log_frame("ingest.input", &raw);

        let cleaned = clean_customers(&raw)?;
        summary::log_frame("ingest.output", &cleaned);

        warehouse.replace_table(RAW_TABLE, &cleaned).await?;

        let outcome = IngestOutcome {
            table: TableHandle::new(RAW_TABLE),
            rows_read: raw.height(),
            rows_kept: cleaned.height(),
        };
        info!(
            table = %outcome.table,
            rows_read = outcome.rows_read,
            rows_kept = outcome.rows_kept,
            rows_dropped = outcome.rows_dropped(),
            "ingestion complete"
        );
        Ok(outcome)
    }
}

/// Parses a customer CSV after checking that its header carries every column
/// in [`CUSTOMER_COLUMNS`].
pub fn read_customer_csv(path: &Path) -> Result<DataFrame> {
    let contents = fs::read(path).map_err(|err| {
        PipelineError::data_access(format!("failed to read '{}'", path.display()), err)
    })?;

    check_required_columns(&contents, path)?;

    let parse_options = CsvParseOptions::default().with_null_values(Some(NullValues::AllColumns(
        MISSING_TOKENS.iter().map(|token| (*token).into()).collect(),
    )));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_options)
        .into_reader_with_file_handle(Cursor::new(contents))
        .finish()
        .map_err(|err| PipelineError::data_access(format!("failed to parse '{}'", path.display()), err))
}

fn check_required_columns(contents: &[u8], path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(contents);
    let headers = reader.headers().map_err(|err| {
        PipelineError::data_access(format!("failed to read header of '{}'", path.display()), err)
    })?;

    let missing: Vec<&str> = CUSTOMER_COLUMNS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|header| header == *required))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::DataAccess(format!(
            "'{}' is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

/// Removes rows whose `AGE` is missing and projects to [`CUSTOMER_COLUMNS`].
pub fn clean_customers(frame: &DataFrame) -> Result<DataFrame> {
    let age = frame
        .column(AGE)
        .map_err(|err| PipelineError::data_access("customer data has no AGE column", err))?;
    let has_age = age.is_not_null();

    frame
        .filter(&has_age)
        .and_then(|filtered| filtered.select(CUSTOMER_COLUMNS))
        .map_err(|err| PipelineError::data_access("failed to clean customer data", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_check_lists_every_missing_column() {
        let content = b"PID,GENDER,AGE,CITY,STATE\n1,M,30,Austin,TX\n";
        let err = check_required_columns(content, Path::new("customers.csv")).unwrap_err();
        match err {
            PipelineError::DataAccess(message) => {
                assert!(message.contains("DOB, ZIP, CHILD"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
