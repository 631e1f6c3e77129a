use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

pub const PID: &str = "PID";
pub const GENDER: &str = "GENDER";
pub const AGE: &str = "AGE";
pub const DOB: &str = "DOB";
pub const CITY: &str = "CITY";
pub const STATE: &str = "STATE";
pub const ZIP: &str = "ZIP";
pub const CHILD: &str = "CHILD";
pub const YOB: &str = "YOB";

/// Columns kept by ingestion, in output order.
pub const CUSTOMER_COLUMNS: [&str; 8] = [PID, GENDER, AGE, DOB, CITY, STATE, ZIP, CHILD];

pub const RAW_TABLE: &str = "customers_raw";
pub const CLEAN_TABLE: &str = "customers_clean";

/// Name of a table persisted by one stage and read by the next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TableHandle(String);

impl TableHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub table: TableHandle,
    pub rows_read: usize,
    pub rows_kept: usize,
}

impl IngestOutcome {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.rows_kept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgeSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemographicStats {
    pub male: AgeSummary,
    pub female_with_child: AgeSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformOutcome {
    pub table: TableHandle,
    pub rows: usize,
    pub stats: DemographicStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// blake3 hex digest of the bytes written.
    pub digest: String,
}
