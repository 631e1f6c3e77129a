use polars::prelude::DataFrame;
use tracing::debug;

/// Logs the shape of `frame` and, per column, its dtype and null count.
pub fn log_frame(label: &str, frame: &DataFrame) {
    debug!(label, rows = frame.height(), columns = frame.width(), "frame summary");
    for column in frame.get_columns() {
        debug!(
            label,
            column = %column.name(),
            dtype = %column.dtype(),
            nulls = column.null_count(),
            "column summary"
        );
    }
}
