use async_trait::async_trait;
use polars::prelude::*;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use super::Warehouse;
use crate::db::{self, DbPool};
use crate::error::{PipelineError, Result};

/// Warehouse backed by a SQLite database through sqlx.
#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    pool: DbPool,
}

impl SqliteWarehouse {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = db::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn replace_table(&self, name: &str, frame: &DataFrame) -> Result<()> {
        if frame.width() == 0 {
            return Err(PipelineError::Storage(format!(
                "cannot persist table '{name}' without columns"
            )));
        }

        let columns = frame
            .get_columns()
            .iter()
            .map(|column| Ok((column.name().to_string(), SqlColumn::from_column(column)?)))
            .collect::<PolarsResult<Vec<_>>>()
            .map_err(|err| PipelineError::storage(format!("failed to prepare table '{name}'"), err))?;

        let table = quote_ident(name);
        let definitions: Vec<String> = columns
            .iter()
            .map(|(column_name, column)| {
                format!("{} {}", quote_ident(column_name), column.declared_type())
            })
            .collect();
        let column_list: Vec<String> = columns
            .iter()
            .map(|(column_name, _)| quote_ident(column_name))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let drop_sql = format!("DROP TABLE IF EXISTS {table}");
        let create_sql = format!("CREATE TABLE {table} ({})", definitions.join(", "));
        let insert_sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            column_list.join(", "),
            placeholders.join(", ")
        );

        let write_err = |err: sqlx::Error| PipelineError::storage(format!("failed to write table '{name}'"), err);

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        sqlx::query(&drop_sql).execute(&mut *tx).await.map_err(write_err)?;
        sqlx::query(&create_sql).execute(&mut *tx).await.map_err(write_err)?;

        for row in 0..frame.height() {
            let mut query = sqlx::query(&insert_sql);
            for (_, column) in &columns {
                query = match column {
                    SqlColumn::Integer(values) => query.bind(values[row]),
                    SqlColumn::Boolean(values) => query.bind(values[row]),
                    SqlColumn::Real(values) => query.bind(values[row]),
                    SqlColumn::Text(values) => query.bind(values[row].as_deref()),
                };
            }
            query.execute(&mut *tx).await.map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;

        info!(table = name, rows = frame.height(), columns = frame.width(), "table replaced");
        Ok(())
    }

    async fn read_table(&self, name: &str) -> Result<DataFrame> {
        let read_err = |err: sqlx::Error| PipelineError::storage(format!("failed to read table '{name}'"), err);
        let table = quote_ident(name);

        let schema_rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;

        if schema_rows.is_empty() {
            return Err(PipelineError::NotFound(format!("table '{name}' does not exist")));
        }

        let mut columns = Vec::with_capacity(schema_rows.len());
        for row in &schema_rows {
            let column_name: String = row.try_get("name").map_err(read_err)?;
            let declared: String = row.try_get("type").map_err(read_err)?;
            columns.push((column_name, SqlColumn::for_declared_type(&declared)));
        }

        let column_list: Vec<String> = columns
            .iter()
            .map(|(column_name, _)| quote_ident(column_name))
            .collect();
        let select_sql = format!("SELECT {} FROM {table} ORDER BY rowid", column_list.join(", "));

        let rows = sqlx::query(&select_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;

        for row in &rows {
            for (idx, (_, column)) in columns.iter_mut().enumerate() {
                column.push_from_row(row, idx).map_err(read_err)?;
            }
        }

        debug!(table = name, rows = rows.len(), columns = columns.len(), "table loaded");

        let frame_columns: Vec<Column> = columns
            .into_iter()
            .map(|(column_name, column)| column.into_column(&column_name))
            .collect();
        DataFrame::new(frame_columns)
            .map_err(|err| PipelineError::storage(format!("failed to rebuild table '{name}'"), err))
    }
}

/// Column values in the SQLite storage classes the warehouse uses. Booleans
/// are stored as integers under a `BOOLEAN` declared type.
#[derive(Debug)]
enum SqlColumn {
    Integer(Vec<Option<i64>>),
    Boolean(Vec<Option<bool>>),
    Real(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl SqlColumn {
    fn from_column(column: &Column) -> PolarsResult<Self> {
        let dtype = column.dtype();
        if matches!(dtype, DataType::Boolean) {
            Ok(SqlColumn::Boolean(column.bool()?.into_iter().collect()))
        } else if dtype.is_integer() {
            let values = column.cast(&DataType::Int64)?;
            Ok(SqlColumn::Integer(values.i64()?.into_iter().collect()))
        } else if dtype.is_float() {
            let values = column.cast(&DataType::Float64)?;
            Ok(SqlColumn::Real(values.f64()?.into_iter().collect()))
        } else {
            let values = column.cast(&DataType::String)?;
            Ok(SqlColumn::Text(
                values
                    .str()?
                    .into_iter()
                    .map(|value| value.map(str::to_string))
                    .collect(),
            ))
        }
    }

    /// Maps a declared column type onto a storage class using SQLite's affinity rules.
    fn for_declared_type(declared: &str) -> Self {
        let declared = declared.to_ascii_uppercase();
        if declared == "BOOLEAN" {
            SqlColumn::Boolean(Vec::new())
        } else if declared.contains("INT") {
            SqlColumn::Integer(Vec::new())
        } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB") {
            SqlColumn::Real(Vec::new())
        } else {
            SqlColumn::Text(Vec::new())
        }
    }

    fn declared_type(&self) -> &'static str {
        match self {
            SqlColumn::Integer(_) => "INTEGER",
            SqlColumn::Boolean(_) => "BOOLEAN",
            SqlColumn::Real(_) => "REAL",
            SqlColumn::Text(_) => "TEXT",
        }
    }

    fn push_from_row(&mut self, row: &SqliteRow, idx: usize) -> sqlx::Result<()> {
        match self {
            SqlColumn::Integer(values) => values.push(row.try_get::<Option<i64>, _>(idx)?),
            SqlColumn::Boolean(values) => values.push(row.try_get::<Option<bool>, _>(idx)?),
            SqlColumn::Real(values) => values.push(row.try_get::<Option<f64>, _>(idx)?),
            SqlColumn::Text(values) => values.push(row.try_get::<Option<String>, _>(idx)?),
        }
        Ok(())
    }

    fn into_column(self, name: &str) -> Column {
        let series = match self {
            SqlColumn::Integer(values) => Series::new(name.into(), values),
            SqlColumn::Boolean(values) => Series::new(name.into(), values),
            SqlColumn::Real(values) => Series::new(name.into(), values),
            SqlColumn::Text(values) => Series::new(name.into(), values),
        };
        series.into()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("customers_raw"), "\"customers_raw\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn declared_types_follow_affinity() {
        assert_eq!(SqlColumn::for_declared_type("BIGINT").declared_type(), "INTEGER");
        assert_eq!(SqlColumn::for_declared_type("double").declared_type(), "REAL");
        assert_eq!(SqlColumn::for_declared_type("boolean").declared_type(), "BOOLEAN");
        assert_eq!(SqlColumn::for_declared_type("").declared_type(), "TEXT");
    }
}
