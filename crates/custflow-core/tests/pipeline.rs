use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use custflow_core::types::{CLEAN_TABLE, RAW_TABLE};
use custflow_core::{Pipeline, PipelineConfig, PipelineError, SqliteWarehouse, Warehouse};
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn config_in(dir: &Path, input: PathBuf) -> PipelineConfig {
    PipelineConfig {
        connection_uri: format!("sqlite://{}", dir.join("warehouse.db").display()),
        input_csv_path: input,
        output_csv_path: dir.join("customers_clean.csv"),
    }
}

async fn setup(input: &str) -> Result<(TempDir, PipelineConfig, SqliteWarehouse), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path(), fixture_path(input));
    let warehouse = SqliteWarehouse::connect(&config.connection_uri).await?;
    Ok((dir, config, warehouse))
}

#[tokio::test]
async fn end_to_end_scenario() -> Result<(), Box<dyn Error>> {
    let (_dir, config, warehouse) = setup("scenario.csv").await?;

    let report = Pipeline::new(&config).run(&warehouse).await?;

    assert_eq!(report.ingest.table.as_str(), RAW_TABLE);
    assert_eq!(report.ingest.rows_kept, 2);
    assert_eq!(report.transform.table.as_str(), CLEAN_TABLE);
    assert_eq!(report.export.rows, 2);

    let mut reader = csv::Reader::from_path(&config.output_csv_path)?;
    let headers = reader.headers()?.clone();
    assert!(headers.iter().all(|header| header != "DOB"));
    let yob_index = headers
        .iter()
        .position(|header| header == "YOB")
        .expect("YOB column");
    let pid_index = headers
        .iter()
        .position(|header| header == "PID")
        .expect("PID column");

    let rows: Vec<(String, String)> = reader
        .records()
        .map(|record| {
            let record = record?;
            Ok((record[pid_index].to_string(), record[yob_index].to_string()))
        })
        .collect::<Result<_, csv::Error>>()?;

    assert_eq!(
        rows,
        vec![
            ("1".to_string(), "1994".to_string()),
            ("3".to_string(), "2016".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn repeated_runs_write_identical_files() -> Result<(), Box<dyn Error>> {
    let (_dir, config, warehouse) = setup("customers.csv").await?;
    let pipeline = Pipeline::new(&config);

    let first = pipeline.run(&warehouse).await?;
    let first_bytes = fs::read(&config.output_csv_path)?;

    let second = pipeline.run(&warehouse).await?;
    let second_bytes = fs::read(&config.output_csv_path)?;

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first.export.digest, second.export.digest);
    assert_ne!(first.run_id, second.run_id);
    Ok(())
}

#[tokio::test]
async fn run_reports_statistics() -> Result<(), Box<dyn Error>> {
    let (_dir, config, warehouse) = setup("customers.csv").await?;

    let report = Pipeline::new(&config).run(&warehouse).await?;

    assert_eq!(report.ingest.rows_read, 8);
    assert_eq!(report.ingest.rows_dropped(), 2);
    assert_eq!(report.transform.stats.male.mean, Some(34.0));
    assert_eq!(report.transform.stats.male.median, Some(30.0));
    assert_eq!(report.transform.stats.female_with_child.mean, Some(24.0));
    assert!(report.finished_at >= report.started_at);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["ingest"]["table"], "customers_raw");
    assert_eq!(json["transform"]["stats"]["female_with_child"]["count"], 2);
    Ok(())
}

#[tokio::test]
async fn intermediate_tables_match_the_stage_contracts() -> Result<(), Box<dyn Error>> {
    let (_dir, config, warehouse) = setup("customers.csv").await?;

    Pipeline::new(&config).run(&warehouse).await?;

    let raw = warehouse.read_table(RAW_TABLE).await?;
    assert_eq!(raw.column("AGE")?.null_count(), 0);
    assert!(raw.column("DOB").is_ok());

    let clean = warehouse.read_table(CLEAN_TABLE).await?;
    assert!(clean.column("DOB").is_err());
    assert_eq!(clean.height(), raw.height());
    Ok(())
}

#[tokio::test]
async fn failed_ingest_aborts_the_run() -> Result<(), Box<dyn Error>> {
    let (dir, _, warehouse) = setup("customers.csv").await?;
    let config = config_in(dir.path(), dir.path().join("missing.csv"));

    let err = Pipeline::new(&config).run(&warehouse).await.unwrap_err();

    assert!(matches!(err, PipelineError::DataAccess(_)), "{err}");
    assert!(!config.output_csv_path.exists());
    assert!(matches!(
        warehouse.read_table(RAW_TABLE).await,
        Err(PipelineError::NotFound(_))
    ));
    Ok(())
}
