use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use custflow_core::ingestion::Ingest;
use custflow_core::outputs::Export;
use custflow_core::processing::Transform;
use custflow_core::types::{AgeSummary, TransformOutcome};
use custflow_core::{open_warehouse, Pipeline, RunReport, Settings, TableHandle, Warehouse};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Customer CSV ingest, clean and export pipeline", long_about = None)]
struct Cli {
    /// TOML file providing connection_uri, input_csv_path and output_csv_path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Warehouse URI, e.g. sqlite://warehouse.db (overrides DATA_WAREHOUSE_CONNECTION_URI).
    /// `memory:` only lasts for one process, so it is accepted by `run` alone.
    #[arg(long, global = true)]
    warehouse: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run ingest, transform and export in sequence
    Run(RunArgs),
    /// Load the input CSV into the customers_raw table
    Ingest(IngestArgs),
    /// Derive YOB from an ingested table and log age statistics
    Transform(TransformArgs),
    /// Write a transformed table to the output CSV
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input CSV (overrides CSV_FILE_PATH)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Output CSV (overrides OUTPUT_CSV_FILE_NAME)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Input CSV (overrides CSV_FILE_PATH)
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Table produced by `ingest`
    #[arg(long)]
    table: String,
    /// Print the outcome, including statistics, as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Table produced by `transform`
    #[arg(long)]
    table: String,
    /// Output CSV (overrides OUTPUT_CSV_FILE_NAME)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries table names and reports; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => handle_run(&cli, args).await,
        Command::Ingest(args) => handle_ingest(&cli, args).await,
        Command::Transform(args) => handle_transform(&cli, args).await,
        Command::Export(args) => handle_export(&cli, args).await,
    }
}

async fn handle_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let settings = resolve_settings(cli, args.input.clone(), args.output.clone())?;
    let config = settings.into_pipeline_config()?;
    let warehouse = connect_warehouse(&config.connection_uri).await?;

    let report = Pipeline::new(&config)
        .run(warehouse.as_ref())
        .await
        .context("pipeline run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }
    Ok(())
}

async fn handle_ingest(cli: &Cli, args: &IngestArgs) -> Result<()> {
    let settings = resolve_settings(cli, args.input.clone(), None)?;
    let warehouse = connect_stage_warehouse(settings.connection_uri()?).await?;

    let outcome = Ingest::from_path(settings.input_csv_path()?)
        .run(warehouse.as_ref())
        .await
        .context("ingest stage failed")?;

    info!(table = %outcome.table, rows_dropped = outcome.rows_dropped(), "ingest stage finished");
    println!("{}", outcome.table);
    Ok(())
}

async fn handle_transform(cli: &Cli, args: &TransformArgs) -> Result<()> {
    let settings = resolve_settings(cli, None, None)?;
    let warehouse = connect_stage_warehouse(settings.connection_uri()?).await?;

    let outcome = Transform
        .run(warehouse.as_ref(), &TableHandle::new(&args.table))
        .await
        .context("transform stage failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.table);
    }
    Ok(())
}

async fn handle_export(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let settings = resolve_settings(cli, None, args.output.clone())?;
    let warehouse = connect_stage_warehouse(settings.connection_uri()?).await?;

    let summary = Export::to_path(settings.output_csv_path()?)
        .run(warehouse.as_ref(), &TableHandle::new(&args.table))
        .await
        .context("export stage failed")?;

    println!(
        "Wrote {} rows to {} (blake3 {})",
        summary.rows,
        summary.path.display(),
        summary.digest
    );
    Ok(())
}

/// Command-line flags win over the config file, which wins over the environment.
fn resolve_settings(
    cli: &Cli,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<Settings> {
    let flags = Settings {
        connection_uri: cli.warehouse.clone(),
        input_csv_path: input,
        output_csv_path: output,
    };
    let file = match &cli.config {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::default(),
    };
    Ok(flags.or(file).or(Settings::from_env()))
}

async fn connect_warehouse(uri: &str) -> Result<Box<dyn Warehouse>> {
    open_warehouse(uri)
        .await
        .with_context(|| format!("failed to open warehouse '{uri}'"))
}

/// Per-stage commands hand tables to later processes, which a `memory:`
/// warehouse cannot do.
async fn connect_stage_warehouse(uri: &str) -> Result<Box<dyn Warehouse>> {
    if is_memory_uri(uri) {
        bail!("'{uri}' does not outlive this process; use `custflow run` or a sqlite: warehouse for per-stage commands");
    }
    connect_warehouse(uri).await
}

fn is_memory_uri(uri: &str) -> bool {
    uri.split_once(':')
        .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case("memory"))
}

fn print_run_report(report: &RunReport) {
    println!("Run {} finished at {}", report.run_id, report.finished_at.to_rfc3339());

    let mut stages = Table::new();
    stages.set_header(vec!["Stage", "Output", "Rows"]);
    stages.add_row(vec![
        "ingest".to_string(),
        report.ingest.table.to_string(),
        format!(
            "{} kept / {} read",
            report.ingest.rows_kept, report.ingest.rows_read
        ),
    ]);
    stages.add_row(vec![
        "transform".to_string(),
        report.transform.table.to_string(),
        report.transform.rows.to_string(),
    ]);
    stages.add_row(vec![
        "export".to_string(),
        report.export.path.display().to_string(),
        report.export.rows.to_string(),
    ]);
    println!("{stages}");

    println!("{}", stats_table(&report.transform));
}

fn stats_table(outcome: &TransformOutcome) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Segment", "Count", "Mean age", "Median age"]);
    for (segment, summary) in [
        ("male", &outcome.stats.male),
        ("female with child", &outcome.stats.female_with_child),
    ] {
        table.add_row(stats_row(segment, summary));
    }
    table
}

fn stats_row(segment: &str, summary: &AgeSummary) -> Vec<String> {
    let format_value = |value: Option<f64>| {
        value
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "n/a".to_string())
    };
    vec![
        segment.to_string(),
        summary.count.to_string(),
        format_value(summary.mean),
        format_value(summary.median),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file_and_environment() {
        let cli = Cli::try_parse_from([
            "custflow",
            "--warehouse",
            "sqlite://flag.db",
            "run",
            "--output",
            "flag.csv",
        ])
        .unwrap();
        let Command::Run(args) = &cli.command else {
            panic!("expected run command");
        };

        let settings = resolve_settings(&cli, args.input.clone(), args.output.clone()).unwrap();

        assert_eq!(settings.connection_uri().unwrap(), "sqlite://flag.db");
        assert_eq!(settings.output_csv_path().unwrap(), std::path::Path::new("flag.csv"));
    }

    #[test]
    fn transform_requires_a_table() {
        assert!(Cli::try_parse_from(["custflow", "transform"]).is_err());
        assert!(Cli::try_parse_from(["custflow", "transform", "--table", "customers_raw"]).is_ok());
    }

    #[tokio::test]
    async fn stage_commands_reject_memory_warehouse() {
        let err = connect_stage_warehouse("memory:").await.err().unwrap();
        assert!(err.to_string().contains("custflow run"), "{err}");

        assert!(is_memory_uri("MEMORY:"));
        assert!(!is_memory_uri("sqlite://memory.db"));
    }

    #[tokio::test]
    async fn run_accepts_memory_warehouse() {
        assert!(connect_warehouse("memory:").await.is_ok());
    }

    #[test]
    fn empty_segments_print_as_not_available() {
        let row = stats_row(
            "male",
            &AgeSummary {
                count: 0,
                mean: None,
                median: None,
            },
        );
        assert_eq!(row, vec!["male", "0", "n/a", "n/a"]);
    }
}
