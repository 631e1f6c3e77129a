use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::Ingest;
use crate::outputs::Export;
use crate::processing::Transform;
use crate::types::{ExportSummary, IngestOutcome, TransformOutcome};
use crate::warehouse::Warehouse;

/// Everything observable about one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ingest: IngestOutcome,
    pub transform: TransformOutcome,
    pub export: ExportSummary,
}

/// Runs ingest, transform and export in order, handing each stage's table to
/// the next. Any stage error aborts the run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    ingest: Ingest,
    transform: Transform,
    export: Export,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            ingest: Ingest::new(config),
            transform: Transform::new(config),
            export: Export::new(config),
        }
    }

    pub async fn run(&self, warehouse: &dyn Warehouse) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        async move {
            info!("pipeline run started");

            let ingest = self.ingest.run(warehouse).await?;
            let transform = self.transform.run(warehouse, &ingest.table).await?;
            let export = self.export.run(warehouse, &transform.table).await?;

            let finished_at = Utc::now();
            info!(
                elapsed_ms = (finished_at - started_at).num_milliseconds(),
                "pipeline run finished"
            );

            Ok(RunReport {
                run_id,
                started_at,
                finished_at,
                ingest,
                transform,
                export,
            })
        }
        .instrument(info_span!("pipeline_run", run_id = %run_id))
        .await
    }
}
