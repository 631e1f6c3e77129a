use polars::prelude::*;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::summary;
use crate::types::{
    AgeSummary, DemographicStats, TableHandle, TransformOutcome, AGE, CHILD, CLEAN_TABLE, DOB,
    GENDER, YOB,
};
use crate::warehouse::Warehouse;

const YEAR_WIDTH: usize = 4;

/// Second stage: replace `DOB` with a four-character `YOB`, persist as
/// `customers_clean` and log age statistics for two customer segments.
#[derive(Debug, Clone, Default)]
pub struct Transform;

impl Transform {
    pub fn new(_config: &PipelineConfig) -> Self {
        Self
    }

    pub async fn run(
        &self,
        warehouse: &dyn Warehouse,
        source: &TableHandle,
    ) -> Result<TransformOutcome> {
        info!(table = %source, "transforming customer table");

        let raw = warehouse.read_table(source.as_str()).await?;
        let clean = derive_birth_year(&raw)?;
        summary::log_frame("transform.output", &clean);

        // Nothing is persisted unless the stats can be computed.
        let stats = demographic_stats(&clean)?;
        warehouse.replace_table(CLEAN_TABLE, &clean).await?;
        log_stats(&stats);

        Ok(TransformOutcome {
            table: TableHandle::new(CLEAN_TABLE),
            rows: clean.height(),
            stats,
        })
    }
}

/// Appends `YOB`, the first four characters of `DOB` rendered as text, and
/// drops `DOB`. A missing `DOB` gives a missing `YOB`.
pub fn derive_birth_year(frame: &DataFrame) -> Result<DataFrame> {
    let derive = || -> PolarsResult<DataFrame> {
        let dob = frame.column(DOB)?.cast(&DataType::String)?;
        let years: StringChunked = dob
            .str()?
            .into_iter()
            .map(|value| value.map(|text| text.chars().take(YEAR_WIDTH).collect::<String>()))
            .collect();

        let mut derived = frame.drop(DOB)?;
        derived.with_column(years.with_name(YOB.into()).into_series())?;
        Ok(derived)
    };

    derive().map_err(|err| PipelineError::data_access("failed to derive birth year", err))
}

/// Age statistics for male customers and for female customers with children.
pub fn demographic_stats(frame: &DataFrame) -> Result<DemographicStats> {
    let compute = || -> PolarsResult<DemographicStats> {
        let gender = frame.column(GENDER)?.cast(&DataType::String)?;
        let child = frame.column(CHILD)?.cast(&DataType::String)?;

        let male = gender.str()?.equal("M");
        let female = gender.str()?.equal("F");
        let has_child = child.str()?.equal("Y");
        let female_with_child = &female & &has_child;

        Ok(DemographicStats {
            male: age_summary(frame, &male)?,
            female_with_child: age_summary(frame, &female_with_child)?,
        })
    };

    compute().map_err(|err| PipelineError::data_access("failed to compute age statistics", err))
}

fn age_summary(frame: &DataFrame, mask: &BooleanChunked) -> PolarsResult<AgeSummary> {
    let ages = frame
        .column(AGE)?
        .filter(mask)?
        .cast(&DataType::Float64)?;
    let ages = ages.f64()?;

    Ok(AgeSummary {
        count: ages.len() - ages.null_count(),
        mean: ages.mean(),
        median: ages.median(),
    })
}

fn log_stats(stats: &DemographicStats) {
    // An empty segment logs NaN rather than being skipped.
    info!(
        segment = "male",
        count = stats.male.count,
        age_mean = stats.male.mean.unwrap_or(f64::NAN),
        age_median = stats.male.median.unwrap_or(f64::NAN),
        "age statistics"
    );
    info!(
        segment = "female_with_child",
        count = stats.female_with_child.count,
        age_mean = stats.female_with_child.mean.unwrap_or(f64::NAN),
        age_median = stats.female_with_child.median.unwrap_or(f64::NAN),
        "age statistics"
    );
}
