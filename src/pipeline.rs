//! The four stages, run once in order.
//!
//! Load and join, baseline, classify, report. Each stage returns a new table;
//! nothing earlier is modified. Any error aborts the run.

use crate::about;
use crate::annotation::AnnotationTable;
use crate::baseline::estimate_baseline;
use crate::config::PipelineConfig;
use crate::error::{RecoveryError, Result};
use crate::loader::{exclude_misinoculated, join_annotation, load_batches, report_unannotated};
use crate::plot;
use crate::repair::apply_annotation_repair;
use crate::report::{self, RunSummary};
use crate::threshold::classify;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn run_pipeline(data_dir: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<RunSummary> {
    fs::create_dir_all(out_dir).map_err(|e| RecoveryError::io(out_dir, e))?;

    // Loader/Joiner
    let readings = load_batches(data_dir, &config.batches)?;
    let readings_loaded = readings.len();
    let (readings, misinoculated_excluded) = exclude_misinoculated(
        readings,
        config.misinoculated_column,
        &config.misinoculated_column_dates,
    );
    info!(
        "{readings_loaded} readings loaded, {misinoculated_excluded} dropped from column {} on {:?}",
        config.misinoculated_column, config.misinoculated_column_dates
    );
    let annotation = AnnotationTable::from_csv_path(&data_dir.join(&config.annotation_file))?;
    info!(
        "{} annotation rows ({} exact duplicates collapsed)",
        annotation.len(),
        annotation.collapsed_duplicates()
    );
    let mut joined = join_annotation(readings, &annotation);
    if let Some(repair) = &config.annotation_repair {
        joined = apply_annotation_repair(repair, &annotation, joined)?;
    }
    let unannotated_readings = report_unannotated(&joined);
    if joined.rows.is_empty() {
        return Err(RecoveryError::Empty("no annotated readings".to_string()));
    }

    // Baseline Estimator
    let baseline = estimate_baseline(&joined.rows, config.blank_sanity_max_od);

    // Threshold Classifier
    let classification = classify(&baseline, config)?;

    // Reporter
    let density_ids = report::load_density_ids(&data_dir.join(&config.density_file))?;
    let plotting = report::plotting_set(&baseline, &classification.contaminated, &density_ids);
    let plotting_wells = plotting
        .iter()
        .map(|r| r.uniq_id())
        .collect::<BTreeSet<_>>()
        .len();
    info!(
        "Plotting set: {} readings from {plotting_wells} wells ({} wells in the density table)",
        plotting.len(),
        density_ids.len()
    );
    let growth = report::growth_probability(
        &plotting,
        classification.growth_cutoff,
        config.growth_window_start_hours,
    );
    report::write_tables(out_dir, &classification, &growth)?;

    plot::write_svg(
        &out_dir.join(plot::BLANK_BASELINE_FILE),
        &plot::blank_baseline_svg(&baseline.medians),
    )?;
    plot::write_svg(
        &out_dir.join(plot::BASELINED_CURVES_FILE),
        &plot::baselined_curves_svg(&plotting, classification.growth_cutoff),
    )?;
    plot::write_svg(
        &out_dir.join(plot::EXTINCTION_BY_RICHNESS_FILE),
        &plot::extinction_by_richness_svg(&report::extinction_by_richness(
            &plotting,
            &classification.extinct,
        )),
    )?;

    let summary = RunSummary {
        version: about::version_text(),
        config: config.clone(),
        readings_loaded,
        misinoculated_excluded,
        annotation_rows: annotation.len(),
        annotation_duplicates_collapsed: annotation.collapsed_duplicates(),
        unannotated_readings,
        baseline_buckets: baseline.medians.len(),
        baseline_dropped: baseline.dropped,
        contaminated_blank_curves: baseline.contaminated_curves.len(),
        density_wells: density_ids.len(),
        plotting_readings: plotting.len(),
        plotting_wells,
        classification,
    };
    report::write_run_summary(&out_dir.join(report::RUN_SUMMARY_FILE), &summary)?;
    info!("Run summary written to {}", out_dir.display());
    Ok(summary)
}
