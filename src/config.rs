//! Fixed policy values for the recovery pipeline.
//!
//! Everything the analysis decides by fiat lives here, so adding a batch or
//! re-validating a cutoff is a change to one file. [`PipelineConfig`] is
//! written verbatim into `run_summary.json`.

use serde::{Deserialize, Serialize};

/// Blank readings above this raw OD mark their curve as contaminated; such
/// curves never contribute to the blank median.
pub const BLANK_SANITY_MAX_OD: f64 = 1.0;

/// Heat-treatment day used for the stressed-population candidate threshold.
pub const STRESS_HEAT_DAY: i32 = 3;

/// Recovery day on which extinction is judged.
pub const EXTINCTION_RECOVERY_DAY: i32 = 2;

/// Only readings strictly after this elapsed time count towards extinction.
pub const EXTINCTION_WINDOW_START_HOURS: f64 = 22.0;

/// Only readings strictly after this elapsed time count towards the growth
/// probability summary.
pub const GROWTH_WINDOW_START_HOURS: f64 = 20.0;

/// Plate column that was mis-inoculated on [`MISINOCULATED_COLUMN_DATES`].
pub const MISINOCULATED_COLUMN: u32 = 8;
pub const MISINOCULATED_COLUMN_DATES: &[&str] = &["230419", "230503"];

pub const ANNOTATION_FILE: &str = "annotation.csv";
pub const DENSITY_FILE: &str = "finalized_density.csv";

/// One plate-reader run: a folder of `day<N>/<well>.txt` exports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    /// Relative to the data directory.
    pub folder: String,
    pub incubator: String,
    /// Heat-duration label, part of the annotation join key.
    pub heat: String,
    pub date: String,
}

impl BatchDescriptor {
    pub fn new(folder: &str, incubator: &str, heat: &str, date: &str) -> Self {
        Self {
            folder: folder.to_string(),
            incubator: incubator.to_string(),
            heat: heat.to_string(),
            date: date.to_string(),
        }
    }
}

/// The single well-day whose annotation was never recorded.
///
/// This is a data repair for one known gap, not a rule. Set
/// [`PipelineConfig::annotation_repair`] to `None` to run without it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRepair {
    pub date: String,
    pub incubator: String,
    pub well: String,
    pub heat: String,
    pub day: i32,
}

/// Which candidate becomes the growth cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Maximum baselined OD over uncontaminated blanks.
    BlankCeiling,
    /// Maximum baselined OD over every well on the stress heat day.
    HeatDayMaximum,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub batches: Vec<BatchDescriptor>,
    pub annotation_file: String,
    pub density_file: String,
    pub misinoculated_column: u32,
    pub misinoculated_column_dates: Vec<String>,
    pub annotation_repair: Option<AnnotationRepair>,
    pub blank_sanity_max_od: f64,
    pub stress_heat_day: i32,
    pub extinction_recovery_day: i32,
    pub extinction_window_start_hours: f64,
    pub growth_window_start_hours: f64,
    /// Validated against the flow-cytometry calls; fixed, not chosen per run.
    pub threshold_policy: ThresholdPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batches: vec![
                BatchDescriptor::new("raw/230412_incA_6h", "A", "6h", "230412"),
                BatchDescriptor::new("raw/230412_incB_12h", "B", "12h", "230412"),
                BatchDescriptor::new("raw/230419_incA_6h", "A", "6h", "230419"),
                BatchDescriptor::new("raw/230419_incB_12h", "B", "12h", "230419"),
                BatchDescriptor::new("raw/230503_incA_24h", "A", "24h", "230503"),
                BatchDescriptor::new("raw/230503_incB_48h", "B", "48h", "230503"),
            ],
            annotation_file: ANNOTATION_FILE.to_string(),
            density_file: DENSITY_FILE.to_string(),
            misinoculated_column: MISINOCULATED_COLUMN,
            misinoculated_column_dates: MISINOCULATED_COLUMN_DATES
                .iter()
                .map(|d| d.to_string())
                .collect(),
            annotation_repair: Some(AnnotationRepair {
                date: "230412".to_string(),
                incubator: "B".to_string(),
                well: "E5".to_string(),
                heat: "12h".to_string(),
                day: 4,
            }),
            blank_sanity_max_od: BLANK_SANITY_MAX_OD,
            stress_heat_day: STRESS_HEAT_DAY,
            extinction_recovery_day: EXTINCTION_RECOVERY_DAY,
            extinction_window_start_hours: EXTINCTION_WINDOW_START_HOURS,
            growth_window_start_hours: GROWTH_WINDOW_START_HOURS,
            threshold_policy: ThresholdPolicy::BlankCeiling,
        }
    }
}
