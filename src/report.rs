//! Flat-file outputs and the final plotting set.

use crate::baseline::BaselineOutcome;
use crate::config::PipelineConfig;
use crate::error::{RecoveryError, Result};
use crate::reading::BaselinedReading;
use crate::threshold::{Classification, ContaminationCall, ExtinctionCall};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::info;

pub const EXTINCTION_FILE: &str = "extinct_wells.csv";
pub const CONTAMINATION_FILE: &str = "contaminated_blanks.csv";
pub const GROWTH_PROBABILITY_FILE: &str = "growth_probability.csv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Written for a missing last live day, matching the downstream reader.
pub const MISSING_VALUE: &str = "NA";

#[derive(Serialize)]
struct ExtinctionRow<'a> {
    #[serde(rename = "uniqID")]
    uniq_id: &'a str,
    day: String,
}

#[derive(Serialize)]
struct ContaminationRow<'a> {
    #[serde(rename = "uniqID")]
    uniq_id: &'a str,
    day: i32,
    #[serde(rename = "detectHr")]
    detect_hours: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GrowthProbability {
    pub richness: u32,
    pub day: i32,
    pub curves: usize,
    pub grown: usize,
    pub probability: f64,
}

/// Row counts and decisions of one run, written as `run_summary.json`.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub config: PipelineConfig,
    pub readings_loaded: usize,
    pub misinoculated_excluded: usize,
    pub annotation_rows: usize,
    pub annotation_duplicates_collapsed: usize,
    pub unannotated_readings: usize,
    pub baseline_buckets: usize,
    pub baseline_dropped: usize,
    pub contaminated_blank_curves: usize,
    pub classification: Classification,
    pub density_wells: usize,
    pub plotting_readings: usize,
    pub plotting_wells: usize,
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_path(path)
        .map_err(|e| RecoveryError::csv(path, e))
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>, header: &[&str]) -> Result<()> {
    let mut wtr = writer(path)?;
    let mut empty = true;
    for row in rows {
        wtr.serialize(row).map_err(|e| RecoveryError::csv(path, e))?;
        empty = false;
    }
    // serde only emits the header with the first row.
    if empty {
        wtr.write_record(header).map_err(|e| RecoveryError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| RecoveryError::io(path, e))
}

/// `uniqID,day` per extinct well, header first, unquoted, no index column.
pub fn write_extinctions(path: &Path, calls: &[ExtinctionCall]) -> Result<()> {
    write_rows(
        path,
        calls.iter().map(|c| ExtinctionRow {
            uniq_id: &c.uniq_id,
            day: c
                .last_live_day
                .map(|d| d.to_string())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
        }),
        &["uniqID", "day"],
    )
}

pub fn write_contamination(path: &Path, calls: &[ContaminationCall]) -> Result<()> {
    write_rows(
        path,
        calls.iter().map(|c| ContaminationRow {
            uniq_id: &c.uniq_id,
            day: c.day,
            detect_hours: c.detect_hours,
        }),
        &["uniqID", "day", "detectHr"],
    )
}

pub fn write_growth_probability(path: &Path, rows: &[GrowthProbability]) -> Result<()> {
    write_rows(
        path,
        rows,
        &["richness", "day", "curves", "grown", "probability"],
    )
}

pub fn write_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let text = serde_json::to_string_pretty(summary)?;
    fs::write(path, text).map_err(|e| RecoveryError::io(path, e))
}

/// Well identities listed in the finalized density table.
pub fn load_density_ids(path: &Path) -> Result<BTreeSet<String>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| RecoveryError::csv(path, e))?;
    let idx = rdr
        .headers()
        .map_err(|e| RecoveryError::csv(path, e))?
        .iter()
        .position(|h| h == "uniqID")
        .ok_or_else(|| RecoveryError::density(path, "missing column 'uniqID'"))?;
    let mut ret = BTreeSet::new();
    for record in rdr.records() {
        let record = record.map_err(|e| RecoveryError::csv(path, e))?;
        if let Some(id) = record.get(idx).filter(|id| !id.is_empty()) {
            ret.insert(id.to_string());
        }
    }
    Ok(ret)
}

/// The readings that go into the final plots. Two independent filters both
/// apply: wells this run called contaminated (plus contaminated blank
/// curves, already absent from `baseline.baselined`) are removed, and only
/// wells in the flow-cytometry density table are kept.
pub fn plotting_set<'a>(
    baseline: &'a BaselineOutcome,
    contaminated: &[ContaminationCall],
    density_ids: &BTreeSet<String>,
) -> Vec<&'a BaselinedReading> {
    let od_contaminated: BTreeSet<&str> = contaminated.iter().map(|c| c.uniq_id.as_str()).collect();
    baseline
        .baselined
        .iter()
        .filter(|r| !od_contaminated.contains(r.uniq_id()))
        .filter(|r| density_ids.contains(r.uniq_id()))
        .collect()
}

/// Share of inoculated curves per (richness, day) whose late-window maximum
/// exceeds the cutoff.
pub fn growth_probability(
    rows: &[&BaselinedReading],
    cutoff: f64,
    window_start_hours: f64,
) -> Vec<GrowthProbability> {
    let late_max: BTreeMap<String, (u32, i32, f64)> = rows
        .iter()
        .copied()
        .filter(|r| !r.is_blank() && r.hours() > window_start_hours)
        .into_group_map_by(|r| r.curve_id().to_string())
        .into_iter()
        .map(|(curve, readings)| {
            let max = readings
                .iter()
                .map(|r| r.baselined_od)
                .fold(f64::NEG_INFINITY, f64::max);
            (curve, (readings[0].richness(), readings[0].day(), max))
        })
        .collect();

    let mut counts: BTreeMap<(u32, i32), (usize, usize)> = BTreeMap::new();
    for (richness, day, max) in late_max.values() {
        let entry = counts.entry((*richness, *day)).or_insert((0, 0));
        entry.0 += 1;
        if *max > cutoff {
            entry.1 += 1;
        }
    }
    counts
        .into_iter()
        .map(|((richness, day), (curves, grown))| GrowthProbability {
            richness,
            day,
            curves,
            grown,
            probability: grown as f64 / curves as f64,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtinctionShare {
    pub richness: u32,
    pub wells: usize,
    pub extinct: usize,
}

/// Inoculated wells of the plotting set per richness, and how many of them
/// were called extinct.
pub fn extinction_by_richness(
    rows: &[&BaselinedReading],
    extinct: &[ExtinctionCall],
) -> Vec<ExtinctionShare> {
    let extinct: BTreeSet<&str> = extinct.iter().map(|c| c.uniq_id.as_str()).collect();
    let mut richness_of: BTreeMap<&str, u32> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_blank()) {
        let richness = richness_of.entry(row.uniq_id()).or_insert(0);
        *richness = (*richness).max(row.richness());
    }
    let mut shares: BTreeMap<u32, ExtinctionShare> = BTreeMap::new();
    for (uniq_id, richness) in richness_of {
        let share = shares.entry(richness).or_insert(ExtinctionShare {
            richness,
            wells: 0,
            extinct: 0,
        });
        share.wells += 1;
        if extinct.contains(uniq_id) {
            share.extinct += 1;
        }
    }
    shares.into_values().collect()
}

pub fn write_tables(
    out_dir: &Path,
    classification: &Classification,
    growth: &[GrowthProbability],
) -> Result<()> {
    write_extinctions(&out_dir.join(EXTINCTION_FILE), &classification.extinct)?;
    write_contamination(&out_dir.join(CONTAMINATION_FILE), &classification.contaminated)?;
    write_growth_probability(&out_dir.join(GROWTH_PROBABILITY_FILE), growth)?;
    info!(
        "Wrote {} extinct wells and {} contaminated blanks to {}",
        classification.extinct.len(),
        classification.contaminated.len(),
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::estimate_baseline;
    use crate::baseline::tests::row;
    use tempfile::tempdir;

    #[test]
    fn test_extinction_file_format() {
        let td = tempdir().unwrap();
        let path = td.path().join(EXTINCTION_FILE);
        let calls = vec![
            ExtinctionCall {
                uniq_id: "230412_A_B2".to_string(),
                window_mean: 0.0,
                last_live_day: Some(3),
            },
            ExtinctionCall {
                uniq_id: "230412_A_B3".to_string(),
                window_mean: 0.0,
                last_live_day: None,
            },
        ];
        write_extinctions(&path, &calls).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "uniqID,day\n230412_A_B2,3\n230412_A_B3,NA\n");
    }

    #[test]
    fn test_empty_tables_still_have_a_header() {
        let td = tempdir().unwrap();
        let path = td.path().join(CONTAMINATION_FILE);
        write_contamination(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "uniqID,day,detectHr\n");
    }

    #[test]
    fn test_plotting_set_applies_both_filters() {
        let rows = vec![
            row("A1", 1, 0, 0.2, 0),
            row("A2", 1, 0, 0.2, 0),
            row("B1", 1, 0, 0.5, 1),
            row("B2", 1, 0, 0.5, 1),
        ];
        let baseline = estimate_baseline(&rows, 1.0);
        let contaminated = vec![ContaminationCall {
            uniq_id: "230412_A_A2".to_string(),
            day: 1,
            detect_hours: 0.0,
        }];
        let density: BTreeSet<String> = ["230412_A_A1", "230412_A_A2", "230412_A_B1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let kept: Vec<&str> = plotting_set(&baseline, &contaminated, &density)
            .iter()
            .map(|r| r.uniq_id())
            .collect();
        assert_eq!(kept, vec!["230412_A_A1", "230412_A_B1"]);
    }

    #[test]
    fn test_growth_probability_per_richness_and_day() {
        let rows = vec![
            row("A1", 1, 21 * 3600, 0.1, 0),
            row("B1", 1, 21 * 3600, 0.5, 1),
            row("B2", 1, 21 * 3600, 0.1, 1),
            row("B2", 1, 10 * 3600, 0.9, 1),
            row("B3", 1, 19 * 3600, 0.5, 1),
        ];
        let baseline = estimate_baseline(&rows, 1.0);
        let all: Vec<&BaselinedReading> = baseline.baselined.iter().collect();
        let summary = growth_probability(&all, 0.05, 20.0);
        assert_eq!(
            summary,
            vec![GrowthProbability {
                richness: 1,
                day: 1,
                curves: 2,
                grown: 1,
                probability: 0.5,
            }]
        );
    }

    #[test]
    fn test_extinction_share_counts_wells_once() {
        let rows = vec![
            row("A1", 1, 0, 0.1, 0),
            row("B1", 1, 0, 0.1, 1),
            row("B1", 2, 0, 0.1, 1),
            row("B2", 1, 0, 0.1, 1),
            row("C1", 1, 0, 0.1, 3),
        ];
        let baseline = estimate_baseline(&rows, 1.0);
        let all: Vec<&BaselinedReading> = baseline.baselined.iter().collect();
        let extinct = vec![ExtinctionCall {
            uniq_id: "230412_A_B2".to_string(),
            window_mean: 0.0,
            last_live_day: None,
        }];
        let shares = extinction_by_richness(&all, &extinct);
        assert_eq!(
            shares,
            vec![
                ExtinctionShare {
                    richness: 1,
                    wells: 2,
                    extinct: 1
                },
                ExtinctionShare {
                    richness: 3,
                    wells: 1,
                    extinct: 0
                },
            ]
        );
    }

    #[test]
    fn test_density_ids() {
        let td = tempdir().unwrap();
        let path = td.path().join("density.csv");
        fs::write(&path, "sample,uniqID,cells\nx,230412_A_B1,10\ny,,3\nz,230412_A_B2,4\n").unwrap();
        let ids = load_density_ids(&path).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("230412_A_B2"));
    }

    #[test]
    fn test_density_table_without_id_column_is_named() {
        let td = tempdir().unwrap();
        let path = td.path().join("finalized_density.csv");
        fs::write(&path, "sample,cells
x,10
").unwrap();
        let err = load_density_ids(&path).unwrap_err();
        assert!(matches!(err, RecoveryError::Density { .. }));
        let msg = err.to_string();
        assert!(msg.starts_with("Bad density table"));
        assert!(msg.contains("finalized_density.csv"));
    }
}
