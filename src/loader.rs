//! Batch loading and the annotation join.

use crate::annotation::{AnnotationTable, JoinKey};
use crate::config::BatchDescriptor;
use crate::error::{RecoveryError, Result};
use crate::plate_export::read_export;
use crate::reading::{AnnotatedReading, Reading, normalize_well, well_column};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

fn day_dir_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[Dd]ay_?(\d+)$").expect("static regex"))
}

fn parse_day_dir(name: &str) -> Option<i32> {
    day_dir_regex().captures(name)?.get(1)?.as_str().parse().ok()
}

/// Reads every `day<N>/<well>.txt` export below the batch folder.
pub fn load_batch(data_dir: &Path, batch: &BatchDescriptor) -> Result<Vec<Reading>> {
    let folder = data_dir.join(&batch.folder);
    if !folder.is_dir() {
        return Err(RecoveryError::Batch {
            folder,
            message: "not a directory".to_string(),
        });
    }

    let mut ret = vec![];
    let mut files = 0;
    let mut days_seen = 0;
    for entry in WalkDir::new(&folder)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            RecoveryError::io(&folder, source)
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.depth() == 1 {
            if entry.file_type().is_dir() && parse_day_dir(&name).is_some() {
                days_seen += 1;
            }
            continue;
        }
        let Some(day) = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| parse_day_dir(&n.to_string_lossy()))
        else {
            continue;
        };
        let Some(well) = name.strip_suffix(".txt").and_then(normalize_well) else {
            debug!("Skipping {}: not a well export", entry.path().display());
            continue;
        };
        files += 1;
        for row in read_export(entry.path())? {
            ret.push(Reading {
                date: batch.date.clone(),
                day,
                incubator: batch.incubator.clone(),
                well: well.clone(),
                heat: batch.heat.clone(),
                elapsed_secs: row.elapsed_secs,
                od: row.od,
                temperature: row.temperature,
            });
        }
    }

    if days_seen == 0 {
        return Err(RecoveryError::Batch {
            folder,
            message: "no day<N> directories".to_string(),
        });
    }
    info!(
        "Loaded {} readings from {files} exports in {} ({} days)",
        ret.len(),
        batch.folder,
        days_seen
    );
    Ok(ret)
}

pub fn load_batches(data_dir: &Path, batches: &[BatchDescriptor]) -> Result<Vec<Reading>> {
    let mut ret = vec![];
    for batch in batches {
        ret.extend(load_batch(data_dir, batch)?);
    }
    Ok(ret)
}

/// Drops every reading from `column` on one of `dates`. Either condition on
/// its own keeps the reading.
pub fn exclude_misinoculated(
    readings: Vec<Reading>,
    column: u32,
    dates: &[String],
) -> (Vec<Reading>, usize) {
    let before = readings.len();
    let kept: Vec<Reading> = readings
        .into_iter()
        .filter(|r| !(dates.contains(&r.date) && well_column(&r.well) == Some(column)))
        .collect();
    let excluded = before - kept.len();
    (kept, excluded)
}

/// Result of the left join: annotated rows, plus the readings that found no
/// annotation row.
#[derive(Clone, Debug, Default)]
pub struct JoinOutcome {
    pub rows: Vec<AnnotatedReading>,
    pub unannotated: Vec<Reading>,
}

impl JoinOutcome {
    pub fn unannotated_keys(&self) -> Vec<JoinKey> {
        let mut keys: Vec<JoinKey> = self.unannotated.iter().map(JoinKey::for_reading).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

pub fn join_annotation(readings: Vec<Reading>, table: &AnnotationTable) -> JoinOutcome {
    let mut ret = JoinOutcome::default();
    for reading in readings {
        match table.get(&JoinKey::for_reading(&reading)) {
            Some(annotation) => ret.rows.push(AnnotatedReading::new(reading, annotation.clone())),
            None => ret.unannotated.push(reading),
        }
    }
    ret
}

/// Logs readings that are still unannotated; they are left out of
/// classification because their richness is unknown.
pub fn report_unannotated(outcome: &JoinOutcome) -> usize {
    let count = outcome.unannotated.len();
    if count > 0 {
        let keys = outcome.unannotated_keys();
        warn!(
            "{count} readings in {} curves have no annotation and are excluded",
            keys.len()
        );
        for key in keys {
            warn!("  no annotation for {key}");
        }
    }
    count
}
