//! Blank-median baseline.
//!
//! Blank OD drifts with condensation that follows the incubator temperature.
//! The drift is shared by every well of a plate at a given read, so the
//! median of the clean blanks at each (date, day, incubator, time) is
//! subtracted from every reading taken at that moment.

use crate::reading::{AnnotatedReading, BaselinedReading};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub date: String,
    pub day: i32,
    pub incubator: String,
    pub elapsed_secs: u32,
}

impl BucketKey {
    pub fn of(row: &AnnotatedReading) -> Self {
        Self {
            date: row.reading.date.clone(),
            day: row.reading.day,
            incubator: row.reading.incubator.clone(),
            elapsed_secs: row.reading.elapsed_secs,
        }
    }

    pub fn hours(&self) -> f64 {
        self.elapsed_secs as f64 / 3600.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlankMedian {
    pub median_od: f64,
    pub blanks: usize,
}

/// Output of [`estimate_baseline`].
#[derive(Clone, Debug, Default)]
pub struct BaselineOutcome {
    /// Every reading except those of contaminated blank curves.
    pub baselined: Vec<BaselinedReading>,
    /// Contaminated blank curves, baselined the same way.
    pub contaminated_blanks: Vec<BaselinedReading>,
    pub medians: BTreeMap<BucketKey, BlankMedian>,
    pub contaminated_curves: BTreeSet<String>,
    /// Readings dropped because no clean blank was read at that moment.
    pub dropped: usize,
}

/// Median with the even-count convention of averaging the middle pair.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Blank curves that read above `max_od` at any point.
pub fn contaminated_blank_curves(rows: &[AnnotatedReading], max_od: f64) -> BTreeSet<String> {
    rows.iter()
        .filter(|r| r.is_blank() && r.reading.od > max_od)
        .map(|r| r.curve_id.clone())
        .collect()
}

pub fn blank_medians(
    rows: &[AnnotatedReading],
    excluded_curves: &BTreeSet<String>,
) -> BTreeMap<BucketKey, BlankMedian> {
    rows.iter()
        .filter(|r| r.is_blank() && !excluded_curves.contains(&r.curve_id))
        .into_group_map_by(|r| BucketKey::of(r))
        .into_iter()
        .filter_map(|(key, blanks)| {
            let ods: Vec<f64> = blanks.iter().map(|r| r.reading.od).collect();
            let median_od = median(&ods)?;
            Some((
                key,
                BlankMedian {
                    median_od,
                    blanks: ods.len(),
                },
            ))
        })
        .collect()
}

/// Inner join on the bucket key. Returns the baselined rows and the number
/// of rows without a bucket.
pub fn subtract_baseline<'a>(
    rows: impl IntoIterator<Item = &'a AnnotatedReading>,
    medians: &BTreeMap<BucketKey, BlankMedian>,
) -> (Vec<BaselinedReading>, usize) {
    let lookup: HashMap<&BucketKey, f64> = medians.iter().map(|(k, m)| (k, m.median_od)).collect();
    let mut dropped = 0;
    let mut ret = vec![];
    for row in rows {
        match lookup.get(&BucketKey::of(row)) {
            Some(median_od) => ret.push(BaselinedReading {
                source: row.clone(),
                median_od: *median_od,
                baselined_od: row.reading.od - median_od,
            }),
            None => dropped += 1,
        }
    }
    (ret, dropped)
}

pub fn estimate_baseline(rows: &[AnnotatedReading], blank_max_od: f64) -> BaselineOutcome {
    let contaminated_curves = contaminated_blank_curves(rows, blank_max_od);
    let medians = blank_medians(rows, &contaminated_curves);
    let is_contaminated = |r: &&AnnotatedReading| contaminated_curves.contains(&r.curve_id);

    let (baselined, dropped_clean) = subtract_baseline(
        rows.iter().filter(|r| !is_contaminated(r)),
        &medians,
    );
    let (contaminated_blanks, dropped_contaminated) =
        subtract_baseline(rows.iter().filter(is_contaminated), &medians);
    let dropped = dropped_clean + dropped_contaminated;

    info!(
        "Baseline: {} buckets, {} contaminated blank curves, {} readings kept, {dropped} dropped without a bucket",
        medians.len(),
        contaminated_curves.len(),
        baselined.len()
    );
    for curve in &contaminated_curves {
        debug!("Blank curve {curve} exceeds OD {blank_max_od}; excluded from the median");
    }

    BaselineOutcome {
        baselined,
        contaminated_blanks,
        medians,
        contaminated_curves,
        dropped,
    }
}
