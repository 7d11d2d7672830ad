//! Growth cutoff selection and the extinction / contamination calls.
//!
//! Two candidate cutoffs come out of the baselined data:
//!
//! * the largest baselined OD of any well on the stress heat day, when every
//!   population is expected to be suppressed;
//! * the largest baselined OD of any clean blank, the true-negative ceiling.
//!
//! The blank ceiling is the stricter threshold and is the one used
//! ([`ThresholdPolicy::BlankCeiling`]). The heat-day candidate still has to
//! call strictly more extinctions than the blank ceiling; when it does not,
//! the data no longer behave the way the policy was validated on and the run
//! stops.

use crate::baseline::BaselineOutcome;
use crate::config::{PipelineConfig, ThresholdPolicy};
use crate::error::{RecoveryError, Result};
use crate::extremum::{max_per_group, min_per_group};
use crate::reading::BaselinedReading;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Candidates {
    pub heat_day_max: f64,
    pub blank_ceiling: f64,
}

impl Candidates {
    pub fn select(&self, policy: ThresholdPolicy) -> f64 {
        match policy {
            ThresholdPolicy::BlankCeiling => self.blank_ceiling,
            ThresholdPolicy::HeatDayMaximum => self.heat_day_max,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtinctionCall {
    pub uniq_id: String,
    /// Mean baselined OD in the recovery window that judged the well.
    pub window_mean: f64,
    /// Latest day with a late-window reading above the cutoff, if any.
    pub last_live_day: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContaminationCall {
    pub uniq_id: String,
    pub day: i32,
    pub detect_hours: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Classification {
    pub candidates: Candidates,
    pub policy: ThresholdPolicy,
    pub growth_cutoff: f64,
    pub heat_day_extinct: usize,
    pub blank_extinct: usize,
    pub extinct: Vec<ExtinctionCall>,
    pub contaminated: Vec<ContaminationCall>,
}

fn max_baselined<'a>(rows: impl Iterator<Item = &'a BaselinedReading>) -> Option<f64> {
    rows.map(|r| r.baselined_od).max_by(f64::total_cmp)
}

pub fn heat_day_candidate(rows: &[BaselinedReading], stress_heat_day: i32) -> Result<f64> {
    max_baselined(rows.iter().filter(|r| r.heat_day() == Some(stress_heat_day))).ok_or_else(|| {
        RecoveryError::Empty(format!("no baselined readings on heat day {stress_heat_day}"))
    })
}

/// `rows` must already exclude contaminated blanks.
pub fn blank_candidate(rows: &[BaselinedReading]) -> Result<f64> {
    max_baselined(rows.iter().filter(|r| r.is_blank()))
        .ok_or_else(|| RecoveryError::Empty("no uncontaminated blank readings".to_string()))
}

/// Mean baselined OD per inoculated well over its late recovery-day window.
pub fn recovery_window_means(
    rows: &[BaselinedReading],
    recovery_day: i32,
    window_start_hours: f64,
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for row in rows.iter().filter(|r| {
        !r.is_blank() && r.recov_day() == Some(recovery_day) && r.hours() > window_start_hours
    }) {
        let entry = sums.entry(row.uniq_id().to_string()).or_insert((0.0, 0));
        entry.0 += row.baselined_od;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(id, (sum, n))| (id, sum / n as f64))
        .collect()
}

/// Wells whose late recovery-window mean does not exceed `cutoff`. Raising
/// the cutoff can only add wells.
pub fn call_extinctions(
    rows: &[BaselinedReading],
    cutoff: f64,
    recovery_day: i32,
    window_start_hours: f64,
) -> Vec<ExtinctionCall> {
    let extinct: BTreeMap<String, f64> = recovery_window_means(rows, recovery_day, window_start_hours)
        .into_iter()
        .filter(|(_, mean)| *mean <= cutoff)
        .collect();

    // Scans every day, so a late false-positive crossing can yield a day
    // after the recovery day the well was judged on.
    let last_live = max_per_group(
        rows.iter().filter(|r| {
            !r.is_blank()
                && extinct.contains_key(r.uniq_id())
                && r.hours() > window_start_hours
                && r.baselined_od > cutoff
        }),
        |r| r.uniq_id().to_string(),
        |a, b| a.day().cmp(&b.day()),
    );

    extinct
        .into_iter()
        .map(|(uniq_id, window_mean)| ExtinctionCall {
            last_live_day: last_live.get(&uniq_id).map(|r| r.day()),
            uniq_id,
            window_mean,
        })
        .collect()
}

/// Earliest crossing above `cutoff` per blank well, ordered by day and then
/// elapsed time. Blanks that never cross are absent.
pub fn call_contamination<'a>(
    blanks: impl IntoIterator<Item = &'a BaselinedReading>,
    cutoff: f64,
) -> Vec<ContaminationCall> {
    min_per_group(
        blanks
            .into_iter()
            .filter(|r| r.is_blank() && r.baselined_od > cutoff),
        |r| r.uniq_id().to_string(),
        |a, b| {
            a.day()
                .cmp(&b.day())
                .then(a.source.reading.elapsed_secs.cmp(&b.source.reading.elapsed_secs))
        },
    )
    .into_iter()
    .map(|(uniq_id, r)| ContaminationCall {
        uniq_id,
        day: r.day(),
        detect_hours: r.hours(),
    })
    .collect()
}

/// The heat-day candidate must call strictly more extinctions than the
/// blank ceiling. Returns both counts.
pub fn check_candidate_ordering(
    rows: &[BaselinedReading],
    candidates: &Candidates,
    config: &PipelineConfig,
) -> Result<(usize, usize)> {
    let count = |cutoff: f64| {
        call_extinctions(
            rows,
            cutoff,
            config.extinction_recovery_day,
            config.extinction_window_start_hours,
        )
        .len()
    };
    let heat_day_extinct = count(candidates.heat_day_max);
    let blank_extinct = count(candidates.blank_ceiling);
    if candidates.heat_day_max <= candidates.blank_ceiling {
        warn!(
            "Heat-day candidate {} is not above the blank ceiling {}",
            candidates.heat_day_max, candidates.blank_ceiling
        );
    }
    if heat_day_extinct <= blank_extinct {
        return Err(RecoveryError::ThresholdOrdering {
            heat_day_cutoff: candidates.heat_day_max,
            heat_day_extinct,
            blank_cutoff: candidates.blank_ceiling,
            blank_extinct,
        });
    }
    Ok((heat_day_extinct, blank_extinct))
}

pub fn classify(baseline: &BaselineOutcome, config: &PipelineConfig) -> Result<Classification> {
    let rows = &baseline.baselined;
    let candidates = Candidates {
        heat_day_max: heat_day_candidate(rows, config.stress_heat_day)?,
        blank_ceiling: blank_candidate(rows)?,
    };
    let (heat_day_extinct, blank_extinct) = check_candidate_ordering(rows, &candidates, config)?;
    let growth_cutoff = candidates.select(config.threshold_policy);
    info!(
        "Cutoff candidates: heat day {} -> {:.4} ({heat_day_extinct} extinct), blank ceiling -> {:.4} ({blank_extinct} extinct); using {:.4}",
        config.stress_heat_day, candidates.heat_day_max, candidates.blank_ceiling, growth_cutoff
    );

    let extinct = call_extinctions(
        rows,
        growth_cutoff,
        config.extinction_recovery_day,
        config.extinction_window_start_hours,
    );
    let contaminated = call_contamination(
        rows.iter().chain(baseline.contaminated_blanks.iter()),
        growth_cutoff,
    );
    info!(
        "{} extinct wells ({} without late growth on any day), {} contaminated blanks",
        extinct.len(),
        extinct.iter().filter(|c| c.last_live_day.is_none()).count(),
        contaminated.len()
    );

    Ok(Classification {
        candidates,
        policy: config.threshold_policy,
        growth_cutoff,
        heat_day_extinct,
        blank_extinct,
        extinct,
        contaminated,
    })
}
