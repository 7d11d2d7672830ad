//! One-off repair for the single well-day whose annotation was never
//! recorded.
//!
//! The missing row is rebuilt from two donors: the same well on a later day
//! supplies species and richness, and other wells of the same date and day
//! with that richness supply the heat schedule. Nothing here generalizes to
//! other gaps; any other unannotated reading is left for
//! [`crate::loader::report_unannotated`].

use crate::annotation::{Annotation, AnnotationTable, JoinKey};
use crate::config::AnnotationRepair;
use crate::error::{RecoveryError, Result};
use crate::loader::JoinOutcome;
use crate::reading::{AnnotatedReading, Reading, uniq_id};
use std::rc::Rc;
use tracing::{info, warn};

impl AnnotationRepair {
    pub fn uniq_id(&self) -> String {
        uniq_id(&self.date, &self.incubator, &self.well)
    }

    pub fn join_key(&self) -> JoinKey {
        JoinKey {
            uniq_id: self.uniq_id(),
            well: self.well.clone(),
            date: self.date.clone(),
            day: self.day,
            incubator: self.incubator.clone(),
            heat: self.heat.clone(),
        }
    }

    fn matches(&self, reading: &Reading) -> bool {
        reading.date == self.date
            && reading.incubator == self.incubator
            && reading.well == self.well
            && reading.heat == self.heat
            && reading.day == self.day
    }
}

/// Species flags and richness from the earliest later day of the same well.
fn species_donor<'a>(repair: &AnnotationRepair, table: &'a AnnotationTable) -> Result<&'a Annotation> {
    let id = repair.uniq_id();
    let later: Vec<&Annotation> = table
        .iter()
        .map(|a| a.as_ref())
        .filter(|a| a.key.uniq_id == id && a.key.day > repair.day)
        .collect();
    let Some(first) = later.iter().min_by_key(|a| a.key.day).copied() else {
        return Err(RecoveryError::Repair(format!(
            "no later-day annotation for {id} after day {}",
            repair.day
        )));
    };
    if let Some(other) = later
        .iter()
        .find(|a| a.species != first.species || a.richness != first.richness)
    {
        return Err(RecoveryError::Repair(format!(
            "{id} changes inoculum between day {} and day {}",
            first.key.day, other.key.day
        )));
    }
    Ok(first)
}

/// Heat and recovery day indices shared by the other wells of that plate day.
fn schedule_donor(
    repair: &AnnotationRepair,
    richness: u32,
    table: &AnnotationTable,
) -> Result<(Option<i32>, Option<i32>)> {
    let id = repair.uniq_id();
    let mut schedules: Vec<(Option<i32>, Option<i32>)> = table
        .iter()
        .filter(|a| {
            a.key.date == repair.date
                && a.key.day == repair.day
                && a.key.uniq_id != id
                && a.richness == richness
        })
        .map(|a| (a.heat_day, a.recov_day))
        .collect();
    schedules.sort();
    schedules.dedup();
    match schedules.as_slice() {
        [schedule] => Ok(*schedule),
        [] => Err(RecoveryError::Repair(format!(
            "no richness-{richness} well on {} day {} to copy the heat schedule from",
            repair.date, repair.day
        ))),
        _ => Err(RecoveryError::Repair(format!(
            "richness-{richness} wells on {} day {} disagree on the heat schedule: {schedules:?}",
            repair.date, repair.day
        ))),
    }
}

pub fn rebuild_annotation(repair: &AnnotationRepair, table: &AnnotationTable) -> Result<Annotation> {
    let donor = species_donor(repair, table)?;
    let (heat_day, recov_day) = schedule_donor(repair, donor.richness, table)?;
    Ok(Annotation {
        key: repair.join_key(),
        species: donor.species.clone(),
        richness: donor.richness,
        heat_day,
        recov_day,
    })
}

/// Replaces the unannotated readings of the repaired well-day with annotated
/// ones. A repair target that is already annotated, or has no readings, is
/// left alone with a warning.
pub fn apply_annotation_repair(
    repair: &AnnotationRepair,
    table: &AnnotationTable,
    outcome: JoinOutcome,
) -> Result<JoinOutcome> {
    let key = repair.join_key();
    if table.get(&key).is_some() {
        warn!("Annotation repair target {key} is already annotated; repair skipped");
        return Ok(outcome);
    }
    let (targets, unannotated): (Vec<Reading>, Vec<Reading>) = outcome
        .unannotated
        .into_iter()
        .partition(|r| repair.matches(r));
    if targets.is_empty() {
        warn!("Annotation repair target {key} has no readings; repair skipped");
        return Ok(JoinOutcome {
            rows: outcome.rows,
            unannotated,
        });
    }

    let annotation = Rc::new(rebuild_annotation(repair, table)?);
    info!(
        "Repaired annotation for {key}: richness {}, heat day {:?}, recovery day {:?} ({} readings)",
        annotation.richness,
        annotation.heat_day,
        annotation.recov_day,
        targets.len()
    );
    let mut rows = outcome.rows;
    rows.extend(
        targets
            .into_iter()
            .map(|r| AnnotatedReading::new(r, annotation.clone())),
    );
    Ok(JoinOutcome { rows, unannotated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::join_annotation;
    use std::collections::BTreeMap;

    fn repair() -> AnnotationRepair {
        AnnotationRepair {
            date: "230412".to_string(),
            incubator: "B".to_string(),
            well: "E5".to_string(),
            heat: "12h".to_string(),
            day: 4,
        }
    }

    fn annotation(well: &str, day: i32, richness: u32, schedule: (Option<i32>, Option<i32>)) -> Annotation {
        let mut species = BTreeMap::new();
        species.insert("Pputida".to_string(), richness > 0);
        species.insert("Ecoli".to_string(), richness > 1);
        Annotation {
            key: JoinKey {
                uniq_id: uniq_id("230412", "B", well),
                well: well.to_string(),
                date: "230412".to_string(),
                day,
                incubator: "B".to_string(),
                heat: "12h".to_string(),
            },
            species,
            richness,
            heat_day: schedule.0,
            recov_day: schedule.1,
        }
    }

    fn reading(well: &str, day: i32) -> Reading {
        Reading {
            date: "230412".to_string(),
            day,
            incubator: "B".to_string(),
            well: well.to_string(),
            heat: "12h".to_string(),
            elapsed_secs: 3600,
            od: 0.2,
            temperature: None,
        }
    }

    fn table() -> AnnotationTable {
        let mut table = AnnotationTable::default();
        table.insert(annotation("E5", 5, 2, (None, Some(2)))).unwrap();
        table.insert(annotation("E5", 6, 2, (None, Some(3)))).unwrap();
        table.insert(annotation("E6", 4, 2, (None, Some(1)))).unwrap();
        table.insert(annotation("E7", 4, 1, (Some(3), None))).unwrap();
        table
    }

    #[test]
    fn test_rebuild_copies_later_species_and_same_day_schedule() {
        let rebuilt = rebuild_annotation(&repair(), &table()).unwrap();
        assert_eq!(rebuilt.key.day, 4);
        assert_eq!(rebuilt.richness, 2);
        assert_eq!(rebuilt.species.get("Ecoli"), Some(&true));
        assert_eq!((rebuilt.heat_day, rebuilt.recov_day), (None, Some(1)));
    }

    #[test]
    fn test_apply_moves_target_readings_only() {
        let table = table();
        let outcome = join_annotation(
            vec![reading("E5", 4), reading("E5", 4), reading("F1", 4), reading("E6", 4)],
            &table,
        );
        assert_eq!(outcome.unannotated.len(), 3);
        let repaired = apply_annotation_repair(&repair(), &table, outcome).unwrap();
        assert_eq!(repaired.rows.len(), 3);
        assert_eq!(repaired.unannotated.len(), 1);
        assert_eq!(repaired.unannotated[0].well, "F1");
        assert!(repaired
            .rows
            .iter()
            .filter(|r| r.reading.well == "E5")
            .all(|r| r.annotation.recov_day == Some(1)));
    }

    #[test]
    fn test_already_annotated_target_is_left_alone() {
        let mut table = table();
        table.insert(annotation("E5", 4, 2, (Some(3), None))).unwrap();
        let outcome = join_annotation(vec![reading("E5", 4), reading("F1", 4)], &table);
        let repaired = apply_annotation_repair(&repair(), &table, outcome).unwrap();
        assert_eq!(repaired.rows.len(), 1);
        assert_eq!(repaired.rows[0].annotation.heat_day, Some(3));
        assert_eq!(repaired.unannotated.len(), 1);
    }

    #[test]
    fn test_target_without_readings_is_skipped() {
        // No donors either: a skipped repair must not try to rebuild the row.
        let table = AnnotationTable::default();
        let outcome = join_annotation(vec![reading("F1", 4), reading("E5", 3)], &table);
        let repaired = apply_annotation_repair(&repair(), &table, outcome).unwrap();
        assert!(repaired.rows.is_empty());
        assert_eq!(repaired.unannotated.len(), 2);
    }

    #[test]
    fn test_disagreeing_schedule_donors_fail() {
        let mut table = table();
        table.insert(annotation("E8", 4, 2, (None, Some(2)))).unwrap();
        let err = rebuild_annotation(&repair(), &table).unwrap_err();
        assert!(err.to_string().contains("disagree"));
    }

    #[test]
    fn test_missing_later_day_fails() {
        let mut table = AnnotationTable::default();
        table.insert(annotation("E6", 4, 2, (None, Some(1)))).unwrap();
        let err = rebuild_annotation(&repair(), &table).unwrap_err();
        assert!(err.to_string().contains("no later-day annotation"));
    }
}
