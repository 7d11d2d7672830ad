use crate::annotation::Annotation;
use regex::Regex;
use std::rc::Rc;
use std::sync::OnceLock;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Identity of one physical well across the whole experiment.
pub fn uniq_id(date: &str, incubator: &str, well: &str) -> String {
    format!("{date}_{incubator}_{well}")
}

/// Identity of one continuous time series (one well on one day).
pub fn curve_id(uniq_id: &str, day: i32) -> String {
    format!("{uniq_id}_{day}")
}

fn well_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Ha-h])(1[0-2]|0?[1-9])$").expect("static regex"))
}

/// Normalizes a 96-well plate id (`a01` -> `A1`). `None` for anything else.
pub fn normalize_well(text: &str) -> Option<String> {
    let caps = well_regex().captures(text.trim())?;
    let row = caps.get(1)?.as_str().to_ascii_uppercase();
    let column: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(format!("{row}{column}"))
}

pub fn well_column(well: &str) -> Option<u32> {
    let caps = well_regex().captures(well.trim())?;
    caps.get(2)?.as_str().parse().ok()
}

/// One plate-reader measurement, tagged with its batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub date: String,
    pub day: i32,
    pub incubator: String,
    pub well: String,
    pub heat: String,
    /// Whole seconds since the start of the day's run. Used as an exact key.
    pub elapsed_secs: u32,
    pub od: f64,
    pub temperature: Option<f64>,
}

impl Reading {
    #[inline(always)]
    pub fn hours(&self) -> f64 {
        self.elapsed_secs as f64 / SECONDS_PER_HOUR
    }

    pub fn uniq_id(&self) -> String {
        uniq_id(&self.date, &self.incubator, &self.well)
    }
}

/// A reading with its annotation attached.
#[derive(Clone, Debug)]
pub struct AnnotatedReading {
    pub reading: Reading,
    pub uniq_id: String,
    pub curve_id: String,
    pub annotation: Rc<Annotation>,
}

impl AnnotatedReading {
    pub fn new(reading: Reading, annotation: Rc<Annotation>) -> Self {
        let uniq_id = reading.uniq_id();
        let curve_id = curve_id(&uniq_id, reading.day);
        Self {
            reading,
            uniq_id,
            curve_id,
            annotation,
        }
    }

    #[inline(always)]
    pub fn is_blank(&self) -> bool {
        self.annotation.richness == 0
    }
}

/// An annotated reading after blank-median subtraction.
#[derive(Clone, Debug)]
pub struct BaselinedReading {
    pub source: AnnotatedReading,
    pub median_od: f64,
    pub baselined_od: f64,
}

impl BaselinedReading {
    #[inline(always)]
    pub fn uniq_id(&self) -> &str {
        &self.source.uniq_id
    }

    #[inline(always)]
    pub fn curve_id(&self) -> &str {
        &self.source.curve_id
    }

    #[inline(always)]
    pub fn day(&self) -> i32 {
        self.source.reading.day
    }

    #[inline(always)]
    pub fn hours(&self) -> f64 {
        self.source.reading.hours()
    }

    #[inline(always)]
    pub fn is_blank(&self) -> bool {
        self.source.is_blank()
    }

    #[inline(always)]
    pub fn richness(&self) -> u32 {
        self.source.annotation.richness
    }

    #[inline(always)]
    pub fn heat_day(&self) -> Option<i32> {
        self.source.annotation.heat_day
    }

    #[inline(always)]
    pub fn recov_day(&self) -> Option<i32> {
        self.source.annotation.recov_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        let id = uniq_id("230412", "A", "B7");
        assert_eq!(id, "230412_A_B7");
        assert_eq!(curve_id(&id, 3), "230412_A_B7_3");
    }

    #[test]
    fn test_well_parsing() {
        assert_eq!(normalize_well("a08"), Some("A8".to_string()));
        assert_eq!(normalize_well("H12"), Some("H12".to_string()));
        assert_eq!(normalize_well("I1"), None);
        assert_eq!(normalize_well("A13"), None);
        assert_eq!(well_column("C8"), Some(8));
        assert_eq!(well_column("C18"), None);
        assert_eq!(well_column("D11"), Some(11));
    }

    #[test]
    fn test_hours() {
        let reading = Reading {
            date: "230412".to_string(),
            day: 1,
            incubator: "A".to_string(),
            well: "A1".to_string(),
            heat: "6h".to_string(),
            elapsed_secs: 52_200,
            od: 0.1,
            temperature: Some(30.0),
        };
        assert_eq!(reading.hours(), 14.5);
        assert_eq!(reading.uniq_id(), "230412_A_A1");
    }
}
