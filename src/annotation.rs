//! Curated per-well annotation: what was inoculated and when it was heated.

use crate::error::{RecoveryError, Result};
use crate::reading::{Reading, normalize_well, uniq_id};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

pub const REQUIRED_COLUMNS: &[&str] = &[
    "uniqID",
    "well",
    "date",
    "day",
    "incubator",
    "heat",
    "richness",
    "heat_day",
    "recov_day",
];

/// Columns carrying this prefix belong to the flow-cytometry analysis and
/// are dropped before deduplication.
pub const FLOW_CYTOMETRY_PREFIX: &str = "fc_";

/// Composite key the annotation is joined on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinKey {
    pub uniq_id: String,
    pub well: String,
    pub date: String,
    pub day: i32,
    pub incubator: String,
    pub heat: String,
}

impl JoinKey {
    pub fn for_reading(reading: &Reading) -> Self {
        Self {
            uniq_id: reading.uniq_id(),
            well: reading.well.clone(),
            date: reading.date.clone(),
            day: reading.day,
            incubator: reading.incubator.clone(),
            heat: reading.heat.clone(),
        }
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, day {}, {}, {})",
            self.uniq_id, self.well, self.date, self.day, self.incubator, self.heat
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub key: JoinKey,
    /// Species name -> inoculated.
    pub species: BTreeMap<String, bool>,
    pub richness: u32,
    pub heat_day: Option<i32>,
    pub recov_day: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationTable {
    rows: HashMap<JoinKey, Rc<Annotation>>,
    species_columns: Vec<String>,
    collapsed_duplicates: usize,
}

fn parse_optional_day(text: &str) -> Option<Option<i32>> {
    match text.trim() {
        "" | "NA" | "na" | "NaN" => Some(None),
        t => t.parse::<i32>().ok().map(Some),
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_uppercase().as_str() {
        "1" | "TRUE" | "T" => Some(true),
        "0" | "FALSE" | "F" | "" | "NA" => Some(false),
        _ => None,
    }
}

impl AnnotationTable {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| RecoveryError::csv(path, e))?;
        let headers = rdr
            .headers()
            .map_err(|e| RecoveryError::csv(path, e))?
            .clone();

        let index_of = |name: &str| headers.iter().position(|h| h == name);
        let mut required = HashMap::new();
        for name in REQUIRED_COLUMNS {
            let idx = index_of(name).ok_or_else(|| {
                RecoveryError::annotation(path, format!("missing column '{name}'"))
            })?;
            required.insert(*name, idx);
        }
        let species_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !REQUIRED_COLUMNS.contains(h) && !h.starts_with(FLOW_CYTOMETRY_PREFIX))
            .map(|(idx, h)| (idx, h.to_string()))
            .collect();
        let mut ret = Self {
            species_columns: species_columns.iter().map(|(_, name)| name.clone()).collect(),
            ..Default::default()
        };
        for (row_idx, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| RecoveryError::csv(path, e))?;
            let line = row_idx + 2;
            let field = |name: &str| record.get(required[name]).unwrap_or_default();
            let bad = |name: &str| {
                RecoveryError::annotation(
                    path,
                    format!("line {line}: bad {name} '{}'", field(name)),
                )
            };
            let well = normalize_well(field("well")).ok_or_else(|| bad("well"))?;
            let key = JoinKey {
                uniq_id: field("uniqID").to_string(),
                well,
                date: field("date").to_string(),
                day: field("day").parse().map_err(|_| bad("day"))?,
                incubator: field("incubator").to_string(),
                heat: field("heat").to_string(),
            };
            if key.uniq_id != uniq_id(&key.date, &key.incubator, &key.well) {
                return Err(bad("uniqID"));
            }
            let mut species = BTreeMap::new();
            for (idx, name) in &species_columns {
                let value = record.get(*idx).unwrap_or_default();
                let flag = parse_flag(value).ok_or_else(|| {
                    RecoveryError::annotation(path, format!("line {line}: bad {name} '{value}'"))
                })?;
                species.insert(name.clone(), flag);
            }
            let annotation = Annotation {
                species,
                richness: field("richness").parse().map_err(|_| bad("richness"))?,
                heat_day: parse_optional_day(field("heat_day")).ok_or_else(|| bad("heat_day"))?,
                recov_day: parse_optional_day(field("recov_day"))
                    .ok_or_else(|| bad("recov_day"))?,
                key,
            };
            ret.insert(annotation)?;
        }
        Ok(ret)
    }

    /// Adds a row. A second row for an existing key collapses into the first
    /// when both parse to the same annotation and is an integrity error
    /// otherwise.
    pub fn insert(&mut self, annotation: Annotation) -> Result<()> {
        if let Some(existing) = self.rows.get(&annotation.key) {
            if **existing != annotation {
                return Err(RecoveryError::DuplicateAnnotation(annotation.key.to_string()));
            }
            self.collapsed_duplicates += 1;
            return Ok(());
        }
        self.rows.insert(annotation.key.clone(), Rc::new(annotation));
        Ok(())
    }

    pub fn get(&self, key: &JoinKey) -> Option<&Rc<Annotation>> {
        self.rows.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Annotation>> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn species_columns(&self) -> &[String] {
        &self.species_columns
    }

    /// Rows equal to an earlier row once parsed, flow-cytometry columns
    /// ignored, that were collapsed.
    pub fn collapsed_duplicates(&self) -> usize {
        self.collapsed_duplicates
    }
}
