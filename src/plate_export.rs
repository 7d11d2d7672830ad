//! Reader for per-well plate-reader text exports.
//!
//! An export is a block of free-form instrument metadata followed by a
//! tab-separated table:
//!
//! ```text
//! Reader: Synergy H1
//! Read 1: 600
//!
//! Time	T° 600	OD600
//! 0:00:00	30.1	0.092
//! 0:15:00	30.0	0.093
//! ```
//!
//! The table ends at the first empty line. Rows with an empty time or OD
//! cell (tabs only) are reads the instrument skipped and are ignored.

use crate::error::{RecoveryError, Result};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct ExportRow {
    pub elapsed_secs: u32,
    pub temperature: Option<f64>,
    pub od: f64,
}

/// `H:MM:SS` (hours may exceed 24) or `MM:SS` into whole seconds. `None`
/// when the value does not fit.
pub fn parse_elapsed(text: &str) -> Option<u32> {
    let parts = text
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [h, m, s] if *m < 60 && *s < 60 => h.checked_mul(3600)?.checked_add(m * 60 + s),
        [m, s] if *s < 60 => m.checked_mul(60)?.checked_add(*s),
        _ => None,
    }
}

fn is_temperature_header(cell: &str) -> bool {
    let cell = cell.trim();
    cell.starts_with("T°") || cell.to_ascii_lowercase().starts_with("temp")
}

struct Columns {
    time: usize,
    temperature: Option<usize>,
    od: usize,
}

fn find_columns(header: &[&str]) -> Option<Columns> {
    let time = header.iter().position(|c| c.trim() == "Time")?;
    let temperature = header
        .iter()
        .enumerate()
        .position(|(idx, c)| idx != time && is_temperature_header(c));
    let od = header.iter().enumerate().position(|(idx, c)| {
        idx != time && Some(idx) != temperature && !c.trim().is_empty()
    })?;
    Some(Columns {
        time,
        temperature,
        od,
    })
}

pub fn parse_export(text: &str, path: &Path) -> Result<Vec<ExportRow>> {
    let mut lines = text.lines().enumerate();
    let columns = loop {
        let Some((_, line)) = lines.next() else {
            return Err(RecoveryError::export(path, "no 'Time' header row"));
        };
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.first().map(|c| c.trim()) != Some("Time") {
            continue;
        }
        break find_columns(&cells).ok_or_else(|| {
            RecoveryError::export(path, "header row has no OD column next to 'Time'")
        })?;
    };

    let mut ret = vec![];
    for (idx, line) in lines {
        if line.trim_end_matches('\r').is_empty() {
            break;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        let cell = |i: usize| cells.get(i).map(|c| c.trim()).unwrap_or_default();
        let (time, od) = (cell(columns.time), cell(columns.od));
        if time.is_empty() || od.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let elapsed_secs = parse_elapsed(time).ok_or_else(|| {
            RecoveryError::export(path, format!("line {line_no}: bad time '{time}'"))
        })?;
        let od = od
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RecoveryError::export(path, format!("line {line_no}: bad OD '{od}'")))?;
        let temperature = match columns.temperature.map(cell) {
            None | Some("") => None,
            Some(t) => Some(t.parse::<f64>().map_err(|_| {
                RecoveryError::export(path, format!("line {line_no}: bad temperature '{t}'"))
            })?),
        };
        ret.push(ExportRow {
            elapsed_secs,
            temperature,
            od,
        });
    }

    if ret.is_empty() {
        return Err(RecoveryError::export(path, "no readings below the header"));
    }
    Ok(ret)
}

pub fn read_export(path: &Path) -> Result<Vec<ExportRow>> {
    let text = fs::read_to_string(path).map_err(|e| RecoveryError::io(path, e))?;
    parse_export(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const EXPORT: &str = "Software Version\t3.11\n\
        Reader Type:\tSynergy H1\n\
        \n\
        Time\tT° 600\tOD600\n\
        0:00:00\t30.1\t0.092\n\
        0:15:00\t30.0\t0.093\n\
        \t\t\n\
        23:45:00\t29.9\t0.410\n\
        \n\
        Results\n\
        1:00:00\t1\t2\n";

    #[test]
    fn test_parse_elapsed() {
        assert_eq!(parse_elapsed("0:00:00"), Some(0));
        assert_eq!(parse_elapsed("14:30:00"), Some(52_200));
        assert_eq!(parse_elapsed("47:59:59"), Some(47 * 3600 + 59 * 60 + 59));
        assert_eq!(parse_elapsed("15:00"), Some(900));
        assert_eq!(parse_elapsed("1:75:00"), None);
        assert_eq!(parse_elapsed("abc"), None);
        assert_eq!(parse_elapsed("2000000:00:00"), None);
        assert_eq!(parse_elapsed("99999999:00"), None);
    }

    #[test]
    fn test_oversized_time_cell_is_fatal() {
        let text = "Time	T° 600	OD600
2000000:00:00	30.0	0.1
";
        let err = parse_export(text, &PathBuf::from("D4.txt")).unwrap_err();
        assert!(err.to_string().contains("D4.txt"));
        assert!(err.to_string().contains("bad time"));
    }

    #[test]
    fn test_parse_export_table() {
        let rows = parse_export(EXPORT, &PathBuf::from("A1.txt")).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].od, 0.092);
        assert_eq!(rows[0].temperature, Some(30.1));
        assert_eq!(rows[2].elapsed_secs, 23 * 3600 + 45 * 60);
        assert_eq!(rows[2].od, 0.41);
    }

    #[test]
    fn test_missing_header_names_file() {
        let err = parse_export("just\tnoise\n", &PathBuf::from("day2/C3.txt")).unwrap_err();
        assert!(err.to_string().contains("C3.txt"));
    }

    #[test]
    fn test_bad_od_cell_is_fatal() {
        let text = "Time\tT° 600\tOD600\n0:00:00\t30.0\tOVRFLW\n";
        let err = parse_export(text, &PathBuf::from("B2.txt")).unwrap_err();
        assert!(err.to_string().contains("OVRFLW"));
    }

    #[test]
    fn test_non_finite_od_is_fatal() {
        for cell in ["NaN", "inf", "-inf"] {
            let text = format!("Time\tT° 600\tOD600\n0:00:00\t30.0\t{cell}\n");
            let err = parse_export(&text, &PathBuf::from("A1.txt")).unwrap_err();
            assert!(err.to_string().contains("bad OD"), "{cell}");
        }
    }

    #[test]
    fn test_without_temperature_column() {
        let text = "Time\tOD600\n0:10:00\t0.1\n";
        let rows = parse_export(text, &PathBuf::from("B2.txt")).unwrap();
        assert_eq!(rows[0].temperature, None);
        assert_eq!(rows[0].elapsed_secs, 600);
    }
}
