//! Diagnostic SVG plots.

use crate::baseline::{BlankMedian, BucketKey};
use crate::error::{RecoveryError, Result};
use crate::reading::BaselinedReading;
use crate::report::ExtinctionShare;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use svg::Document;
use svg::node::element::{Line, Polyline, Rectangle, Text};

pub const BLANK_BASELINE_FILE: &str = "blank_baseline.svg";
pub const BASELINED_CURVES_FILE: &str = "baselined_curves.svg";
pub const EXTINCTION_BY_RICHNESS_FILE: &str = "extinction_by_richness.svg";

const W: f32 = 1000.0;
const H: f32 = 640.0;
const LEFT: f32 = 90.0;
const RIGHT: f32 = W - 190.0;
const TOP: f32 = 70.0;
const BOTTOM: f32 = H - 80.0;
const FONT: &str = "Helvetica, Arial, sans-serif";

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

fn color(idx: usize) -> &'static str {
    PALETTE[idx % PALETTE.len()]
}

/// Linear mapping from data ranges onto the plot area.
#[derive(Clone, Copy, Debug)]
struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn from_points(points: impl Iterator<Item = (f64, f64)>) -> Self {
        let (mut x_min, mut x_max, mut y_min, mut y_max) = (0.0_f64, 1.0_f64, 0.0_f64, 0.1_f64);
        let mut first = true;
        for (x, y) in points.filter(|(x, y)| x.is_finite() && y.is_finite()) {
            if first {
                (x_min, x_max, y_min, y_max) = (x, x, y, y);
                first = false;
            }
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        if x_max - x_min < 1e-9 {
            x_max = x_min + 1.0;
        }
        if y_max - y_min < 1e-9 {
            y_max = y_min + 0.1;
        }
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    fn include_y(mut self, y: f64) -> Self {
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
        self
    }

    fn x(&self, v: f64) -> f32 {
        LEFT + ((v - self.x_min) / (self.x_max - self.x_min)) as f32 * (RIGHT - LEFT)
    }

    fn y(&self, v: f64) -> f32 {
        BOTTOM - ((v - self.y_min) / (self.y_max - self.y_min)) as f32 * (BOTTOM - TOP)
    }
}

fn text(content: impl Into<String>, x: f32, y: f32, size: i32) -> Text {
    Text::new(content.into())
        .set("x", x)
        .set("y", y)
        .set("font-family", FONT)
        .set("font-size", size)
        .set("fill", "#202020")
}

fn canvas(title: &str) -> Document {
    Document::new()
        .set("viewBox", (0, 0, W, H))
        .set("width", W)
        .set("height", H)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", W)
                .set("height", H)
                .set("fill", "#ffffff"),
        )
        .add(text(title, 24.0, 36.0, 20))
}

fn axes(mut doc: Document, frame: &Frame, x_label: &str, y_label: &str) -> Document {
    doc = doc
        .add(
            Line::new()
                .set("x1", LEFT)
                .set("y1", BOTTOM)
                .set("x2", RIGHT)
                .set("y2", BOTTOM)
                .set("stroke", "#404040"),
        )
        .add(
            Line::new()
                .set("x1", LEFT)
                .set("y1", TOP)
                .set("x2", LEFT)
                .set("y2", BOTTOM)
                .set("stroke", "#404040"),
        );
    for i in 0..=4 {
        let f = i as f64 / 4.0;
        let xv = frame.x_min + f * (frame.x_max - frame.x_min);
        let yv = frame.y_min + f * (frame.y_max - frame.y_min);
        doc = doc
            .add(text(format!("{xv:.1}"), frame.x(xv) - 10.0, BOTTOM + 18.0, 11))
            .add(text(format!("{yv:.3}"), LEFT - 48.0, frame.y(yv) + 4.0, 11));
    }
    doc.add(text(x_label, (LEFT + RIGHT) / 2.0 - 40.0, H - 30.0, 13))
        .add(text(y_label, 12.0, TOP - 16.0, 13))
}

fn polyline(points: &[(f64, f64)], frame: &Frame, stroke: &str, width: f32) -> Polyline {
    let points = points
        .iter()
        .map(|(x, y)| format!("{:.2},{:.2}", frame.x(*x), frame.y(*y)))
        .join(" ");
    Polyline::new()
        .set("points", points)
        .set("fill", "none")
        .set("stroke", stroke)
        .set("stroke-width", width)
}

fn legend(mut doc: Document, entries: &[(String, &str)]) -> Document {
    for (idx, (label, stroke)) in entries.iter().enumerate().take(24) {
        let y = TOP + 8.0 + idx as f32 * 18.0;
        doc = doc
            .add(
                Line::new()
                    .set("x1", RIGHT + 16.0)
                    .set("y1", y)
                    .set("x2", RIGHT + 36.0)
                    .set("y2", y)
                    .set("stroke", *stroke)
                    .set("stroke-width", 2),
            )
            .add(text(label.clone(), RIGHT + 42.0, y + 4.0, 11));
    }
    doc
}

/// Blank median OD over time, one line per plate day.
pub fn blank_baseline_svg(medians: &BTreeMap<BucketKey, BlankMedian>) -> String {
    let series: BTreeMap<(String, String, i32), Vec<(f64, f64)>> = medians
        .iter()
        .map(|(key, m)| {
            (
                (key.date.clone(), key.incubator.clone(), key.day),
                (key.hours(), m.median_od),
            )
        })
        .into_group_map()
        .into_iter()
        .collect();
    let frame = Frame::from_points(series.values().flatten().copied());

    let mut doc = axes(
        canvas("Blank median OD per read"),
        &frame,
        "Elapsed time (h)",
        "Median blank OD",
    );
    let mut entries = vec![];
    for (idx, ((date, incubator, day), points)) in series.iter().enumerate() {
        let stroke = color(idx);
        doc = doc.add(polyline(points, &frame, stroke, 1.5));
        entries.push((format!("{date} {incubator} day {day}"), stroke));
    }
    legend(doc, &entries).to_string()
}

/// Baselined curves coloured by richness, with the growth cutoff dashed.
pub fn baselined_curves_svg(rows: &[&BaselinedReading], cutoff: f64) -> String {
    let curves: BTreeMap<(u32, String), Vec<(f64, f64)>> = rows
        .iter()
        .map(|r| {
            (
                (r.richness(), r.curve_id().to_string()),
                (r.hours(), r.baselined_od),
            )
        })
        .into_group_map()
        .into_iter()
        .map(|(key, mut points)| {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            (key, points)
        })
        .collect();
    let frame = Frame::from_points(curves.values().flatten().copied()).include_y(cutoff);

    let mut doc = axes(
        canvas("Baselined OD, contamination-filtered wells"),
        &frame,
        "Elapsed time (h)",
        "Baselined OD",
    );
    let richness_levels: Vec<u32> = curves.keys().map(|(r, _)| *r).dedup().collect();
    for ((richness, _), points) in &curves {
        let idx = richness_levels.iter().position(|r| r == richness).unwrap_or(0);
        doc = doc.add(polyline(points, &frame, color(idx), 0.8).set("stroke-opacity", 0.6));
    }
    doc = doc
        .add(
            Line::new()
                .set("x1", LEFT)
                .set("y1", frame.y(cutoff))
                .set("x2", RIGHT)
                .set("y2", frame.y(cutoff))
                .set("stroke", "#000000")
                .set("stroke-dasharray", "6,4"),
        )
        .add(text(
            format!("cutoff {cutoff:.4}"),
            RIGHT - 110.0,
            frame.y(cutoff) - 6.0,
            11,
        ));
    let entries: Vec<(String, &str)> = richness_levels
        .iter()
        .enumerate()
        .map(|(idx, r)| (format!("richness {r}"), color(idx)))
        .collect();
    legend(doc, &entries).to_string()
}

/// Extinct fraction of inoculated wells per richness.
pub fn extinction_by_richness_svg(shares: &[ExtinctionShare]) -> String {
    let mut doc = canvas("Extinct wells by inoculated richness");
    let frame = Frame {
        x_min: 0.0,
        x_max: shares.len().max(1) as f64,
        y_min: 0.0,
        y_max: 1.0,
    };
    doc = axes(doc, &frame, "Richness", "Fraction extinct");
    let slot = (RIGHT - LEFT) / shares.len().max(1) as f32;
    for (idx, share) in shares.iter().enumerate() {
        let fraction = if share.wells == 0 {
            0.0
        } else {
            share.extinct as f64 / share.wells as f64
        };
        let x = LEFT + idx as f32 * slot + slot * 0.15;
        let top = frame.y(fraction);
        doc = doc
            .add(
                Rectangle::new()
                    .set("x", x)
                    .set("y", top)
                    .set("width", slot * 0.7)
                    .set("height", BOTTOM - top)
                    .set("fill", color(idx)),
            )
            .add(text(
                format!("{} ({}/{})", share.richness, share.extinct, share.wells),
                x,
                BOTTOM + 34.0,
                12,
            ));
    }
    doc.to_string()
}

pub fn write_svg(path: &Path, svg: &str) -> Result<()> {
    fs::write(path, svg).map_err(|e| RecoveryError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::estimate_baseline;
    use crate::baseline::tests::row;

    #[test]
    fn test_baseline_plot_has_one_line_per_plate_day() {
        let rows = vec![
            row("A1", 1, 0, 0.2, 0),
            row("A1", 1, 900, 0.25, 0),
            row("A1", 2, 0, 0.3, 0),
        ];
        let outcome = estimate_baseline(&rows, 1.0);
        let svg = blank_baseline_svg(&outcome.medians);
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("230412 A day 2"));
    }

    #[test]
    fn test_curve_plot_marks_cutoff() {
        let rows = vec![row("A1", 1, 0, 0.2, 0), row("B1", 1, 0, 0.5, 2)];
        let outcome = estimate_baseline(&rows, 1.0);
        let all: Vec<&BaselinedReading> = outcome.baselined.iter().collect();
        let svg = baselined_curves_svg(&all, 0.0421);
        assert!(svg.contains("cutoff 0.0421"));
        assert!(svg.contains("richness 2"));
        assert!(svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_empty_inputs_still_render() {
        assert!(extinction_by_richness_svg(&[]).contains("<svg"));
        assert!(baselined_curves_svg(&[], 0.05).contains("cutoff"));
    }
}
