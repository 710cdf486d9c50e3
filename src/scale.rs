// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scale calibration: resolve the pixel-to-real-world ratio from scale
//! bars, dimension annotations and (eventually) grid spacing.
//!
//! Each observation becomes a [`ScaleReference`]; references are grouped
//! by compatible ratio, averaged into candidate [`Scale`]s, and the best
//! candidate is selected by confidence weighted with reference support.

use image::GrayImage;

use crate::types::{
    BoundingBox, ClassifiedLine, LineType, Scale, ScaleConfig, ScaleKind, ScaleReference,
    ScaleUnit, TextRegion,
};

/// Intensity below which a pixel belongs to a scale-bar run
const BAR_DARK_THRESHOLD: u8 = 100;
/// Search margin when pairing a bar with its caption (pixels)
const BAR_TEXT_MARGIN: f64 = 40.0;
/// Maximum distance between a dimension text and its line (pixels)
const DIMENSION_PAIR_DISTANCE: f64 = 50.0;
/// Reference confidence cap for bar/dimension observations
const REFERENCE_CONFIDENCE_CAP: f64 = 0.8;

/// Convert a value between supported units
pub fn convert_unit(value: f64, from: ScaleUnit, to: ScaleUnit) -> f64 {
    value * from.meters_per_unit() / to.meters_per_unit()
}

/// Parse scale caption text: "5m", "2.5 cm", "10 ft", "12'", "6\"",
/// feet-inches notation "5'6\"".
pub fn parse_scale_text(text: &str) -> Option<(f64, ScaleUnit)> {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    // Feet-inches notation first: 5'6" or bare 12' / 6"
    if let Some(feet_part) = trimmed.strip_suffix('"') {
        if let Some((feet, inches)) = feet_part.split_once('\'') {
            let f: f64 = feet.trim().parse().ok()?;
            let i: f64 = inches.trim().parse().ok()?;
            return Some((f + i / 12.0, ScaleUnit::Feet));
        }
        let inches: f64 = feet_part.trim().parse().ok()?;
        return Some((inches, ScaleUnit::Inches));
    }
    if let Some(feet_part) = trimmed.strip_suffix('\'') {
        let feet: f64 = feet_part.trim().parse().ok()?;
        return Some((feet, ScaleUnit::Feet));
    }

    // Longest suffixes first so "mm" is not read as "m"
    for (suffix, unit) in [
        ("mm", ScaleUnit::Millimeters),
        ("cm", ScaleUnit::Centimeters),
        ("ft", ScaleUnit::Feet),
        ("in", ScaleUnit::Inches),
        ("m", ScaleUnit::Meters),
    ] {
        if let Some(prefix) = trimmed.strip_suffix(suffix) {
            let value: f64 = prefix.trim().replace(',', ".").parse().ok()?;
            if value > 0.0 {
                return Some((value, unit));
            }
            return None;
        }
    }

    None
}

/// Resolve the best scale from the preprocessed raster, classified text and
/// lines.
pub fn calibrate(
    gray: &GrayImage,
    text_regions: &[TextRegion],
    lines: &[ClassifiedLine],
    config: &ScaleConfig,
) -> Option<Scale> {
    let mut references = detect_scale_bars(gray, text_regions, config);
    references.extend(detect_dimension_references(text_regions, lines));
    references.extend(detect_grid_spacing());

    if references.is_empty() {
        return None;
    }

    let candidates = group_references(references, config.group_tolerance);
    select_best(candidates, config)
}

/// Find horizontal dark runs paired with nearby scale captions.
fn detect_scale_bars(
    gray: &GrayImage,
    text_regions: &[TextRegion],
    config: &ScaleConfig,
) -> Vec<ScaleReference> {
    let runs = horizontal_dark_runs(gray, config.bar_min_length, config.bar_max_length);
    let mut references = Vec::new();

    for run in &runs {
        let search = run.bbox().expanded(BAR_TEXT_MARGIN);
        for region in text_regions {
            if !region.is_dimension {
                continue;
            }
            if !search.contains(&region.bbox.center()) {
                continue;
            }
            if let Some((real_length, unit)) = parse_scale_text(&region.text) {
                references.push(ScaleReference {
                    pixel_length: run.length as f64,
                    real_length,
                    unit,
                    confidence: region.confidence.min(REFERENCE_CONFIDENCE_CAP),
                });
                break;
            }
        }
    }

    references
}

#[derive(Debug, Clone, Copy)]
struct DarkRun {
    x0: u32,
    y: u32,
    length: u32,
}

impl DarkRun {
    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.x0 as f64,
            self.y as f64,
            (self.x0 + self.length) as f64,
            self.y as f64,
        )
    }
}

/// Collect horizontal dark runs within the length window, keeping one run
/// per bar (consecutive rows of the same span collapse onto the first).
fn horizontal_dark_runs(gray: &GrayImage, min_len: u32, max_len: u32) -> Vec<DarkRun> {
    let (w, h) = gray.dimensions();
    let mut runs: Vec<DarkRun> = Vec::new();

    for y in 0..h {
        let mut x = 0u32;
        while x < w {
            if gray.get_pixel(x, y).0[0] >= BAR_DARK_THRESHOLD {
                x += 1;
                continue;
            }
            let start = x;
            while x < w && gray.get_pixel(x, y).0[0] < BAR_DARK_THRESHOLD {
                x += 1;
            }
            let length = x - start;
            if length < min_len || length > max_len {
                continue;
            }

            let duplicate = runs.iter().any(|r| {
                r.x0.abs_diff(start) <= 2
                    && r.length.abs_diff(length) <= 2
                    && y.saturating_sub(r.y) <= 6
            });
            if !duplicate {
                runs.push(DarkRun {
                    x0: start,
                    y,
                    length,
                });
            }
        }
    }

    runs
}

/// Pair dimension-flagged text with the nearest classified dimension line.
fn detect_dimension_references(
    text_regions: &[TextRegion],
    lines: &[ClassifiedLine],
) -> Vec<ScaleReference> {
    let mut references = Vec::new();

    for region in text_regions {
        if !region.is_dimension {
            continue;
        }
        let Some((real_length, unit)) = parse_scale_text(&region.text) else {
            continue;
        };
        let text_center = region.bbox.center();

        let nearest = lines
            .iter()
            .filter(|l| l.line_type == LineType::Dimension)
            .map(|l| {
                let mid = l.start.midpoint(&l.end);
                (l, mid.distance_to(&text_center))
            })
            .filter(|(_, d)| *d <= DIMENSION_PAIR_DISTANCE)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        if let Some((line, _)) = nearest {
            references.push(ScaleReference {
                pixel_length: line.length(),
                real_length,
                unit,
                confidence: (region.confidence * line.confidence).min(REFERENCE_CONFIDENCE_CAP),
            });
        }
    }

    references
}

/// Grid-spacing detection is not implemented; it contributes no references.
fn detect_grid_spacing() -> Vec<ScaleReference> {
    Vec::new()
}

/// Group references whose pixels-per-meter agree within the relative
/// tolerance; each group averages into one candidate scale.
fn group_references(references: Vec<ScaleReference>, tolerance: f64) -> Vec<Scale> {
    let mut groups: Vec<Vec<ScaleReference>> = Vec::new();

    for reference in references {
        if reference.real_length <= 0.0 || reference.pixel_length <= 0.0 {
            continue;
        }
        let ppm = pixels_per_meter(&reference);

        let slot = groups.iter_mut().find(|group| {
            let group_ppm = pixels_per_meter(&group[0]);
            (ppm - group_ppm).abs() / group_ppm <= tolerance
        });
        match slot {
            Some(group) => group.push(reference),
            None => groups.push(vec![reference]),
        }
    }

    groups.into_iter().map(candidate_from_group).collect()
}

fn pixels_per_meter(reference: &ScaleReference) -> f64 {
    reference.pixel_length / (reference.real_length * reference.unit.meters_per_unit())
}

fn candidate_from_group(group: Vec<ScaleReference>) -> Scale {
    // Representative unit: the most frequent one in the group
    let unit = {
        let mut best = group[0].unit;
        let mut best_count = 0usize;
        for reference in &group {
            let count = group.iter().filter(|r| r.unit == reference.unit).count();
            if count > best_count {
                best_count = count;
                best = reference.unit;
            }
        }
        best
    };
    let mixed_units = group.iter().any(|r| r.unit != unit);

    let ratio = group
        .iter()
        .map(|r| pixels_per_meter(r) * unit.meters_per_unit())
        .sum::<f64>()
        / group.len() as f64;
    let confidence =
        group.iter().map(|r| r.confidence).sum::<f64>() / group.len() as f64;

    let kind = classify_kind(ratio, unit, mixed_units);

    Scale {
        ratio,
        unit,
        kind,
        confidence,
        references: group,
    }
}

/// Match the ratio against fixed drawing-scale tables (96 DPI paper space);
/// otherwise classify by unit family.
fn classify_kind(ratio: f64, unit: ScaleUnit, mixed_units: bool) -> ScaleKind {
    if mixed_units {
        return ScaleKind::Custom;
    }

    // px per meter at 96 DPI for 1:50, 1:100, 1:200 drawings
    const ARCHITECTURAL_PPM: [f64; 3] = [75.59, 37.80, 18.90];
    // px per foot at 96 DPI for 1/4"=1' and 1/8"=1'
    const IMPERIAL_PPF: [f64; 2] = [24.0, 12.0];

    let ppm = ratio / unit.meters_per_unit();
    if ARCHITECTURAL_PPM
        .iter()
        .any(|t| (ppm - t).abs() / t <= 0.05)
    {
        return ScaleKind::Architectural;
    }

    let ppf = ppm * ScaleUnit::Feet.meters_per_unit();
    if IMPERIAL_PPF.iter().any(|t| (ppf - t).abs() / t <= 0.05) {
        return ScaleKind::Imperial;
    }

    match unit {
        ScaleUnit::Feet | ScaleUnit::Inches => ScaleKind::Custom,
        _ => ScaleKind::Metric,
    }
}

/// Sort by confidence weighted with reference support; honor the expected
/// unit/kind when a matching candidate exists.
fn select_best(mut candidates: Vec<Scale>, config: &ScaleConfig) -> Option<Scale> {
    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by(|a, b| {
        let score_a = a.confidence * ((a.references.len() + 1) as f64).ln();
        let score_b = b.confidence * ((b.references.len() + 1) as f64).ln();
        score_b.partial_cmp(&score_a).unwrap()
    });

    if let Some(unit) = config.expected_unit {
        if let Some(found) = candidates.iter().find(|c| c.unit == unit) {
            return Some(found.clone());
        }
    }
    if let Some(kind) = config.expected_kind {
        if let Some(found) = candidates.iter().find(|c| c.kind == kind) {
            return Some(found.clone());
        }
    }

    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    const ALL_UNITS: [ScaleUnit; 5] = [
        ScaleUnit::Meters,
        ScaleUnit::Centimeters,
        ScaleUnit::Millimeters,
        ScaleUnit::Feet,
        ScaleUnit::Inches,
    ];

    #[test]
    fn test_convert_unit_round_trip() {
        for from in ALL_UNITS {
            for to in ALL_UNITS {
                let v = 12.34;
                let back = convert_unit(convert_unit(v, from, to), to, from);
                assert_relative_eq!(back, v, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_parse_scale_text() {
        assert_eq!(parse_scale_text("5m"), Some((5.0, ScaleUnit::Meters)));
        assert_eq!(parse_scale_text("10 ft"), Some((10.0, ScaleUnit::Feet)));
        assert_eq!(parse_scale_text("250 cm"), Some((250.0, ScaleUnit::Centimeters)));
        assert_eq!(parse_scale_text("30mm"), Some((30.0, ScaleUnit::Millimeters)));
        assert_eq!(parse_scale_text("12'"), Some((12.0, ScaleUnit::Feet)));
        assert_eq!(parse_scale_text("6\""), Some((6.0, ScaleUnit::Inches)));
        assert_eq!(parse_scale_text("5'6\""), Some((5.5, ScaleUnit::Feet)));
        assert_eq!(parse_scale_text("Kitchen"), None);
        assert_eq!(parse_scale_text(""), None);
    }

    fn dimension_region(text: &str, bbox: BoundingBox) -> TextRegion {
        TextRegion {
            bbox,
            text: text.into(),
            confidence: 0.95,
            is_dimension: true,
            is_annotation: false,
            is_label: false,
        }
    }

    #[test]
    fn test_scale_bar_with_caption() {
        let mut img = GrayImage::from_pixel(400, 200, Luma([255]));
        // 100 px bar, 3 rows thick
        for y in 150..153 {
            for x in 50..150 {
                img.put_pixel(x, y, Luma([0]));
            }
        }

        let regions = vec![dimension_region(
            "5m",
            BoundingBox::new(160.0, 145.0, 180.0, 158.0),
        )];

        let scale = calibrate(&img, &regions, &[], &ScaleConfig::default()).unwrap();
        assert_eq!(scale.unit, ScaleUnit::Meters);
        assert_relative_eq!(scale.ratio, 20.0, epsilon = 0.5);
        assert!(scale.confidence >= 0.7);
    }

    #[test]
    fn test_no_references_returns_none() {
        let img = GrayImage::from_pixel(100, 100, Luma([255]));
        assert!(calibrate(&img, &[], &[], &ScaleConfig::default()).is_none());
    }

    #[test]
    fn test_grouping_averages_compatible_references() {
        let references = vec![
            ScaleReference {
                pixel_length: 100.0,
                real_length: 5.0,
                unit: ScaleUnit::Meters,
                confidence: 0.8,
            },
            ScaleReference {
                pixel_length: 102.0,
                real_length: 5.0,
                unit: ScaleUnit::Meters,
                confidence: 0.8,
            },
            // Incompatible ratio: forms its own group
            ScaleReference {
                pixel_length: 300.0,
                real_length: 5.0,
                unit: ScaleUnit::Meters,
                confidence: 0.6,
            },
        ];

        let candidates = group_references(references, 0.15);
        assert_eq!(candidates.len(), 2);
        let merged = candidates.iter().find(|c| c.references.len() == 2).unwrap();
        assert_relative_eq!(merged.ratio, 20.2, epsilon = 0.1);
    }

    #[test]
    fn test_expected_unit_preferred() {
        let references = vec![
            ScaleReference {
                pixel_length: 100.0,
                real_length: 5.0,
                unit: ScaleUnit::Meters,
                confidence: 0.9,
            },
            ScaleReference {
                pixel_length: 48.0,
                real_length: 2.0,
                unit: ScaleUnit::Feet,
                confidence: 0.5,
            },
        ];
        let candidates = group_references(references, 0.15);

        let config = ScaleConfig {
            expected_unit: Some(ScaleUnit::Feet),
            ..Default::default()
        };
        let best = select_best(candidates, &config).unwrap();
        assert_eq!(best.unit, ScaleUnit::Feet);
    }

    #[test]
    fn test_imperial_table_classification() {
        // 24 px per foot matches the 1/4" = 1' table entry
        let references = vec![ScaleReference {
            pixel_length: 240.0,
            real_length: 10.0,
            unit: ScaleUnit::Feet,
            confidence: 0.8,
        }];
        let candidates = group_references(references, 0.15);
        assert_eq!(candidates[0].kind, ScaleKind::Imperial);
    }
}
