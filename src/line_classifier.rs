// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line detection and semantic classification.
//!
//! Raw lines are traced from the Sobel edge raster with the same budgeted
//! stack traversal as contour tracing, then measured into a feature vector
//! (thickness, style, intensity, straightness, continuity) against the
//! preprocessed grayscale. Classification prefers a caller-supplied
//! feed-forward model and always falls back to heuristic rules; a context
//! pass counts parallel/perpendicular relations and promotes well-supported
//! unknowns to walls.

use image::GrayImage;
use nalgebra::{DMatrix, DVector};

use crate::contours::perpendicular_distance;
use crate::types::{
    ClassifiedLine, FeaturedLine, LineConfig, LineFeatures, LineStyle, LineType, Point2D, RawLine,
    TextRegion,
};

const TRACE_MAX_STACK: usize = 10_000;
const TRACE_MAX_POINTS: usize = 5_000;
const TRACE_MIN_POINTS: usize = 10;
/// Background intensity along the path that counts as a gap
const GAP_THRESHOLD: u8 = 150;
/// Bounding-box margin for text proximity checks (pixels)
const TEXT_PROXIMITY_MARGIN: f64 = 10.0;

// ─── Detection ──────────────────────────────────────────────────────────────

/// Trace connected edge runs into raw line candidates.
///
/// Seeds inside `text_mask` are skipped so lettering strokes do not become
/// line candidates.
pub fn detect_lines(
    edges: &GrayImage,
    config: &LineConfig,
    text_mask: Option<&[bool]>,
) -> Vec<RawLine> {
    let (w, h) = edges.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut lines = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            let idx = (sy * w + sx) as usize;
            if visited[idx] {
                continue;
            }
            if edges.get_pixel(sx, sy).0[0] <= config.edge_threshold {
                continue;
            }
            if let Some(mask) = text_mask {
                if mask[idx] {
                    continue;
                }
            }

            let points = trace_edge_run(edges, sx, sy, config.edge_threshold, &mut visited);
            if points.len() < TRACE_MIN_POINTS {
                continue;
            }

            let (start, end) = chord_endpoints(&points);
            lines.push(RawLine { start, end, points });
        }
    }

    lines
}

/// Budgeted 8-connected growth over edge pixels.
fn trace_edge_run(
    edges: &GrayImage,
    seed_x: u32,
    seed_y: u32,
    threshold: u8,
    visited: &mut [bool],
) -> Vec<Point2D> {
    const NEIGHBORS: [(i64, i64); 8] = [
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
    ];

    let (w, h) = edges.dimensions();
    let (wi, hi) = (w as i64, h as i64);
    let mut points = Vec::new();
    let mut stack = vec![(seed_x as i64, seed_y as i64)];

    while let Some((x, y)) = stack.pop() {
        let idx = (y * wi + x) as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        points.push(Point2D::new(x as f64, y as f64));
        if points.len() >= TRACE_MAX_POINTS {
            break;
        }

        for (dx, dy) in NEIGHBORS {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || nx >= wi || ny < 0 || ny >= hi {
                continue;
            }
            let nidx = (ny * wi + nx) as usize;
            if visited[nidx] || edges.get_pixel(nx as u32, ny as u32).0[0] <= threshold {
                continue;
            }
            if stack.len() < TRACE_MAX_STACK {
                stack.push((nx, ny));
            }
        }
    }

    points
}

/// Two-pass farthest-point heuristic: the chord spans the traced run
/// regardless of where the seed landed on it.
fn chord_endpoints(points: &[Point2D]) -> (Point2D, Point2D) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let centroid = Point2D::new(cx, cy);

    let a = *points
        .iter()
        .max_by(|p, q| {
            p.distance_to(&centroid)
                .partial_cmp(&q.distance_to(&centroid))
                .unwrap()
        })
        .unwrap();
    let b = *points
        .iter()
        .max_by(|p, q| p.distance_to(&a).partial_cmp(&q.distance_to(&a)).unwrap())
        .unwrap();
    (a, b)
}

// ─── Feature extraction ─────────────────────────────────────────────────────

/// Measure a raw line into a featured line against the preprocessed gray
/// raster.
pub fn extract_features(raw: RawLine, gray: &GrayImage, config: &LineConfig) -> FeaturedLine {
    let thickness = measure_thickness(&raw, gray, config);
    let (style, total_gap, samples) = measure_style(&raw, gray);
    let intensity = measure_intensity(&raw, gray);
    let straightness = measure_straightness(&raw);
    let continuity = if samples == 0 {
        1.0
    } else {
        (1.0 - total_gap as f64 / samples as f64).clamp(0.0, 1.0)
    };

    FeaturedLine {
        start: raw.start,
        end: raw.end,
        points: raw.points,
        thickness,
        style,
        features: LineFeatures {
            intensity,
            straightness,
            continuity,
            parallel_neighbors: 0,
            perpendicular_neighbors: 0,
        },
    }
}

/// Perpendicular bidirectional probe until a background pixel, capped at
/// the configured search radius.
fn measure_thickness(raw: &RawLine, gray: &GrayImage, config: &LineConfig) -> f64 {
    let (w, h) = gray.dimensions();
    let length = raw.length();
    if length < 1.0 {
        return 1.0;
    }

    let angle = raw.angle();
    let (nx, ny) = (-angle.sin(), angle.cos());
    let radius = config.thickness_search_radius as i64;

    let step = (raw.points.len() / 8).max(1);
    let mut total = 0.0;
    let mut samples = 0usize;

    for p in raw.points.iter().step_by(step) {
        let mut side = [0i64; 2];
        for (s, sign) in [1.0f64, -1.0].iter().enumerate() {
            let mut dark = 0i64;
            for t in 1..=radius {
                let sx = (p.x + nx * sign * t as f64).round() as i64;
                let sy = (p.y + ny * sign * t as f64).round() as i64;
                if sx < 0 || sx >= w as i64 || sy < 0 || sy >= h as i64 {
                    break;
                }
                if gray.get_pixel(sx as u32, sy as u32).0[0] > config.background_threshold {
                    break;
                }
                dark = t;
            }
            side[s] = dark;
        }
        total += (side[0] + side[1] + 1) as f64;
        samples += 1;
    }

    if samples == 0 {
        1.0
    } else {
        total / samples as f64
    }
}

/// Walk the chord sampling for background gaps; classify the stroke style
/// from gap count and average gap size.
fn measure_style(raw: &RawLine, gray: &GrayImage) -> (LineStyle, usize, usize) {
    let (w, h) = gray.dimensions();
    let length = raw.length();
    let steps = length.floor() as usize;
    if steps == 0 {
        return (LineStyle::Solid, 0, 0);
    }

    let dx = (raw.end.x - raw.start.x) / length;
    let dy = (raw.end.y - raw.start.y) / length;

    let mut gaps: Vec<usize> = Vec::new();
    let mut current_gap = 0usize;

    for i in 0..=steps {
        let sx = (raw.start.x + dx * i as f64).round() as i64;
        let sy = (raw.start.y + dy * i as f64).round() as i64;
        if sx < 0 || sx >= w as i64 || sy < 0 || sy >= h as i64 {
            continue;
        }
        let v = gray.get_pixel(sx as u32, sy as u32).0[0];
        if v > GAP_THRESHOLD {
            current_gap += 1;
        } else if current_gap > 0 {
            gaps.push(current_gap);
            current_gap = 0;
        }
    }
    if current_gap > 0 {
        gaps.push(current_gap);
    }

    let gap_count = gaps.len();
    let total_gap: usize = gaps.iter().sum();
    let style = if gap_count == 0 {
        LineStyle::Solid
    } else {
        let avg_gap = total_gap as f64 / gap_count as f64;
        let has_short = gaps.iter().any(|&g| g <= 2);
        let has_long = gaps.iter().any(|&g| g > 2);
        if has_short && has_long {
            LineStyle::DashDot
        } else if avg_gap <= 2.5 {
            LineStyle::Dotted
        } else {
            LineStyle::Dashed
        }
    };

    (style, total_gap, steps + 1)
}

/// Mean inverted grayscale along the traced points, normalized to [0,1]
fn measure_intensity(raw: &RawLine, gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let mut sum = 0.0;
    let mut count = 0usize;

    for p in &raw.points {
        let x = p.x.round() as i64;
        let y = p.y.round() as i64;
        if x < 0 || x >= w as i64 || y < 0 || y >= h as i64 {
            continue;
        }
        sum += (255.0 - gray.get_pixel(x as u32, y as u32).0[0] as f64) / 255.0;
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// 1 - (mean perpendicular deviation from the chord / 10), clamped >= 0
fn measure_straightness(raw: &RawLine) -> f64 {
    if raw.points.len() < 3 {
        return 1.0;
    }

    let mean_dev: f64 = raw
        .points
        .iter()
        .map(|p| perpendicular_distance(p, &raw.start, &raw.end))
        .sum::<f64>()
        / raw.points.len() as f64;

    (1.0 - mean_dev / 10.0).max(0.0)
}

// ─── Classification ─────────────────────────────────────────────────────────

/// Optional feed-forward classifier: one hidden layer, softmax output over
/// the line-type classes.
#[derive(Debug, Clone)]
pub struct MlpModel {
    pub hidden_weights: DMatrix<f64>,
    pub hidden_bias: DVector<f64>,
    pub output_weights: DMatrix<f64>,
    pub output_bias: DVector<f64>,
}

/// Output classes, in softmax order
const MLP_CLASSES: [LineType; 5] = [
    LineType::Wall,
    LineType::Dimension,
    LineType::Annotation,
    LineType::Grid,
    LineType::Unknown,
];

/// Number of input features the network expects
pub const MLP_INPUT_SIZE: usize = 15;

impl MlpModel {
    /// Run the forward pass. Returns None when the model shape does not
    /// match the feature vector, in which case the caller falls back to
    /// heuristics.
    pub fn classify(&self, features: &[f64; MLP_INPUT_SIZE]) -> Option<(LineType, f64)> {
        if self.hidden_weights.ncols() != MLP_INPUT_SIZE
            || self.hidden_weights.nrows() != self.hidden_bias.len()
            || self.output_weights.ncols() != self.hidden_weights.nrows()
            || self.output_weights.nrows() != MLP_CLASSES.len()
            || self.output_bias.len() != MLP_CLASSES.len()
        {
            return None;
        }

        let x = DVector::from_row_slice(features);
        let hidden = (&self.hidden_weights * x + &self.hidden_bias).map(|v| v.max(0.0));
        let logits = &self.output_weights * hidden + &self.output_bias;

        // Softmax with max subtraction for stability
        let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|v| (v - max_logit).exp()).collect();
        let sum: f64 = exps.iter().sum();

        let (best, best_exp) = exps
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())?;

        Some((MLP_CLASSES[best], (best_exp / sum).clamp(0.0, 1.0)))
    }
}

/// Build the network input from a featured line
fn feature_vector(line: &FeaturedLine, image_w: u32, image_h: u32, near_text: bool) -> [f64; 15] {
    let diag = ((image_w * image_w + image_h * image_h) as f64).sqrt().max(1.0);
    let mid = line.start.midpoint(&line.end);
    let angle = line.angle();

    [
        line.length() / diag,
        (line.thickness / 20.0).min(1.0),
        line.features.intensity,
        line.features.straightness,
        line.features.continuity,
        (line.style == LineStyle::Solid) as u8 as f64,
        (line.style == LineStyle::Dashed) as u8 as f64,
        (line.style == LineStyle::Dotted) as u8 as f64,
        (line.style == LineStyle::DashDot) as u8 as f64,
        angle.sin(),
        angle.cos(),
        mid.x / image_w.max(1) as f64,
        mid.y / image_h.max(1) as f64,
        near_text as u8 as f64,
        (line.points.len() as f64 / TRACE_MAX_POINTS as f64).min(1.0),
    ]
}

/// Classify featured lines, apply the context pass, and filter by
/// confidence and length.
pub fn classify_lines(
    featured: Vec<FeaturedLine>,
    text_regions: &[TextRegion],
    model: Option<&MlpModel>,
    image_dimensions: (u32, u32),
    config: &LineConfig,
) -> Vec<ClassifiedLine> {
    let (image_w, image_h) = image_dimensions;

    let mut classified: Vec<ClassifiedLine> = featured
        .into_iter()
        .map(|line| {
            let near_text = is_near_text(&line, text_regions);

            let ml_result = model.and_then(|m| {
                m.classify(&feature_vector(&line, image_w, image_h, near_text))
            });
            let (line_type, confidence) = match ml_result {
                Some(result) => result,
                None => classify_heuristic(&line, near_text, image_w, image_h),
            };

            ClassifiedLine {
                start: line.start,
                end: line.end,
                line_type,
                style: line.style,
                thickness: line.thickness,
                confidence: confidence.clamp(0.0, 1.0),
                features: line.features,
            }
        })
        .collect();

    apply_context(&mut classified, config.context_angle_tolerance);

    classified
        .into_iter()
        .filter(|l| l.confidence >= config.confidence_threshold && l.length() >= config.min_length)
        .collect()
}

/// Heuristic rule chain, always available as the ultimate fallback
fn classify_heuristic(
    line: &FeaturedLine,
    near_text: bool,
    image_w: u32,
    image_h: u32,
) -> (LineType, f64) {
    let length = line.length();
    let f = &line.features;

    if line.thickness > 2.0 && length > 50.0 && f.straightness > 0.8 {
        return (LineType::Wall, 0.8);
    }
    if matches!(line.style, LineStyle::Dashed | LineStyle::Dotted | LineStyle::DashDot) && near_text
    {
        return (LineType::Dimension, 0.7);
    }
    if line.thickness <= 2.0 && near_text {
        return (LineType::Annotation, 0.6);
    }
    // Thin solid lines spanning most of the image read as grid lines
    let span = image_w.max(image_h) as f64;
    if line.style == LineStyle::Solid && line.thickness <= 1.5 && length > span * 0.8 {
        return (LineType::Grid, 0.6);
    }

    (LineType::Unknown, 0.3)
}

fn is_near_text(line: &FeaturedLine, text_regions: &[TextRegion]) -> bool {
    let mid = line.start.midpoint(&line.end);
    text_regions.iter().any(|region| {
        let expanded = region.bbox.expanded(TEXT_PROXIMITY_MARGIN);
        expanded.contains(&mid) || expanded.contains(&line.start) || expanded.contains(&line.end)
    })
}

/// O(n^2) relation counting; well-supported unknowns are promoted to walls.
fn apply_context(lines: &mut [ClassifiedLine], angle_tolerance: f64) {
    use std::f64::consts::{FRAC_PI_2, PI};

    let angles: Vec<f64> = lines.iter().map(|l| l.angle()).collect();

    for i in 0..lines.len() {
        let mut parallel = 0usize;
        let mut perpendicular = 0usize;

        for j in 0..lines.len() {
            if i == j {
                continue;
            }
            let mut diff = (angles[i] - angles[j]).abs();
            if diff > PI {
                diff = 2.0 * PI - diff;
            }
            if diff > FRAC_PI_2 {
                diff = PI - diff;
            }

            if diff < angle_tolerance {
                parallel += 1;
            } else if (diff - FRAC_PI_2).abs() < angle_tolerance {
                perpendicular += 1;
            }
        }

        lines[i].features.parallel_neighbors = parallel;
        lines[i].features.perpendicular_neighbors = perpendicular;

        if lines[i].line_type == LineType::Unknown && parallel > 3 {
            lines[i].line_type = LineType::Wall;
            lines[i].confidence = (lines[i].confidence + 0.2).min(0.9);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use image::Luma;

    fn white(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    fn horizontal_raw_line(y: f64, x0: f64, x1: f64) -> RawLine {
        let points: Vec<Point2D> = (x0 as i64..=x1 as i64)
            .map(|x| Point2D::new(x as f64, y))
            .collect();
        RawLine {
            start: Point2D::new(x0, y),
            end: Point2D::new(x1, y),
            points,
        }
    }

    fn featured_segment(x0: f64, y0: f64, x1: f64, y1: f64) -> FeaturedLine {
        FeaturedLine {
            start: Point2D::new(x0, y0),
            end: Point2D::new(x1, y1),
            points: vec![Point2D::new(x0, y0), Point2D::new(x1, y1)],
            thickness: 1.0,
            style: LineStyle::Solid,
            features: LineFeatures {
                intensity: 0.5,
                straightness: 1.0,
                continuity: 1.0,
                parallel_neighbors: 0,
                perpendicular_neighbors: 0,
            },
        }
    }

    #[test]
    fn test_detects_line_from_edge_image() {
        let mut edges = GrayImage::new(128, 64);
        for x in 8..120 {
            edges.put_pixel(x, 32, Luma([255]));
        }

        let lines = detect_lines(&edges, &LineConfig::default(), None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].length() > 100.0);
    }

    #[test]
    fn test_thickness_of_three_pixel_line() {
        let mut gray = white(100, 40);
        for x in 10..90 {
            for y in 19..22 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }

        let raw = horizontal_raw_line(20.0, 10.0, 89.0);
        let featured = extract_features(raw, &gray, &LineConfig::default());
        assert!((featured.thickness - 3.0).abs() < 0.5);
        assert_eq!(featured.style, LineStyle::Solid);
        assert!(featured.features.straightness > 0.99);
        assert!(featured.features.continuity > 0.99);
    }

    #[test]
    fn test_dashed_line_style() {
        let mut gray = white(120, 40);
        // 6 px dashes with 6 px gaps
        let mut x = 10u32;
        while x < 110 {
            for dx in 0..6 {
                if x + dx < 110 {
                    gray.put_pixel(x + dx, 20, Luma([0]));
                }
            }
            x += 12;
        }

        let raw = horizontal_raw_line(20.0, 10.0, 109.0);
        let featured = extract_features(raw, &gray, &LineConfig::default());
        assert_eq!(featured.style, LineStyle::Dashed);
        assert!(featured.features.continuity < 1.0);
    }

    #[test]
    fn test_heuristic_wall_rule() {
        let mut line = featured_segment(0.0, 0.0, 80.0, 0.0);
        line.thickness = 4.0;

        let (line_type, confidence) = classify_heuristic(&line, false, 200, 200);
        assert_eq!(line_type, LineType::Wall);
        assert!((confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_dimension_rule() {
        let mut line = featured_segment(0.0, 0.0, 40.0, 0.0);
        line.style = LineStyle::Dashed;

        let (line_type, confidence) = classify_heuristic(&line, true, 200, 200);
        assert_eq!(line_type, LineType::Dimension);
        assert!((confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let regions = vec![TextRegion {
            bbox: BoundingBox::new(0.0, 0.0, 50.0, 20.0),
            text: "5m".into(),
            confidence: 0.9,
            is_dimension: true,
            is_annotation: false,
            is_label: false,
        }];

        let featured = vec![
            featured_segment(0.0, 10.0, 60.0, 10.0),
            featured_segment(0.0, 30.0, 120.0, 30.0),
        ];
        let config = LineConfig {
            confidence_threshold: 0.0,
            min_length: 0.0,
            ..Default::default()
        };
        let lines = classify_lines(featured, &regions, None, (200, 200), &config);

        for line in &lines {
            assert!(line.confidence >= 0.0 && line.confidence <= 1.0);
        }
    }

    #[test]
    fn test_filter_removes_exactly_below_threshold() {
        let featured: Vec<FeaturedLine> = (0..6)
            .map(|i| featured_segment(0.0, i as f64 * 30.0, 60.0, i as f64 * 30.0))
            .collect();

        let config = LineConfig {
            confidence_threshold: 0.5,
            min_length: 0.0,
            ..Default::default()
        };
        let kept = classify_lines(featured.clone(), &[], None, (200, 200), &config);
        for line in &kept {
            assert!(line.confidence >= 0.5);
        }

        let all = classify_lines(
            featured,
            &[],
            None,
            (200, 200),
            &LineConfig {
                confidence_threshold: 0.0,
                min_length: 0.0,
                ..Default::default()
            },
        );
        let below: Vec<_> = all.iter().filter(|l| l.confidence < 0.5).collect();
        assert_eq!(all.len() - below.len(), kept.len());
    }

    #[test]
    fn test_context_promotes_supported_unknowns() {
        // Five parallel thin lines: each Unknown (0.3), each with 4 parallel
        // neighbors, so all are promoted to Wall at 0.5
        let featured: Vec<FeaturedLine> = (0..5)
            .map(|i| featured_segment(0.0, i as f64 * 20.0, 60.0, i as f64 * 20.0))
            .collect();

        let config = LineConfig {
            confidence_threshold: 0.0,
            min_length: 0.0,
            ..Default::default()
        };
        let lines = classify_lines(featured, &[], None, (200, 200), &config);

        for line in &lines {
            assert_eq!(line.line_type, LineType::Wall);
            assert!((line.confidence - 0.5).abs() < 1e-9);
            assert_eq!(line.features.parallel_neighbors, 4);
        }
    }

    #[test]
    fn test_mlp_forward_pass() {
        // Identity-free toy model: bias steers everything to class 1
        let model = MlpModel {
            hidden_weights: DMatrix::zeros(4, MLP_INPUT_SIZE),
            hidden_bias: DVector::zeros(4),
            output_weights: DMatrix::zeros(5, 4),
            output_bias: DVector::from_row_slice(&[0.0, 3.0, 0.0, 0.0, 0.0]),
        };

        let features = [0.5; MLP_INPUT_SIZE];
        let (line_type, confidence) = model.classify(&features).unwrap();
        assert_eq!(line_type, LineType::Dimension);
        assert!(confidence > 0.5 && confidence <= 1.0);
    }

    #[test]
    fn test_mlp_shape_mismatch_returns_none() {
        let model = MlpModel {
            hidden_weights: DMatrix::zeros(4, 7),
            hidden_bias: DVector::zeros(4),
            output_weights: DMatrix::zeros(5, 4),
            output_bias: DVector::zeros(5),
        };
        assert!(model.classify(&[0.0; MLP_INPUT_SIZE]).is_none());
    }
}
