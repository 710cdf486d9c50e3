// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contour tracing over edge rasters.
//!
//! Bright connected regions are grown with an explicit work queue under a
//! configurable budget; the result reports whether any trace was truncated
//! so callers can distinguish capped output from complete output. Traced
//! contours are simplified with Douglas-Peucker before downstream use.

use image::GrayImage;

use crate::types::{ContourConfig, Point2D};

/// Output of a contour tracing pass
#[derive(Debug, Clone)]
pub struct TraceResult {
    /// Simplified contours, in discovery order
    pub contours: Vec<Vec<Point2D>>,
    /// True when a budget (queue depth or point count) stopped a trace early
    pub truncated: bool,
}

/// Trace bright connected regions into simplified contours.
///
/// Seeds are sampled on a coarse grid for performance. When `text_mask` is
/// supplied (row-major, `width * height`), seeds inside masked text regions
/// are skipped so lettering does not produce structural contours.
pub fn trace_contours(
    edges: &GrayImage,
    config: &ContourConfig,
    text_mask: Option<&[bool]>,
) -> TraceResult {
    let (w, h) = edges.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut contours = Vec::new();
    let mut truncated = false;

    let stride = config.seed_stride.max(1);

    'seeding: for sy in (0..h).step_by(stride as usize) {
        for sx in (0..w).step_by(stride as usize) {
            let idx = (sy * w + sx) as usize;
            if visited[idx] {
                continue;
            }
            if edges.get_pixel(sx, sy).0[0] <= config.brightness_threshold {
                continue;
            }
            if let Some(mask) = text_mask {
                if mask[idx] {
                    continue;
                }
            }

            let (contour, hit_budget) = grow_region(edges, sx, sy, config, &mut visited);
            truncated |= hit_budget;

            if contour.len() >= config.min_points && contour.len() <= config.max_points {
                let simplified = douglas_peucker(&contour, config.simplify_tolerance);
                contours.push(simplified);
                if contours.len() >= config.max_contours {
                    break 'seeding;
                }
            }
        }
    }

    TraceResult {
        contours,
        truncated,
    }
}

/// Grow one bright 8-connected region from a seed with an explicit
/// work-queue budget. Returns the collected points in traversal order and
/// whether a budget stopped the growth.
fn grow_region(
    edges: &GrayImage,
    seed_x: u32,
    seed_y: u32,
    config: &ContourConfig,
    visited: &mut [bool],
) -> (Vec<Point2D>, bool) {
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
    let mut hit_budget = false;

    while let Some((x, y)) = stack.pop() {
        let idx = (y * wi + x) as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        points.push(Point2D::new(x as f64, y as f64));

        if points.len() >= config.max_trace_points {
            hit_budget = true;
            break;
        }

        for (dx, dy) in NEIGHBORS {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || nx >= wi || ny < 0 || ny >= hi {
                continue;
            }
            let nidx = (ny * wi + nx) as usize;
            if visited[nidx] {
                continue;
            }
            if edges.get_pixel(nx as u32, ny as u32).0[0] <= config.brightness_threshold {
                continue;
            }
            if stack.len() >= config.max_stack {
                hit_budget = true;
                continue;
            }
            stack.push((nx, ny));
        }
    }

    (points, hit_budget)
}

/// Douglas-Peucker polyline simplification.
///
/// Recursively keeps the point of maximum perpendicular distance from the
/// chord between the segment endpoints while that distance exceeds
/// `tolerance`, otherwise collapses the run to the chord.
pub fn douglas_peucker(points: &[Point2D], tolerance: f64) -> Vec<Point2D> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = &points[0];
    let last = &points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;

    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        let left = douglas_peucker(&points[..=max_idx], tolerance);
        let right = douglas_peucker(&points[max_idx..], tolerance);

        let mut result = left;
        result.extend_from_slice(&right[1..]);
        result
    } else {
        vec![*first, *last]
    }
}

/// Perpendicular distance from a point to the infinite line through
/// `line_start` and `line_end`
pub fn perpendicular_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    let length = length_sq.sqrt();
    ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs() / length
}
