// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall extraction from simplified contours.
//!
//! Consecutive contour vertex pairs above the length threshold become wall
//! candidates. The base extraction produces redundant near-collinear
//! segments when the same wall is traced from both of its edge contours;
//! the optional merge pass collapses those into a single centerline.

use std::f64::consts::PI;

use crate::contours::perpendicular_distance;
use crate::types::{Point2D, Wall, WallConfig};

/// Extract wall segments from simplified contours.
pub fn extract_walls(contours: &[Vec<Point2D>], config: &WallConfig) -> Vec<Wall> {
    let mut walls = Vec::new();

    for contour in contours {
        for pair in contour.windows(2) {
            let length = pair[0].distance_to(&pair[1]);
            if length > config.min_length {
                walls.push(Wall::new(pair[0], pair[1], config.default_thickness));
            }
        }
    }

    if config.merge_collinear {
        merge_collinear_walls(walls, config)
    } else {
        walls
    }
}

/// Merge near-collinear wall segments from different contours.
///
/// Segments merge when their directions agree, the perpendicular offset is
/// small, and their projections along the shared direction overlap or leave
/// at most `merge_max_gap` pixels of gap. Walls of separate structures that
/// merely share an axis stay apart.
fn merge_collinear_walls(walls: Vec<Wall>, config: &WallConfig) -> Vec<Wall> {
    if walls.is_empty() {
        return walls;
    }

    let mut merged: Vec<Wall> = Vec::new();
    let mut used = vec![false; walls.len()];

    for i in 0..walls.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut group = vec![&walls[i]];

        for j in 0..walls.len() {
            if used[j] {
                continue;
            }
            if can_merge(&walls[i], &walls[j], config) {
                group.push(&walls[j]);
                used[j] = true;
            }
        }

        merged.push(merge_group(&group));
    }

    merged
}

fn can_merge(a: &Wall, b: &Wall, config: &WallConfig) -> bool {
    let mut angle_diff = (a.orientation() - b.orientation()).abs();
    // Opposite-direction segments describe the same wall
    if angle_diff > PI / 2.0 {
        angle_diff = PI - angle_diff;
    }
    if angle_diff > config.merge_angle_tolerance {
        return false;
    }

    let b_mid = b.start.midpoint(&b.end);
    if perpendicular_distance(&b_mid, &a.start, &a.end) > config.merge_distance_tolerance {
        return false;
    }

    // Projection intervals along a's direction must touch or nearly touch
    let angle = a.orientation();
    let (cos_a, sin_a) = (angle.cos(), angle.sin());
    let project = |p: &Point2D| p.x * cos_a + p.y * sin_a;

    let (a_lo, a_hi) = ordered(project(&a.start), project(&a.end));
    let (b_lo, b_hi) = ordered(project(&b.start), project(&b.end));

    let gap = (b_lo - a_hi).max(a_lo - b_hi);
    gap <= config.merge_max_gap
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Merge a group of collinear walls into one spanning segment.
fn merge_group(group: &[&Wall]) -> Wall {
    if group.len() == 1 {
        return group[0].clone();
    }

    // Average the direction as sign-canonicalized unit vectors; opposite
    // traversal directions describe the same wall and must not cancel
    let mut ux = 0.0;
    let mut uy = 0.0;
    for wall in group {
        let mut dx = wall.end.x - wall.start.x;
        let mut dy = wall.end.y - wall.start.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len < 1e-10 {
            continue;
        }
        dx /= len;
        dy /= len;
        if dx < 0.0 || (dx == 0.0 && dy < 0.0) {
            dx = -dx;
            dy = -dy;
        }
        ux += dx;
        uy += dy;
    }
    let norm = (ux * ux + uy * uy).sqrt();
    if norm < 1e-10 {
        return group[0].clone();
    }
    ux /= norm;
    uy /= norm;

    // Project all endpoints onto the direction and keep the extremes
    let mut min_proj = f64::MAX;
    let mut max_proj = f64::MIN;
    let mut min_point = group[0].start;
    let mut max_point = group[0].start;

    for wall in group {
        for point in [&wall.start, &wall.end] {
            let proj = point.x * ux + point.y * uy;
            if proj < min_proj {
                min_proj = proj;
                min_point = *point;
            }
            if proj > max_proj {
                max_proj = proj;
                max_point = *point;
            }
        }
    }

    let avg_thickness = group.iter().map(|w| w.thickness).sum::<f64>() / group.len() as f64;
    Wall::new(min_point, max_point, avg_thickness)
}
