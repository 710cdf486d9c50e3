// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room detection via flood-fill region growth over light areas.
//!
//! Seeds are sampled on a coarse grid; each light region is grown with a
//! budgeted 4-connected work queue. A region becomes a room only when the
//! fill ran to completion and its pixel count lands inside the acceptance
//! window — truncated fills are unbounded areas (open background), not
//! rooms.

use image::GrayImage;

use crate::types::{BoundingBox, Point2D, Room, RoomConfig, RoomType};

/// Fixed display palette, assigned round-robin in discovery order
pub(crate) const ROOM_PALETTE: [&str; 8] = [
    "#4f86c6", "#6fbf73", "#e2a24b", "#b87fc9", "#d96a6a", "#5bbcb6", "#c9b458", "#8d9db6",
];

/// Output of a room detection pass
#[derive(Debug, Clone)]
pub struct RoomDetectResult {
    pub rooms: Vec<Room>,
    /// Number of flood fills stopped by a traversal budget
    pub truncated_fills: usize,
}

/// Detect rooms as completed flood-fill regions of light pixels.
pub fn detect_rooms(gray: &GrayImage, config: &RoomConfig) -> RoomDetectResult {
    let (w, h) = gray.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut rooms = Vec::new();
    let mut truncated_fills = 0usize;

    let stride = config.seed_stride.max(1);
    let image_center = Point2D::new(w as f64 / 2.0, h as f64 / 2.0);

    'seeding: for sy in (0..h).step_by(stride as usize) {
        for sx in (0..w).step_by(stride as usize) {
            let idx = (sy * w + sx) as usize;
            if visited[idx] {
                continue;
            }
            if gray.get_pixel(sx, sy).0[0] <= config.light_threshold {
                continue;
            }

            let fill = flood_fill(gray, sx, sy, config, &mut visited);
            if fill.truncated {
                truncated_fills += 1;
                continue;
            }

            let area = fill.pixel_count as f64;
            if area < config.min_area || area > config.max_area {
                continue;
            }

            let id = rooms.len();
            rooms.push(build_room(id, area, &fill.bbox, &image_center));
            if rooms.len() >= config.max_rooms {
                break 'seeding;
            }
        }
    }

    RoomDetectResult {
        rooms,
        truncated_fills,
    }
}

struct FillResult {
    pixel_count: usize,
    bbox: BoundingBox,
    truncated: bool,
}

/// Budgeted 4-connected flood fill over light pixels.
fn flood_fill(
    gray: &GrayImage,
    seed_x: u32,
    seed_y: u32,
    config: &RoomConfig,
    visited: &mut [bool],
) -> FillResult {
    let (w, h) = gray.dimensions();
    let (wi, hi) = (w as i64, h as i64);

    let mut stack = vec![(seed_x as i64, seed_y as i64)];
    let mut pixel_count = 0usize;
    let mut truncated = false;
    let (mut min_x, mut min_y) = (seed_x as i64, seed_y as i64);
    let (mut max_x, mut max_y) = (seed_x as i64, seed_y as i64);

    while let Some((x, y)) = stack.pop() {
        let idx = (y * wi + x) as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        pixel_count += 1;

        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);

        if pixel_count >= config.max_region {
            truncated = true;
            break;
        }

        for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || nx >= wi || ny < 0 || ny >= hi {
                continue;
            }
            let nidx = (ny * wi + nx) as usize;
            if visited[nidx] {
                continue;
            }
            if gray.get_pixel(nx as u32, ny as u32).0[0] <= config.light_threshold {
                continue;
            }
            if stack.len() >= config.max_stack {
                truncated = true;
                continue;
            }
            stack.push((nx, ny));
        }
    }

    FillResult {
        pixel_count,
        bbox: BoundingBox::new(min_x as f64, min_y as f64, max_x as f64, max_y as f64),
        truncated,
    }
}

/// Build a room from an accepted fill: the bounding box becomes a 4-vertex
/// polygon, centered and scaled by the fixed 0.5 coordinate factor around
/// the image center.
fn build_room(id: usize, area: f64, bbox: &BoundingBox, image_center: &Point2D) -> Room {
    let transform = |x: f64, y: f64| {
        Point2D::new(
            image_center.x + (x - image_center.x) * 0.5,
            image_center.y + (y - image_center.y) * 0.5,
        )
    };

    let polygon = vec![
        transform(bbox.min_x, bbox.min_y),
        transform(bbox.max_x, bbox.min_y),
        transform(bbox.max_x, bbox.max_y),
        transform(bbox.min_x, bbox.max_y),
    ];
    let raw_center = bbox.center();
    let center = transform(raw_center.x, raw_center.y);

    let width = bbox.width().max(1.0);
    let height = bbox.height().max(1.0);
    let ratio = (width.max(height)) / (width.min(height));
    let room_type = classify_room(area, ratio);

    Room {
        id,
        name: format!("{} {}", room_type.display_name(), id + 1),
        room_type,
        color: ROOM_PALETTE[id % ROOM_PALETTE.len()].to_string(),
        polygon,
        center,
        pixel_area: area,
    }
}

/// Heuristic room classification on (area, aspect ratio)
fn classify_room(area: f64, ratio: f64) -> RoomType {
    if area < 2000.0 {
        RoomType::Bathroom
    } else if area < 5000.0 && ratio > 2.0 {
        RoomType::Hallway
    } else if area < 5000.0 {
        RoomType::Bedroom
    } else if area < 8000.0 {
        RoomType::Kitchen
    } else if area < 12_000.0 {
        RoomType::LivingRoom
    } else {
        RoomType::LargeRoom
    }
}
