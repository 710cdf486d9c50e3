// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text region filtering around an external OCR capability.
//!
//! The core never recognizes text itself: an injected [`TextRecognizer`]
//! returns words with bounding boxes, and this module classifies them,
//! builds a pixel mask over the flagged regions, and repaints the regions
//! with locally-estimated background so lettering does not contaminate
//! structural analysis. A heuristic dark-region detector stands in when no
//! real OCR is available.

use image::GrayImage;

use crate::error::Result;
use crate::image_ops::{equalize_contrast, median_filter, region_sum};
use crate::types::{BoundingBox, RecognizedWord, TextConfig, TextRegion};

/// External OCR capability contract
pub trait TextRecognizer {
    fn recognize(&self, raster: &GrayImage) -> Result<Vec<RecognizedWord>>;
}

/// Fallback recognizer: connected dark regions with plausible text
/// dimensions become empty-text words at 50% confidence.
#[derive(Debug, Default)]
pub struct HeuristicRecognizer;

const DARK_THRESHOLD: u8 = 100;
const FALLBACK_MAX_STACK: usize = 10_000;
const FALLBACK_MAX_REGION: usize = 60_000;

impl TextRecognizer for HeuristicRecognizer {
    fn recognize(&self, raster: &GrayImage) -> Result<Vec<RecognizedWord>> {
        let (w, h) = raster.dimensions();
        let mut visited = vec![false; (w * h) as usize];
        let mut words = Vec::new();

        for sy in 0..h {
            for sx in 0..w {
                let idx = (sy * w + sx) as usize;
                if visited[idx] || raster.get_pixel(sx, sy).0[0] >= DARK_THRESHOLD {
                    continue;
                }

                if let Some(bbox) = grow_dark_region(raster, sx, sy, &mut visited) {
                    let (bw, bh) = (bbox.width() + 1.0, bbox.height() + 1.0);
                    let aspect = bw / bh.max(1.0);
                    let plausible = (5.0..=500.0).contains(&bw)
                        && (5.0..=100.0).contains(&bh)
                        && (0.5..=20.0).contains(&aspect);
                    if plausible {
                        words.push(RecognizedWord {
                            text: String::new(),
                            confidence: 0.5,
                            bbox,
                        });
                    }
                }
            }
        }

        Ok(words)
    }
}

/// Budgeted 4-connected growth over dark pixels; None when truncated.
fn grow_dark_region(
    raster: &GrayImage,
    seed_x: u32,
    seed_y: u32,
    visited: &mut [bool],
) -> Option<BoundingBox> {
    let (w, h) = raster.dimensions();
    let (wi, hi) = (w as i64, h as i64);

    let mut stack = vec![(seed_x as i64, seed_y as i64)];
    let mut count = 0usize;
    let (mut min_x, mut min_y) = (seed_x as i64, seed_y as i64);
    let (mut max_x, mut max_y) = (seed_x as i64, seed_y as i64);

    while let Some((x, y)) = stack.pop() {
        let idx = (y * wi + x) as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        count += 1;
        if count >= FALLBACK_MAX_REGION {
            return None;
        }

        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);

        for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || nx >= wi || ny < 0 || ny >= hi {
                continue;
            }
            let nidx = (ny * wi + nx) as usize;
            if visited[nidx] || raster.get_pixel(nx as u32, ny as u32).0[0] >= DARK_THRESHOLD {
                continue;
            }
            if stack.len() < FALLBACK_MAX_STACK {
                stack.push((nx, ny));
            }
        }
    }

    Some(BoundingBox::new(
        min_x as f64,
        min_y as f64,
        max_x as f64,
        max_y as f64,
    ))
}

/// Output of the text filtering pass
#[derive(Debug, Clone)]
pub struct TextFilterResult {
    pub regions: Vec<TextRegion>,
    /// Row-major pixel mask over the flagged regions
    pub mask: Vec<bool>,
    /// The raster with flagged regions repainted, when removal was requested
    pub cleaned: Option<GrayImage>,
}

/// Run OCR through the boundary, classify the words, and mask/in-paint
/// the flagged regions.
///
/// A recognizer failure is not fatal: the heuristic fallback takes over
/// and the event is logged.
pub fn filter_text(
    gray: &GrayImage,
    recognizer: &dyn TextRecognizer,
    config: &TextConfig,
) -> Result<TextFilterResult> {
    // OCR engines behave better on normalized input
    let prepared = median_filter(&equalize_contrast(gray));

    let words = match recognizer.recognize(&prepared) {
        Ok(words) => words,
        Err(e) => {
            tracing::warn!(error = %e, "text recognizer failed, using heuristic fallback");
            HeuristicRecognizer.recognize(&prepared)?
        }
    };

    let regions: Vec<TextRegion> = words.into_iter().map(classify_word).collect();
    tracing::debug!(regions = regions.len(), "text regions classified");

    let mask = build_mask(gray.dimensions(), &regions);
    let cleaned = if config.remove_text {
        Some(remove_text_regions(gray, &regions, config.inpaint_margin))
    } else {
        None
    };

    Ok(TextFilterResult {
        regions,
        mask,
        cleaned,
    })
}

/// Flag a recognized word as dimension, label or annotation text.
fn classify_word(word: RecognizedWord) -> TextRegion {
    let text = word.text.trim();
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    let has_alpha = text.chars().any(|c| c.is_alphabetic());

    let is_dimension = has_digit && looks_like_measurement(text);
    let is_label = !is_dimension && has_alpha && text.len() >= 3;
    // Empty-text fallback regions still mask as generic annotations
    let is_annotation = !is_dimension && !is_label;

    TextRegion {
        bbox: word.bbox,
        text: word.text,
        confidence: word.confidence,
        is_dimension,
        is_annotation,
        is_label,
    }
}

/// Measurement-looking text: digits followed by a length unit, feet-inches
/// notation, or a dimension cross ("3x4").
fn looks_like_measurement(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.contains('\'') || lower.contains('"') {
        return true;
    }
    if lower.contains('x') || lower.contains('×') {
        return true;
    }
    for unit in ["mm", "cm", "m", "ft", "in"] {
        if let Some(stripped) = lower.strip_suffix(unit) {
            let prefix = stripped.trim();
            if !prefix.is_empty()
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == '.' || c == ',' || c == ' ')
            {
                return true;
            }
        }
    }
    false
}

/// Row-major mask over every flagged region
fn build_mask(dimensions: (u32, u32), regions: &[TextRegion]) -> Vec<bool> {
    let (w, h) = dimensions;
    let mut mask = vec![false; (w * h) as usize];

    for region in regions {
        if !(region.is_dimension || region.is_annotation || region.is_label) {
            continue;
        }
        let x0 = region.bbox.min_x.floor().max(0.0) as u32;
        let y0 = region.bbox.min_y.floor().max(0.0) as u32;
        let x1 = (region.bbox.max_x.ceil() as i64).clamp(0, w as i64 - 1) as u32;
        let y1 = (region.bbox.max_y.ceil() as i64).clamp(0, h as i64 - 1) as u32;

        for y in y0..=y1 {
            for x in x0..=x1 {
                mask[(y * w + x) as usize] = true;
            }
        }
    }

    mask
}

/// Repaint each flagged region with the mean intensity of the margin ring
/// around it (excluding the region itself).
pub fn remove_text_regions(
    gray: &GrayImage,
    regions: &[TextRegion],
    margin: u32,
) -> GrayImage {
    let mut cleaned = gray.clone();
    let (w, h) = gray.dimensions();

    for region in regions {
        if !(region.is_dimension || region.is_annotation || region.is_label) {
            continue;
        }

        let outer = region.bbox.expanded(margin as f64);
        let (outer_sum, outer_count) = region_sum(gray, &outer);
        let (inner_sum, inner_count) = region_sum(gray, &region.bbox);

        let ring_count = outer_count.saturating_sub(inner_count);
        let background = if ring_count == 0 {
            255.0
        } else {
            (outer_sum - inner_sum) / ring_count as f64
        };
        let fill = background.clamp(0.0, 255.0) as u8;

        let x0 = region.bbox.min_x.floor().max(0.0) as u32;
        let y0 = region.bbox.min_y.floor().max(0.0) as u32;
        let x1 = (region.bbox.max_x.ceil() as i64).clamp(0, w as i64 - 1) as u32;
        let y1 = (region.bbox.max_y.ceil() as i64).clamp(0, h as i64 - 1) as u32;

        for y in y0..=y1 {
            for x in x0..=x1 {
                cleaned.put_pixel(x, y, image::Luma([fill]));
            }
        }
    }

    cleaned
}
