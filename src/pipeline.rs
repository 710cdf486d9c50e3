// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline orchestration: staged execution with progress reporting,
//! result caching and partial-failure fallback.
//!
//! Stages run strictly in order and each returns an explicit `Result`; a
//! failing stage is recorded, the remainder of the run is abandoned, and a
//! minimal default layout stands in so collaborators always receive a
//! well-formed [`PipelineResult`]. Successful results are cached by
//! input-content signature plus option set.

use std::time::Instant;

use image::GrayImage;

use crate::cache::{cache_key, ResultCache};
use crate::contours::trace_contours;
use crate::error::{Error, Result};
use crate::image_ops::{
    downscale_to_max, equalize_contrast, gaussian_blur, median_filter, morphological_close,
    rgba_to_grayscale, sobel_magnitude,
};
use crate::line_classifier::{classify_lines, detect_lines, extract_features, MlpModel};
use crate::room_detector::{detect_rooms, ROOM_PALETTE};
use crate::scale::calibrate;
use crate::text_filter::{filter_text, HeuristicRecognizer, TextRecognizer};
use crate::types::{
    PipelineConfig, PipelineResult, Point2D, ProcessingStage, Room, RoomType, StageStatus, Wall,
};
use crate::wall_extractor::extract_walls;

pub const STAGE_PREPROCESS: &str = "preprocess";
pub const STAGE_TEXT_FILTER: &str = "text-filter";
pub const STAGE_EDGES: &str = "edges";
pub const STAGE_MORPHOLOGY: &str = "morphology";
pub const STAGE_CONTOURS: &str = "contours";
pub const STAGE_ROOMS: &str = "rooms";
pub const STAGE_WALLS: &str = "walls";
pub const STAGE_LINES: &str = "lines";
pub const STAGE_SCALE: &str = "scale";

/// Progress contract: `(stage_id, progress 0-100, detail)`
pub type ProgressCallback = Box<dyn FnMut(&str, f64, &str)>;

/// Confidence reported when a stage failure forces the default layout
const FALLBACK_FAILURE_CONFIDENCE: f64 = 0.6;
/// Confidence reported when detection finds no rooms at all
const FALLBACK_EMPTY_CONFIDENCE: f64 = 0.3;
/// Text-region count considered likely to interfere with structure
const EXCESSIVE_TEXT_REGIONS: usize = 50;

/// Staged floor plan analysis pipeline.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    cache: ResultCache,
    recognizer: Box<dyn TextRecognizer>,
    model: Option<MlpModel>,
    progress: Option<ProgressCallback>,
    last_cache_hit: bool,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: ResultCache::default(),
            recognizer: Box::new(HeuristicRecognizer),
            model: None,
            progress: None,
            last_cache_hit: false,
        }
    }

    /// Inject a real OCR capability in place of the heuristic fallback.
    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Supply a trained line classification model.
    pub fn with_model(mut self, model: MlpModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Register the progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Replace the default result cache (capacity 10, 24h expiry).
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    /// Whether the most recent [`run`](Self::run) was served from the cache.
    pub fn last_cache_hit(&self) -> bool {
        self.last_cache_hit
    }

    /// Drop all cached results.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Run the full pipeline on an RGBA raster.
    ///
    /// Never panics and never propagates stage failures: the worst case is
    /// a fallback result carrying the recorded errors.
    pub fn run(&mut self, rgba: &[u8], width: u32, height: u32) -> PipelineResult {
        self.last_cache_hit = false;

        if width == 0 || height == 0 || rgba.len() < (width as usize * height as usize * 4) {
            tracing::warn!(width, height, len = rgba.len(), "malformed input raster");
            let error = Error::InvalidInput("empty or undersized RGBA buffer".to_string());
            let mut result = fallback_result(width.max(1), height.max(1), Vec::new());
            result.confidence = FALLBACK_FAILURE_CONFIDENCE;
            result.errors.push(error.to_string());
            return result;
        }

        let key = cache_key(rgba, width, height, &self.config);
        if let Some(hit) = self.cache.get(key) {
            self.last_cache_hit = true;
            return hit;
        }

        let mut stages: Vec<ProcessingStage> = Vec::new();

        // Stage 1: preprocessing
        let gray = match self.run_stage(&mut stages, STAGE_PREPROCESS, |s, emit| {
            let gray = rgba_to_grayscale(rgba, width, height);
            emit(25.0, "grayscale");
            let gray = downscale_to_max(&gray, s.config.preprocess.max_dimension);
            if gray.width() < 3 || gray.height() < 3 {
                return Err(Error::stage(STAGE_PREPROCESS, "raster too small to analyze"));
            }
            emit(50.0, "downscale");
            let gray = gaussian_blur(&gray, s.config.preprocess.blur_radius);
            emit(75.0, "blur");
            let gray = median_filter(&equalize_contrast(&gray));
            Ok(gray)
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, width, height),
        };
        let (work_w, work_h) = gray.dimensions();

        // Stage 2: text regions (reads the preprocessed raster immutably)
        let text = match self.run_stage(&mut stages, STAGE_TEXT_FILTER, |s, _emit| {
            filter_text(&gray, s.recognizer.as_ref(), &s.config.text)
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };
        let cleaned: GrayImage = match text.cleaned {
            Some(ref c) => c.clone(),
            None => gray.clone(),
        };

        // Stage 3: edge detection
        let edges = match self.run_stage(&mut stages, STAGE_EDGES, |_, _| {
            Ok(sobel_magnitude(&cleaned))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 4: morphological cleanup
        let morphed = match self.run_stage(&mut stages, STAGE_MORPHOLOGY, |s, _| {
            Ok(morphological_close(&edges, s.config.morphology_kernel))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 5: contour tracing
        let trace = match self.run_stage(&mut stages, STAGE_CONTOURS, |s, _| {
            Ok(trace_contours(&morphed, &s.config.contour, Some(&text.mask)))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 6: room detection
        let rooms_out = match self.run_stage(&mut stages, STAGE_ROOMS, |s, _| {
            Ok(detect_rooms(&cleaned, &s.config.room))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 7: wall extraction
        let walls = match self.run_stage(&mut stages, STAGE_WALLS, |s, _| {
            Ok(extract_walls(&trace.contours, &s.config.wall))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 8: line classification
        let lines = match self.run_stage(&mut stages, STAGE_LINES, |s, emit| {
            let raw = detect_lines(&edges, &s.config.line, Some(&text.mask));
            emit(40.0, "raw lines traced");
            let featured: Vec<_> = raw
                .into_iter()
                .map(|r| extract_features(r, &cleaned, &s.config.line))
                .collect();
            emit(70.0, "features measured");
            Ok(classify_lines(
                featured,
                &text.regions,
                s.model.as_ref(),
                (work_w, work_h),
                &s.config.line,
            ))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Stage 9: scale calibration
        let scale = match self.run_stage(&mut stages, STAGE_SCALE, |s, _| {
            Ok(calibrate(&cleaned, &text.regions, &lines, &s.config.scale))
        }) {
            Ok(v) => v,
            Err(e) => return self.fail(stages, e, work_w, work_h),
        };

        // Assemble the result
        let mut warnings = Vec::new();
        if trace.truncated {
            warnings.push("contour tracing hit its traversal budget; output may be incomplete".to_string());
        }
        if text.regions.len() > EXCESSIVE_TEXT_REGIONS {
            warnings.push("excessive text regions may interfere with structural lines".to_string());
        }
        if scale.is_none() {
            warnings.push("scale could not be determined".to_string());
        }

        let mut result = if rooms_out.rooms.is_empty() {
            warnings.push("no rooms detected; using default layout".to_string());
            let mut fallback = fallback_result(work_w, work_h, stages);
            fallback.confidence = FALLBACK_EMPTY_CONFIDENCE;
            fallback.lines = lines;
            fallback.scale = scale;
            fallback
        } else {
            if walls.is_empty() {
                warnings.push("no walls detected".to_string());
            }
            let confidence = compute_confidence(&rooms_out.rooms, &walls, &lines, scale.as_ref());
            PipelineResult {
                rooms: rooms_out.rooms,
                walls,
                doors: Vec::new(),
                windows: Vec::new(),
                lines,
                scale,
                confidence,
                warnings: Vec::new(),
                errors: Vec::new(),
                stages,
            }
        };

        if result.confidence < 0.5 {
            warnings.push("low confidence result".to_string());
        }
        result.warnings = warnings;

        self.cache.set(key, result.clone());
        result
    }

    /// Execute one stage: transition Pending -> Processing -> Completed or
    /// Error, record duration, and surface progress through the callback.
    fn run_stage<T>(
        &mut self,
        stages: &mut Vec<ProcessingStage>,
        id: &str,
        f: impl FnOnce(&mut Self, &mut dyn FnMut(f64, &str)) -> Result<T>,
    ) -> Result<T> {
        let mut stage = ProcessingStage::pending(id);
        stage.status = StageStatus::Processing;
        stages.push(stage);

        if let Some(cb) = self.progress.as_mut() {
            cb(id, 0.0, "started");
        }
        tracing::debug!(stage = id, "stage started");

        let start = Instant::now();
        let mut reported: Vec<(f64, String)> = Vec::new();
        let result = f(self, &mut |pct, detail| {
            reported.push((pct, detail.to_string()));
        });
        // Forward intermediate reports after the stage body releases self
        if let Some(cb) = self.progress.as_mut() {
            for (pct, detail) in &reported {
                cb(id, *pct, detail);
            }
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let stage = stages.last_mut().unwrap();
        stage.duration_ms = duration_ms;

        match result {
            Ok(value) => {
                stage.status = StageStatus::Completed;
                stage.progress = 100.0;
                if let Some(cb) = self.progress.as_mut() {
                    cb(id, 100.0, "completed");
                }
                tracing::debug!(stage = id, duration_ms, "stage completed");
                Ok(value)
            }
            Err(e) => {
                stage.status = StageStatus::Error;
                stage.error = Some(e.to_string());
                tracing::warn!(stage = id, error = %e, "stage failed");
                Err(e)
            }
        }
    }

    /// A stage failed: record the error and hand back the default layout.
    /// The remaining stages are abandoned, never retried in place.
    fn fail(
        &mut self,
        stages: Vec<ProcessingStage>,
        error: Error,
        width: u32,
        height: u32,
    ) -> PipelineResult {
        let mut result = fallback_result(width, height, stages);
        result.confidence = FALLBACK_FAILURE_CONFIDENCE;
        result.errors.push(error.to_string());
        result
            .warnings
            .push("stage failure; using default layout".to_string());
        result
    }
}

/// Overall confidence from detection volume and per-element confidence
fn compute_confidence(
    rooms: &[Room],
    walls: &[Wall],
    lines: &[crate::types::ClassifiedLine],
    scale: Option<&crate::types::Scale>,
) -> f64 {
    let room_score = rooms.len().min(4) as f64 / 4.0;
    let wall_score = walls.len().min(8) as f64 / 8.0;
    let line_score = if lines.is_empty() {
        0.5
    } else {
        lines.iter().map(|l| l.confidence).sum::<f64>() / lines.len() as f64
    };
    let scale_score = scale.map(|s| s.confidence).unwrap_or(0.0);

    (0.3 + 0.3 * room_score + 0.2 * wall_score + 0.1 * line_score + 0.1 * scale_score)
        .clamp(0.0, 1.0)
}

/// Fixed 4-room / 4-wall layout used when detection fails or comes back
/// structurally empty.
fn fallback_result(width: u32, height: u32, stages: Vec<ProcessingStage>) -> PipelineResult {
    let w = width as f64;
    let h = height as f64;
    let margin_x = w * 0.1;
    let margin_y = h * 0.1;
    let (x0, y0, x1, y1) = (margin_x, margin_y, w - margin_x, h - margin_y);
    let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);

    let quadrants = [
        (RoomType::LivingRoom, x0, y0, cx, cy),
        (RoomType::Kitchen, cx, y0, x1, cy),
        (RoomType::Bedroom, x0, cy, cx, y1),
        (RoomType::Bathroom, cx, cy, x1, y1),
    ];

    let rooms = quadrants
        .iter()
        .enumerate()
        .map(|(id, (room_type, qx0, qy0, qx1, qy1))| Room {
            id,
            name: format!("{} {}", room_type.display_name(), id + 1),
            room_type: *room_type,
            color: ROOM_PALETTE[id % ROOM_PALETTE.len()].to_string(),
            polygon: vec![
                Point2D::new(*qx0, *qy0),
                Point2D::new(*qx1, *qy0),
                Point2D::new(*qx1, *qy1),
                Point2D::new(*qx0, *qy1),
            ],
            center: Point2D::new((qx0 + qx1) / 2.0, (qy0 + qy1) / 2.0),
            pixel_area: (qx1 - qx0) * (qy1 - qy0),
        })
        .collect();

    let corners = [
        (x0, y0, x1, y0),
        (x1, y0, x1, y1),
        (x1, y1, x0, y1),
        (x0, y1, x0, y0),
    ];
    let walls = corners
        .iter()
        .map(|(sx, sy, ex, ey)| Wall::new(Point2D::new(*sx, *sy), Point2D::new(*ex, *ey), 5.0))
        .collect();

    PipelineResult {
        rooms,
        walls,
        doors: Vec::new(),
        windows: Vec::new(),
        lines: Vec::new(),
        scale: None,
        confidence: FALLBACK_EMPTY_CONFIDENCE,
        warnings: Vec::new(),
        errors: Vec::new(),
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn solid_rgba(width: u32, height: u32, value: u8) -> Vec<u8> {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[value, value, value, 255]);
        }
        rgba
    }

    #[test]
    fn test_malformed_input_falls_back() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let result = orchestrator.run(&[], 0, 0);

        assert_eq!(result.rooms.len(), 4);
        assert_eq!(result.walls.len(), 4);
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_tiny_raster_fails_preprocess_stage() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let rgba = solid_rgba(2, 2, 255);
        let result = orchestrator.run(&rgba, 2, 2);

        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.stages[0].status, StageStatus::Error);
        assert!(result.stages[0].error.is_some());
        assert_eq!(result.rooms.len(), 4);
    }

    #[test]
    fn test_all_black_raster_uses_empty_fallback() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let rgba = solid_rgba(200, 150, 0);
        let result = orchestrator.run(&rgba, 200, 150);

        assert_eq!(result.rooms.len(), 4);
        assert!((result.confidence - 0.3).abs() < 1e-9);
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("no rooms detected")));
        // All stages completed despite the empty detection
        assert!(result
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Completed));
    }

    #[test]
    fn test_progress_is_monotonic_within_stage() {
        let reports: Rc<RefCell<Vec<(String, f64)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);

        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default())
            .with_progress(Box::new(move |stage, pct, _| {
                sink.borrow_mut().push((stage.to_string(), pct));
            }));

        let rgba = solid_rgba(64, 64, 0);
        let _ = orchestrator.run(&rgba, 64, 64);

        let reports = reports.borrow();
        assert!(!reports.is_empty());
        let mut last: Option<(&str, f64)> = None;
        for (stage, pct) in reports.iter() {
            assert!((0.0..=100.0).contains(pct));
            if let Some((prev_stage, prev_pct)) = last {
                if prev_stage == stage.as_str() {
                    assert!(*pct >= prev_pct, "regression within stage {stage}");
                }
            }
            last = Some((stage.as_str(), *pct));
        }
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let rgba = solid_rgba(100, 100, 0);
        let result = orchestrator.run(&rgba, 100, 100);

        let ids: Vec<&str> = result.stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                STAGE_PREPROCESS,
                STAGE_TEXT_FILTER,
                STAGE_EDGES,
                STAGE_MORPHOLOGY,
                STAGE_CONTOURS,
                STAGE_ROOMS,
                STAGE_WALLS,
                STAGE_LINES,
                STAGE_SCALE,
            ]
        );
    }

    #[test]
    fn test_doors_and_windows_reserved_empty() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let rgba = solid_rgba(100, 100, 0);
        let result = orchestrator.run(&rgba, 100, 100);
        assert!(result.doors.is_empty());
        assert!(result.windows.is_empty());
    }

    #[test]
    fn test_identical_run_is_cache_hit() {
        let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default());
        let rgba = solid_rgba(120, 90, 0);

        let first = orchestrator.run(&rgba, 120, 90);
        assert!(!orchestrator.last_cache_hit());

        let second = orchestrator.run(&rgba, 120, 90);
        assert!(orchestrator.last_cache_hit());
        assert_eq!(first, second);

        orchestrator.clear_cache();
        let third = orchestrator.run(&rgba, 120, 90);
        assert!(!orchestrator.last_cache_hit());
        assert_eq!(first.rooms, third.rooms);
        assert_eq!(first.warnings, third.warnings);
    }
}
