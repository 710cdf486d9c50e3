// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{draw_filled_rect, draw_rect_border, uniform_rgba};
use floorplan_vision::text_filter::TextRecognizer;
use floorplan_vision::types::{BoundingBox, RecognizedWord};
use floorplan_vision::{PipelineConfig, PipelineOrchestrator, ScaleUnit, StageStatus};
use image::GrayImage;

#[test]
fn blank_raster_falls_back_to_default_layout() {
    let rgba = uniform_rgba(800, 600, 255);
    let mut pipeline = PipelineOrchestrator::new(PipelineConfig::default());
    let result = pipeline.run(&rgba, 800, 600);

    // No bright-to-dark boundary anywhere: detection comes back empty and
    // the fixed 4-room layout stands in
    assert_eq!(result.rooms.len(), 4);
    assert!((result.confidence - 0.3).abs() < 1e-9);
    assert!(result.errors.is_empty());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("no rooms detected")));
    assert!(result
        .stages
        .iter()
        .all(|s| s.status == StageStatus::Completed));
}

#[test]
fn two_rectangles_yield_two_rooms_and_their_walls() {
    let (width, height) = (800u32, 600u32);
    let mut rgba = uniform_rgba(width, height, 255);
    // Two 50x50 high-contrast rectangles with 3px borders, 30px apart
    draw_rect_border(&mut rgba, width, 200, 200, 50, 50, 3);
    draw_rect_border(&mut rgba, width, 280, 200, 50, 50, 3);

    let mut pipeline = PipelineOrchestrator::new(PipelineConfig::default());
    let result = pipeline.run(&rgba, width, height);

    assert_eq!(result.rooms.len(), 2, "expected exactly the two interiors");
    for room in &result.rooms {
        assert!(room.polygon.len() >= 3);
        assert!(room.pixel_area >= 1000.0 && room.pixel_area <= 30_000.0);
    }

    assert!(
        result.walls.len() >= 4,
        "expected at least four wall segments, got {}",
        result.walls.len()
    );
    for wall in &result.walls {
        assert!(wall.length > 20.0);
    }
    let side_length_walls = result
        .walls
        .iter()
        .filter(|w| w.length >= 40.0 && w.length <= 60.0)
        .count();
    assert!(
        side_length_walls >= 4,
        "expected at least four ~50px sides, got {side_length_walls}"
    );
}

struct ScaleCaptionStub {
    bbox: BoundingBox,
}

impl TextRecognizer for ScaleCaptionStub {
    fn recognize(
        &self,
        _raster: &GrayImage,
    ) -> floorplan_vision::Result<Vec<RecognizedWord>> {
        Ok(vec![RecognizedWord {
            text: "5m".into(),
            confidence: 0.95,
            bbox: self.bbox,
        }])
    }
}

#[test]
fn scale_bar_with_caption_resolves_meters() {
    let (width, height) = (400u32, 300u32);
    let mut rgba = uniform_rgba(width, height, 255);
    // 100px horizontal bar with the caption "5m" to its right
    draw_filled_rect(&mut rgba, width, 100, 200, 100, 4);

    let recognizer = ScaleCaptionStub {
        bbox: BoundingBox::new(210.0, 190.0, 230.0, 205.0),
    };
    let mut pipeline = PipelineOrchestrator::new(PipelineConfig::default())
        .with_recognizer(Box::new(recognizer));
    let result = pipeline.run(&rgba, width, height);

    let scale = result.scale.expect("scale should be resolved");
    assert_eq!(scale.unit, ScaleUnit::Meters);
    assert!(
        (scale.ratio - 20.0).abs() <= 1.0,
        "expected ~20 px/m, got {}",
        scale.ratio
    );
    assert!(scale.confidence >= 0.7);
}

#[test]
fn identical_input_and_options_hit_the_cache() {
    let (width, height) = (800u32, 600u32);
    let mut rgba = uniform_rgba(width, height, 255);
    draw_rect_border(&mut rgba, width, 200, 200, 50, 50, 3);
    draw_rect_border(&mut rgba, width, 280, 200, 50, 50, 3);

    let progress_calls: Rc<RefCell<usize>> = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&progress_calls);

    let mut pipeline = PipelineOrchestrator::new(PipelineConfig::default())
        .with_progress(Box::new(move |_, _, _| {
            *counter.borrow_mut() += 1;
        }));

    let first = pipeline.run(&rgba, width, height);
    assert!(!pipeline.last_cache_hit());
    let calls_after_first = *progress_calls.borrow();
    assert!(calls_after_first > 0);

    let second = pipeline.run(&rgba, width, height);
    assert!(pipeline.last_cache_hit());
    // Deep equality, including warnings and errors
    assert_eq!(first, second);
    // No stage re-executed: no further progress reports
    assert_eq!(*progress_calls.borrow(), calls_after_first);
}

#[test]
fn changed_options_bypass_the_cache() {
    let rgba = uniform_rgba(200, 150, 255);

    let mut first = PipelineOrchestrator::new(PipelineConfig::default());
    let _ = first.run(&rgba, 200, 150);

    let mut config = PipelineConfig::default();
    config.wall.min_length = 25.0;
    let mut second = PipelineOrchestrator::new(config);
    let _ = second.run(&rgba, 200, 150);
    assert!(!second.last_cache_hit());
}
