// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for floor plan raster analysis

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates (simplified for serialization)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_nalgebra(p: &Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point2D) -> Point2D {
        Point2D::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point2D {
        Point2D::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Expand the box by `margin` pixels on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// Semantic room classification derived from area and aspect ratio
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomType {
    Bathroom,
    Hallway,
    Bedroom,
    Kitchen,
    LivingRoom,
    LargeRoom,
}

impl RoomType {
    pub fn display_name(&self) -> &'static str {
        match self {
            RoomType::Bathroom => "Bathroom",
            RoomType::Hallway => "Hallway",
            RoomType::Bedroom => "Bedroom",
            RoomType::Kitchen => "Kitchen",
            RoomType::LivingRoom => "Living Room",
            RoomType::LargeRoom => "Large Room",
        }
    }
}

/// Detected room: a flood-filled light region accepted by the area window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: usize,
    pub name: String,
    pub room_type: RoomType,
    /// Display color assigned round-robin from a fixed palette ("#rrggbb")
    pub color: String,
    /// Ordered vertex list, at least 3 vertices
    pub polygon: Vec<Point2D>,
    pub center: Point2D,
    /// Number of flood-filled pixels, frozen at detection time
    pub pixel_area: f64,
}

/// Detected wall segment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wall {
    pub start: Point2D,
    pub end: Point2D,
    /// Estimated thickness in pixels
    pub thickness: f64,
    pub length: f64,
}

impl Wall {
    pub fn new(start: Point2D, end: Point2D, thickness: f64) -> Self {
        let length = start.distance_to(&end);
        Self {
            start,
            end,
            thickness,
            length,
        }
    }

    pub fn orientation(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }
}

/// Reserved opening type: doors/windows are not detected in this version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opening {
    pub position: Point2D,
    pub width: f64,
    pub host_wall_index: usize,
}

/// Semantic line classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LineType {
    Wall,
    Dimension,
    Annotation,
    Grid,
    Unknown,
}

/// Stroke style inferred from gap sampling along the line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
    DashDot,
}

/// A connected edge trace before any feature extraction
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub start: Point2D,
    pub end: Point2D,
    /// Traced edge pixels, in traversal order
    pub points: Vec<Point2D>,
}

impl RawLine {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }
}

/// Feature vector measured along a raw line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LineFeatures {
    /// Mean inverted grayscale along the line, normalized to [0,1]
    pub intensity: f64,
    /// 1 - (mean perpendicular deviation from the chord / 10), clamped >= 0
    pub straightness: f64,
    /// 1 - (total gap length / point count)
    pub continuity: f64,
    /// Count of near-parallel neighbors (angle diff < 0.1 rad)
    pub parallel_neighbors: usize,
    /// Count of near-perpendicular neighbors (|diff - pi/2| < 0.1 rad)
    pub perpendicular_neighbors: usize,
}

/// A raw line with measured features, prior to classification
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedLine {
    pub start: Point2D,
    pub end: Point2D,
    pub points: Vec<Point2D>,
    pub thickness: f64,
    pub style: LineStyle,
    pub features: LineFeatures,
}

impl FeaturedLine {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }
}

/// Final classified line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedLine {
    pub start: Point2D,
    pub end: Point2D,
    pub line_type: LineType,
    pub style: LineStyle,
    pub thickness: f64,
    /// Classification confidence in [0,1]
    pub confidence: f64,
    pub features: LineFeatures,
}

impl ClassifiedLine {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }
}

/// A word returned by the external OCR capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// A recognized text region with semantic flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRegion {
    pub bbox: BoundingBox,
    /// Recognized text, opaque to the core
    pub text: String,
    pub confidence: f64,
    pub is_dimension: bool,
    pub is_annotation: bool,
    pub is_label: bool,
}

/// Real-world length unit supported by the scale calibrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScaleUnit {
    Meters,
    Centimeters,
    Millimeters,
    Feet,
    Inches,
}

impl ScaleUnit {
    /// Conversion factor to meters
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            ScaleUnit::Meters => 1.0,
            ScaleUnit::Centimeters => 0.01,
            ScaleUnit::Millimeters => 0.001,
            ScaleUnit::Feet => 0.3048,
            ScaleUnit::Inches => 0.0254,
        }
    }
}

/// Scale notation family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScaleKind {
    Architectural,
    Imperial,
    Metric,
    Custom,
}

/// An observed pixel-length to real-length correspondence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleReference {
    pub pixel_length: f64,
    pub real_length: f64,
    pub unit: ScaleUnit,
    pub confidence: f64,
}

/// Resolved pixel-to-real-world scale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scale {
    /// Pixels per real-world unit
    pub ratio: f64,
    pub unit: ScaleUnit,
    pub kind: ScaleKind,
    pub confidence: f64,
    pub references: Vec<ScaleReference>,
}

/// Lifecycle state of a pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Per-stage execution record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStage {
    pub id: String,
    pub status: StageStatus,
    /// Progress percentage in [0,100]
    pub progress: f64,
    pub error: Option<String>,
    pub duration_ms: f64,
}

impl ProcessingStage {
    pub fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: StageStatus::Pending,
            progress: 0.0,
            error: None,
            duration_ms: 0.0,
        }
    }
}

/// Aggregate pipeline output handed to 3D-generation and UI collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub rooms: Vec<Room>,
    pub walls: Vec<Wall>,
    /// Reserved, always empty in this version
    pub doors: Vec<Opening>,
    /// Reserved, always empty in this version
    pub windows: Vec<Opening>,
    pub lines: Vec<ClassifiedLine>,
    pub scale: Option<Scale>,
    /// Overall confidence in [0,1]
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub stages: Vec<ProcessingStage>,
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Preprocessing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessConfig {
    /// Maximum image dimension; larger inputs are downscaled once (pixels)
    pub max_dimension: u32,
    /// Gaussian blur kernel radius; sigma = radius / 3
    pub blur_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: 800,
            blur_radius: 2,
        }
    }
}

/// Contour tracing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContourConfig {
    /// Intensity above which a pixel seeds or extends a contour
    pub brightness_threshold: u8,
    /// Seed sampling stride over the image grid (pixels)
    pub seed_stride: u32,
    /// Contours with fewer raw points are discarded as noise
    pub min_points: usize,
    /// Raw contours longer than this are discarded as runaway regions
    pub max_points: usize,
    /// Work-queue budget: maximum queued positions during one trace
    pub max_stack: usize,
    /// Budget: maximum points collected during one trace
    pub max_trace_points: usize,
    /// Maximum number of contours returned
    pub max_contours: usize,
    /// Douglas-Peucker perpendicular tolerance (pixels)
    pub simplify_tolerance: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 128,
            seed_stride: 8,
            min_points: 20,
            max_points: 3000,
            max_stack: 10_000,
            max_trace_points: 5_000,
            max_contours: 100,
            simplify_tolerance: 5.0,
        }
    }
}

/// Room detection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomConfig {
    /// Intensity above which a pixel counts as room interior
    pub light_threshold: u8,
    /// Seed sampling stride over the image grid (pixels)
    pub seed_stride: u32,
    /// Work-queue budget: maximum queued positions during one fill
    pub max_stack: usize,
    /// Soft cap on region size during filling (pixels)
    pub max_region: usize,
    /// Acceptance window for final rooms (pixels)
    pub min_area: f64,
    pub max_area: f64,
    /// Maximum number of rooms returned
    pub max_rooms: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            light_threshold: 200,
            seed_stride: 15,
            max_stack: 15_000,
            max_region: 50_000,
            min_area: 1000.0,
            max_area: 30_000.0,
            max_rooms: 20,
        }
    }
}

/// Wall extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WallConfig {
    /// Segments at or below this length are discarded (pixels)
    pub min_length: f64,
    /// Merge near-collinear segments across contours
    pub merge_collinear: bool,
    /// Angle tolerance for the merge pass (radians)
    pub merge_angle_tolerance: f64,
    /// Perpendicular distance tolerance for the merge pass (pixels)
    pub merge_distance_tolerance: f64,
    /// Maximum end gap between collinear segments for the merge pass (pixels)
    pub merge_max_gap: f64,
    /// Default thickness assigned to extracted walls (pixels)
    pub default_thickness: f64,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            min_length: 20.0,
            merge_collinear: true,
            merge_angle_tolerance: 0.1,
            merge_distance_tolerance: 5.0,
            merge_max_gap: 10.0,
            default_thickness: 3.0,
        }
    }
}

/// Line detection and classification parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineConfig {
    /// Edge magnitude above which a pixel joins a line trace
    pub edge_threshold: u8,
    /// Intensity above which a pixel counts as background for thickness probing
    pub background_threshold: u8,
    /// Maximum perpendicular search radius for thickness probing (pixels)
    pub thickness_search_radius: u32,
    /// Lines shorter than this are filtered from the final result (pixels)
    pub min_length: f64,
    /// Lines below this confidence are filtered from the final result
    pub confidence_threshold: f64,
    /// Angle tolerance for parallel/perpendicular context counting (radians)
    pub context_angle_tolerance: f64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 128,
            background_threshold: 200,
            thickness_search_radius: 20,
            min_length: 10.0,
            confidence_threshold: 0.5,
            context_angle_tolerance: 0.1,
        }
    }
}

/// Text region filtering parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextConfig {
    /// Repaint recognized text regions with local background before analysis
    pub remove_text: bool,
    /// Margin ring width used to estimate background intensity (pixels)
    pub inpaint_margin: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            remove_text: true,
            inpaint_margin: 3,
        }
    }
}

/// Scale calibration parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleConfig {
    /// Minimum scale-bar run length (pixels)
    pub bar_min_length: u32,
    /// Maximum scale-bar run length (pixels)
    pub bar_max_length: u32,
    /// Relative tolerance for grouping candidate ratios
    pub group_tolerance: f64,
    /// Prefer candidates matching this unit, when present
    pub expected_unit: Option<ScaleUnit>,
    /// Prefer candidates matching this kind, when present
    pub expected_kind: Option<ScaleKind>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            bar_min_length: 50,
            bar_max_length: 500,
            group_tolerance: 0.15,
            expected_unit: None,
            expected_kind: None,
        }
    }
}

/// Aggregate pipeline configuration; part of the result-cache key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    /// Square kernel side for the morphological close after edge detection
    pub morphology_kernel: u32,
    pub contour: ContourConfig,
    pub room: RoomConfig,
    pub wall: WallConfig,
    pub line: LineConfig,
    pub text: TextConfig,
    pub scale: ScaleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            morphology_kernel: 3,
            contour: ContourConfig::default(),
            room: RoomConfig::default(),
            wall: WallConfig::default(),
            line: LineConfig::default(),
            text: TextConfig::default(),
            scale: ScaleConfig::default(),
        }
    }
}
