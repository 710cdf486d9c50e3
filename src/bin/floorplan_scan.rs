// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: analyze a 2D floor plan image into rooms, walls and scale.
//!
//! Usage:
//!   floorplan-scan <image_path> [options]

use floorplan_vision::{PipelineConfig, PipelineOrchestrator, ScaleUnit};
use image::ImageReader;
use std::env;
use std::fs;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let image_path = &args[1];

    // Parse options
    let mut output_path = String::from("floorplan.json");
    let mut config = PipelineConfig::default();
    let mut quiet = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--output" => {
                i += 1;
                output_path = args[i].clone();
            }
            "--min-wall-length" => {
                i += 1;
                config.wall.min_length = args[i].parse().expect("Invalid min wall length value");
            }
            "--min-room-area" => {
                i += 1;
                config.room.min_area = args[i].parse().expect("Invalid min room area value");
            }
            "--max-dimension" => {
                i += 1;
                config.preprocess.max_dimension =
                    args[i].parse().expect("Invalid max dimension value");
            }
            "--expect-unit" => {
                i += 1;
                config.scale.expected_unit = Some(match args[i].as_str() {
                    "m" => ScaleUnit::Meters,
                    "cm" => ScaleUnit::Centimeters,
                    "mm" => ScaleUnit::Millimeters,
                    "ft" => ScaleUnit::Feet,
                    "in" => ScaleUnit::Inches,
                    other => {
                        eprintln!("Unknown unit: {}", other);
                        std::process::exit(1);
                    }
                });
            }
            "--no-merge" => {
                config.wall.merge_collinear = false;
            }
            "--keep-text" => {
                config.text.remove_text = false;
            }
            "--quiet" => {
                quiet = true;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    println!("=== Floor Plan Scanner ===");
    println!();

    // Step 1: Load image
    println!("[1/3] Loading image: {}", image_path);
    let img = ImageReader::open(image_path)
        .unwrap_or_else(|e| {
            eprintln!("Error: Cannot open image '{}': {}", image_path, e);
            std::process::exit(1);
        })
        .decode()
        .unwrap_or_else(|e| {
            eprintln!("Error: Cannot decode image '{}': {}", image_path, e);
            std::process::exit(1);
        });

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    println!("  Image size: {}x{} pixels", width, height);

    // Step 2: Run the pipeline
    println!("[2/3] Analyzing floor plan...");
    let mut pipeline = PipelineOrchestrator::new(config);
    if !quiet {
        pipeline = pipeline.with_progress(Box::new(|stage, pct, detail| {
            if detail.is_empty() {
                println!("  {:<12} {:>5.1}%", stage, pct);
            } else {
                println!("  {:<12} {:>5.1}%  {}", stage, pct, detail);
            }
        }));
    }

    let result = pipeline.run(rgba.as_raw(), width, height);

    // Print summary
    println!();
    println!("=== Detection Summary ===");
    println!("  Rooms:      {}", result.rooms.len());
    for room in &result.rooms {
        println!(
            "    {:2}: {:<12} area={:>8.0}px center=({:.0},{:.0})",
            room.id, room.name, room.pixel_area, room.center.x, room.center.y
        );
    }
    println!("  Walls:      {}", result.walls.len());
    println!("  Lines:      {}", result.lines.len());
    match &result.scale {
        Some(scale) => println!(
            "  Scale:      {:.2} px per {:?} (confidence {:.2})",
            scale.ratio, scale.unit, scale.confidence
        ),
        None => println!("  Scale:      undetermined"),
    }
    println!("  Confidence: {:.2}", result.confidence);

    for warning in &result.warnings {
        println!("  Warning: {}", warning);
    }
    for error in &result.errors {
        println!("  Error: {}", error);
    }

    // Step 3: Write JSON result
    println!();
    println!("[3/3] Writing result: {}", output_path);
    let json = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
        eprintln!("Error: Cannot serialize result: {}", e);
        std::process::exit(1);
    });
    fs::write(&output_path, json).unwrap_or_else(|e| {
        eprintln!("Error: Cannot write '{}': {}", output_path, e);
        std::process::exit(1);
    });

    println!("Done.");
}

fn print_usage() {
    println!(
        r#"Floor Plan Scanner
==================

Analyzes a 2D floor plan image into rooms, wall segments and a
pixel-to-real-world scale, written as JSON for downstream 3D generation.

USAGE:
  floorplan-scan <image_path> [OPTIONS]

ARGUMENTS:
  <image_path>              Path to floor plan image (PNG, JPEG)

OPTIONS:
  --output <path>           Output JSON path (default: floorplan.json)
  --min-wall-length <px>    Minimum wall segment length (default: 20)
  --min-room-area <px>      Minimum room pixel area (default: 1000)
  --max-dimension <px>      Downscale bound for large images (default: 800)
  --expect-unit <u>         Prefer a scale unit: m, cm, mm, ft, in
  --no-merge                Keep redundant collinear wall segments
  --keep-text               Skip text region in-painting
  --quiet                   Suppress per-stage progress output
  -h, --help                Show this help message

EXAMPLES:
  floorplan-scan plan.png
  floorplan-scan plan.png --expect-unit m --output plan.json
"#
    );
}
