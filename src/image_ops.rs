// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster operations for floor plan analysis: preprocessing, edge
//! detection and morphology.
//!
//! Standard filters with exact off-the-shelf semantics (histogram
//! equalization, median) delegate to `imageproc`. Pipeline-specific passes
//! (separable Gaussian, Sobel magnitude, grayscale morphology) are
//! implemented here with edge-clamped sampling.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::types::BoundingBox;

/// Convert RGBA bytes to grayscale using ITU-R BT.601 luminance weights
pub fn rgba_to_grayscale(rgba: &[u8], width: u32, height: u32) -> GrayImage {
    let mut gray = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            if i + 2 < rgba.len() {
                let r = rgba[i] as f32;
                let g = rgba[i + 1] as f32;
                let b = rgba[i + 2] as f32;
                let luma = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
                gray.put_pixel(x, y, Luma([luma]));
            }
        }
    }

    gray
}

/// Downscale once so that neither dimension exceeds `max_dimension`.
///
/// Returns the input unchanged when it already fits. This is the only
/// resize in the pipeline; every later stage works at this resolution.
pub fn downscale_to_max(image: &GrayImage, max_dimension: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    let largest = w.max(h);
    if largest <= max_dimension || max_dimension == 0 {
        return image.clone();
    }

    let factor = max_dimension as f64 / largest as f64;
    let new_w = ((w as f64 * factor).round() as u32).max(1);
    let new_h = ((h as f64 * factor).round() as u32).max(1);
    imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

/// Generate a normalized 1D Gaussian kernel for the given radius.
///
/// sigma = radius / 3; weights follow exp(-x^2 / (2 sigma^2)) and sum to 1.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let sigma = (radius as f32 / 3.0).max(0.1);
    let size = (2 * radius + 1) as usize;
    let mut kernel = Vec::with_capacity(size);

    let mut sum = 0.0f32;
    for i in 0..size {
        let x = i as f32 - radius as f32;
        let w = (-(x * x) / (2.0 * sigma * sigma)).exp();
        kernel.push(w);
        sum += w;
    }
    for w in &mut kernel {
        *w /= sum;
    }

    kernel
}

/// Separable Gaussian blur with edge-clamped sampling.
pub fn gaussian_blur(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();
    let (wi, hi) = (w as i64, h as i64);
    let kernel = gaussian_kernel(radius);
    let r = radius as i64;
    let src = image.as_raw();

    // Horizontal pass
    let mut tmp = vec![0.0f32; (w * h) as usize];
    tmp.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let base = y * w as usize;
            for x in 0..wi {
                let mut acc = 0.0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = (x + k as i64 - r).clamp(0, wi - 1) as usize;
                    acc += src[base + sx] as f32 * weight;
                }
                row[x as usize] = acc;
            }
        });

    // Vertical pass
    let mut out = vec![0u8; (w * h) as usize];
    out.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w as usize {
                let mut acc = 0.0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = (y as i64 + k as i64 - r).clamp(0, hi - 1) as usize;
                    acc += tmp[sy * w as usize + x] * weight;
                }
                row[x] = acc.round().clamp(0.0, 255.0) as u8;
            }
        });

    GrayImage::from_raw(w, h, out).unwrap()
}

/// Histogram equalization via cumulative distribution remap
pub fn equalize_contrast(image: &GrayImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(image)
}

/// 3x3 median filter for speckle noise
pub fn median_filter(image: &GrayImage) -> GrayImage {
    imageproc::filter::median_filter(image, 1, 1)
}

/// Sobel gradient magnitude, clamped to 255.
///
/// Border pixels are left at zero; no wraparound sampling.
pub fn sobel_magnitude(image: &GrayImage) -> GrayImage {
    const GX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const GY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    let (w, h) = image.dimensions();
    let src = image.as_raw();
    let mut out = vec![0u8; (w * h) as usize];

    if w >= 3 && h >= 3 {
        out.par_chunks_mut(w as usize)
            .enumerate()
            .for_each(|(y, row)| {
                if y == 0 || y == h as usize - 1 {
                    return;
                }
                for x in 1..w as usize - 1 {
                    let mut gx = 0i32;
                    let mut gy = 0i32;
                    for ky in 0..3 {
                        for kx in 0..3 {
                            let v =
                                src[(y + ky - 1) * w as usize + (x + kx - 1)] as i32;
                            gx += GX[ky][kx] * v;
                            gy += GY[ky][kx] * v;
                        }
                    }
                    let mag = ((gx * gx + gy * gy) as f64).sqrt();
                    row[x] = mag.min(255.0) as u8;
                }
            });
    }

    GrayImage::from_raw(w, h, out).unwrap()
}

/// Grayscale dilation: each pixel becomes the neighborhood maximum.
///
/// `kernel_size` is the side of the square neighborhood; sampling is
/// edge-clamped.
pub fn dilate(image: &GrayImage, kernel_size: u32) -> GrayImage {
    morphology_pass(image, kernel_size, true)
}

/// Grayscale erosion: each pixel becomes the neighborhood minimum.
pub fn erode(image: &GrayImage, kernel_size: u32) -> GrayImage {
    morphology_pass(image, kernel_size, false)
}

/// Morphological close (dilate then erode): bridges small gaps in edges
pub fn morphological_close(image: &GrayImage, kernel_size: u32) -> GrayImage {
    erode(&dilate(image, kernel_size), kernel_size)
}

/// Morphological open (erode then dilate): removes speckle noise
pub fn morphological_open(image: &GrayImage, kernel_size: u32) -> GrayImage {
    dilate(&erode(image, kernel_size), kernel_size)
}

fn morphology_pass(image: &GrayImage, kernel_size: u32, take_max: bool) -> GrayImage {
    let (w, h) = image.dimensions();
    let (wi, hi) = (w as i64, h as i64);
    let r = (kernel_size.max(1) / 2) as i64;
    let src = image.as_raw();
    let mut out = vec![0u8; (w * h) as usize];

    for y in 0..hi {
        for x in 0..wi {
            let mut best = if take_max { 0u8 } else { 255u8 };
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, wi - 1) as usize;
                    let sy = (y + dy).clamp(0, hi - 1) as usize;
                    let v = src[sy * w as usize + sx];
                    best = if take_max { best.max(v) } else { best.min(v) };
                }
            }
            out[(y * wi + x) as usize] = best;
        }
    }

    GrayImage::from_raw(w, h, out).unwrap()
}

/// Sum of intensities and pixel count over a clamped rectangular region
pub(crate) fn region_sum(image: &GrayImage, bbox: &BoundingBox) -> (f64, u64) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return (0.0, 0);
    }

    let x0 = bbox.min_x.floor().max(0.0) as u32;
    let y0 = bbox.min_y.floor().max(0.0) as u32;
    let x1 = (bbox.max_x.ceil() as i64).clamp(0, w as i64 - 1) as u32;
    let y1 = (bbox.max_y.ceil() as i64).clamp(0, h as i64 - 1) as u32;
    if x0 > x1 || y0 > y1 {
        return (0.0, 0);
    }

    let mut sum = 0.0;
    let mut count = 0u64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            sum += image.get_pixel(x, y).0[0] as f64;
            count += 1;
        }
    }
    (sum, count)
}

/// Mean intensity over a clamped rectangular region
pub fn region_mean(image: &GrayImage, bbox: &BoundingBox) -> f64 {
    let (sum, count) = region_sum(image, bbox);
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    #[test]
    fn test_rgba_to_grayscale() {
        let rgba = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let gray = rgba_to_grayscale(&rgba, 2, 1);

        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_gaussian_kernel_sums_to_one() {
        for radius in 1..8 {
            let kernel = gaussian_kernel(radius);
            assert_eq!(kernel.len(), (2 * radius + 1) as usize);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "radius {radius}: sum {sum}");
        }
    }

    #[test]
    fn test_gaussian_blur_preserves_uniform_image() {
        let img = uniform(16, 16, 200);
        let blurred = gaussian_blur(&img, 2);
        for pixel in blurred.pixels() {
            assert_eq!(pixel.0[0], 200);
        }
    }

    #[test]
    fn test_downscale_bounds_max_dimension() {
        let img = uniform(1600, 1200, 128);
        let small = downscale_to_max(&img, 800);
        assert_eq!(small.width(), 800);
        assert_eq!(small.height(), 600);

        let untouched = downscale_to_max(&small, 800);
        assert_eq!(untouched.dimensions(), (800, 600));
    }

    #[test]
    fn test_sobel_flat_image_is_zero() {
        let img = uniform(10, 10, 77);
        let edges = sobel_magnitude(&img);
        for pixel in edges.pixels() {
            assert_eq!(pixel.0[0], 0);
        }
    }

    #[test]
    fn test_sobel_vertical_step_produces_edge() {
        let mut img = uniform(10, 10, 0);
        for y in 0..10 {
            for x in 5..10 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let edges = sobel_magnitude(&img);
        // Strong response along the step, zero at the borders
        assert!(edges.get_pixel(5, 5).0[0] > 128);
        assert_eq!(edges.get_pixel(0, 0).0[0], 0);
        assert_eq!(edges.get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn test_close_bridges_single_pixel_gap() {
        let mut img = uniform(11, 5, 0);
        for x in 0..5 {
            img.put_pixel(x, 2, Luma([255]));
        }
        for x in 6..11 {
            img.put_pixel(x, 2, Luma([255]));
        }

        let closed = morphological_close(&img, 3);
        assert_eq!(closed.get_pixel(5, 2).0[0], 255);
    }

    #[test]
    fn test_dilate_erode_are_max_min() {
        let mut img = uniform(5, 5, 10);
        img.put_pixel(2, 2, Luma([200]));

        let dilated = dilate(&img, 3);
        assert_eq!(dilated.get_pixel(1, 1).0[0], 200);
        assert_eq!(dilated.get_pixel(0, 0).0[0], 10);

        let eroded = erode(&img, 3);
        assert_eq!(eroded.get_pixel(2, 2).0[0], 10);
    }

    #[test]
    fn test_region_mean() {
        let mut img = uniform(4, 4, 0);
        img.put_pixel(0, 0, Luma([100]));
        let mean = region_mean(&img, &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!((mean - 25.0).abs() < 1e-9);
    }
}
