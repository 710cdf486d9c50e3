// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic raster builders shared by the integration tests.

/// Uniform RGBA raster
pub fn uniform_rgba(width: u32, height: u32, value: u8) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        rgba.extend_from_slice(&[value, value, value, 255]);
    }
    rgba
}

fn put(rgba: &mut [u8], width: u32, x: u32, y: u32, value: u8) {
    let i = ((y * width + x) * 4) as usize;
    rgba[i] = value;
    rgba[i + 1] = value;
    rgba[i + 2] = value;
}

/// Filled black rectangle
pub fn draw_filled_rect(rgba: &mut [u8], width: u32, x0: u32, y0: u32, w: u32, h: u32) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            put(rgba, width, x, y, 0);
        }
    }
}

/// Hollow rectangle with a black border of the given thickness
pub fn draw_rect_border(
    rgba: &mut [u8],
    width: u32,
    x0: u32,
    y0: u32,
    w: u32,
    h: u32,
    thickness: u32,
) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let on_border = x < x0 + thickness
                || x >= x0 + w - thickness
                || y < y0 + thickness
                || y >= y0 + h - thickness;
            if on_border {
                put(rgba, width, x, y, 0);
            }
        }
    }
}
