//! Annotation drawing
//!
//! Boxes are drawn around detected regions and a fixed text marker is
//! rendered in the top-left corner with a small built-in bitmap font.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use super::regions::MotionRegion;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const MARKER_TEXT: &str = "MOTION DETECTED";

const BOX_THICKNESS: u32 = 2;
const MARKER_ORIGIN: (i32, i32) = (10, 10);
const MARKER_SCALE: u32 = 2;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Draw a box around each region
pub fn draw_regions(image: &mut RgbImage, regions: &[MotionRegion]) {
    for region in regions {
        for t in 0..BOX_THICKNESS {
            let inset = 2 * t;
            if region.width <= inset || region.height <= inset {
                break;
            }
            let rect = Rect::at((region.x + t) as i32, (region.y + t) as i32)
                .of_size(region.width - inset, region.height - inset);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }
    }
}

/// Render the motion marker text
pub fn draw_marker(image: &mut RgbImage) {
    draw_text(image, MARKER_TEXT, MARKER_ORIGIN, MARKER_SCALE, MARKER_COLOR);
}

fn draw_text(image: &mut RgbImage, text: &str, origin: (i32, i32), scale: u32, color: Rgb<u8>) {
    let advance = ((GLYPH_WIDTH + 1) * scale) as i32;
    let mut x = origin.0;

    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let px = x + (col * scale) as i32;
                    let py = origin.1 + (row as u32 * scale) as i32;
                    draw_filled_rect_mut(image, Rect::at(px, py).of_size(scale, scale), color);
                }
            }
        }
        x += advance;
    }
}

/// 5x7 bitmaps, one byte per row, MSB on the left
fn glyph(ch: char) -> Option<[u8; GLYPH_HEIGHT as usize]> {
    let rows = match ch {
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_glyphs_present() {
        for ch in MARKER_TEXT.chars().filter(|c| *c != ' ') {
            assert!(glyph(ch).is_some(), "missing glyph {ch}");
        }
    }

    #[test]
    fn test_draw_marker() {
        let mut image = RgbImage::new(320, 60);
        draw_marker(&mut image);

        let lit = image.pixels().filter(|p| **p == MARKER_COLOR).count();
        assert!(lit > 0);
        // Nothing drawn outside the text band
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(100, 40), Rgb([0, 0, 0]));
        // Top bar of the leading 'M'
        assert_eq!(*image.get_pixel(10, 10), MARKER_COLOR);
    }

    #[test]
    fn test_marker_clipped_on_small_image() {
        let mut image = RgbImage::new(16, 16);
        draw_marker(&mut image);
        assert_eq!(image.dimensions(), (16, 16));
    }

    #[test]
    fn test_draw_regions() {
        let mut image = RgbImage::new(100, 100);
        let region = MotionRegion {
            x: 10,
            y: 20,
            width: 30,
            height: 30,
            area: 841.0,
        };
        draw_regions(&mut image, &[region]);

        assert_eq!(*image.get_pixel(10, 20), BOX_COLOR);
        assert_eq!(*image.get_pixel(11, 21), BOX_COLOR);
        assert_eq!(*image.get_pixel(39, 49), BOX_COLOR);
        assert_eq!(*image.get_pixel(25, 35), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(12, 22), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_tiny_region() {
        let mut image = RgbImage::new(10, 10);
        let region = MotionRegion {
            x: 5,
            y: 5,
            width: 1,
            height: 1,
            area: 0.0,
        };
        draw_regions(&mut image, &[region]);
        assert_eq!(*image.get_pixel(5, 5), BOX_COLOR);
    }
}
