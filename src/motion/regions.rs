//! Foreground mask cleanup and region extraction

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::point::Point;

/// Mask values above this are treated as confident foreground.
/// Shadow pixels (127) fall below it and are dropped.
pub const BINARY_THRESHOLD: u8 = 244;

/// Radius of the square structuring element (5x5)
const KERNEL_RADIUS: u8 = 2;

/// A connected foreground region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Area enclosed by the outer contour, in px²
    pub area: f64,
}

/// Binarize a raw model mask and remove speckle
///
/// Closing fills small holes inside moving objects, opening then removes
/// isolated noise pixels.
pub fn clean_mask(mask: &GrayImage) -> GrayImage {
    let mut binary = mask.clone();
    for p in binary.iter_mut() {
        *p = if *p > BINARY_THRESHOLD { 255 } else { 0 };
    }

    let closed = close(&binary, Norm::LInf, KERNEL_RADIUS);
    open(&closed, Norm::LInf, KERNEL_RADIUS)
}

/// Extract outermost regions whose area is at least `min_area`
pub fn find_regions(mask: &GrayImage, min_area: f64) -> Vec<MotionRegion> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let area = contour_area(&c.points);
            if area < min_area {
                return None;
            }
            bounding_box(&c.points).map(|(x, y, width, height)| MotionRegion {
                x,
                y,
                width,
                height,
                area,
            })
        })
        .collect()
}

/// Polygon area of a closed contour (shoelace formula)
pub fn contour_area(points: &[Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y))
        .sum();

    twice.abs() / 2.0
}

fn bounding_box(points: &[Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;

    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}
