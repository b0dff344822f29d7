//! Outer boundaries of binary masks.
//!
//! Border following is `imageproc`'s Suzuki–Abe tracer: foreground is
//! 8-connected, background 4-connected. Only external contours are kept,
//! so hole borders and components sitting inside a hole are skipped.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};

use crate::data::model::Mask;

/// A closed contour as `(row, col)` points in tracing order.
pub type Contour = Vec<(usize, usize)>;

/// Outer contour of every external 8-connected component of `mask`, in
/// raster order of each component's first pixel.
pub fn external_contours(mask: &Mask) -> Vec<Contour> {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return Vec::new();
    }
    let binary = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if mask[(y as usize, x as usize)] { 255 } else { 0 }])
    });

    find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| (p.y as usize, p.x as usize))
                .collect()
        })
        .collect()
}

/// Length of the closed polygon through `points`.
pub fn arc_length(points: &[(usize, usize)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let dist = |a: (usize, usize), b: (usize, usize)| {
        let dr = a.0 as f64 - b.0 as f64;
        let dc = a.1 as f64 - b.1 as f64;
        dr.hypot(dc)
    };
    let open: f64 = points.windows(2).map(|p| dist(p[0], p[1])).sum();
    open + dist(points[points.len() - 1], points[0])
}
