//! Enhanced rendering for segmented low band count cubes.
//!
//! Raw reflectance in sparse acquisitions is visually flat. The enhancement
//! runs a robust percentile stretch, tile-based histogram equalization
//! (CLAHE), a global gain/offset boost and finally highlights the mask
//! boundary. Nothing outside the mask is ever made nonzero except the one
//! pixel wide highlight ring.

use image::GrayImage;
use imageproc::morphology::{grayscale_dilate, Mask as StructuringElement};
use ndarray::ArrayView2;

use crate::config::RenderConfig;
use crate::data::model::Mask;

use super::min_max;

/// Full enhancement pipeline, row-major output.
pub fn enhance_segmented(band: ArrayView2<'_, f32>, mask: &Mask, config: &RenderConfig) -> Vec<u8> {
    let (h, w) = band.dim();
    let n = h * w;

    let mut active: Vec<f64> = band
        .iter()
        .zip(mask.iter())
        .filter(|(v, &m)| m && v.is_finite())
        .map(|(&v, _)| v as f64)
        .collect();
    if active.is_empty() {
        log::debug!("no masked pixels, rendering zeros");
        return vec![0; n];
    }

    let (min, max) = min_max(active.iter().map(|&v| v as f32));
    if !(max > min) {
        log::debug!("masked pixels are constant, rendering zeros");
        return vec![0; n];
    }

    active.sort_by(f64::total_cmp);
    let mut lo = percentile(&active, config.percentile_low);
    let mut hi = percentile(&active, config.percentile_high);
    if !(hi > lo) {
        lo = min;
        hi = max;
    }

    // Percentile stretch; the cast truncates after clipping.
    let stretched: Vec<u8> = band
        .iter()
        .zip(mask.iter())
        .map(|(&v, &m)| {
            if m && v.is_finite() {
                ((v as f64 - lo) / (hi - lo) * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();

    let equalized = clahe(&stretched, h, w, config.clahe_tiles, config.clahe_clip_limit);

    let mut out: Vec<u8> = equalized
        .iter()
        .zip(mask.iter())
        .map(|(&v, &m)| {
            if m {
                scale_abs(v, config.contrast_gain, config.brightness_offset)
            } else {
                0
            }
        })
        .collect();

    highlight_edges(&mut out, h, w);
    out
}

/// Percentile of sorted data with linear interpolation between order
/// statistics. `p` is in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// `saturate(|v * gain + offset|)`.
pub fn scale_abs(v: u8, gain: f64, offset: f64) -> u8 {
    (v as f64 * gain + offset).abs().round().clamp(0.0, 255.0) as u8
}

// ---------------------------------------------------------------------------
// CLAHE
// ---------------------------------------------------------------------------

/// Contrast limited adaptive histogram equalization on an 8-bit image.
///
/// - The frame is split into a `tiles` × `tiles` grid of equal tiles. When
///   the grid does not divide the frame, tile histograms are taken over a
///   frame padded at the bottom and right by reflection (reflect-101), the
///   way OpenCV does it
/// - Each tile histogram is clipped at `clip_limit * tile_area / 256`, the
///   excess spread evenly over all bins
/// - Each tile's CDF becomes a lookup table; pixels interpolate bilinearly
///   between the four nearest tile centres
pub fn clahe(src: &[u8], h: usize, w: usize, tiles: usize, clip_limit: f64) -> Vec<u8> {
    if h == 0 || w == 0 || tiles == 0 {
        return src.to_vec();
    }
    // Both axes are padded as soon as either one is indivisible.
    let (ph, pw) = if h % tiles == 0 && w % tiles == 0 {
        (h, w)
    } else {
        (h + tiles - h % tiles, w + tiles - w % tiles)
    };
    let tile_h = ph / tiles;
    let tile_w = pw / tiles;
    let area = tile_h * tile_w;
    let padded = |r: usize, c: usize| src[reflect101(r, h) * w + reflect101(c, w)];

    let mut luts = vec![[0u8; 256]; tiles * tiles];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0usize; 256];
            for r in ty * tile_h..(ty + 1) * tile_h {
                for c in tx * tile_w..(tx + 1) * tile_w {
                    hist[padded(r, c) as usize] += 1;
                }
            }
            clip_histogram(&mut hist, area, clip_limit);
            luts[ty * tiles + tx] = build_lut(&hist, area);
        }
    }

    let mut out = vec![0u8; h * w];
    for y in 0..h {
        let (ty1, ty2, ya) = interp_coord(y, tile_h, tiles);
        for x in 0..w {
            let (tx1, tx2, xa) = interp_coord(x, tile_w, tiles);
            let v = src[y * w + x] as usize;
            let l = |ty: usize, tx: usize| luts[ty * tiles + tx][v] as f64;
            let top = l(ty1, tx1) * (1.0 - xa) + l(ty1, tx2) * xa;
            let bottom = l(ty2, tx1) * (1.0 - xa) + l(ty2, tx2) * xa;
            out[y * w + x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Index `p` folded back into `0..n` without repeating the edge sample
/// (`… 2 1 | 0 1 2 … n-1 | n-2 n-3 …`).
fn reflect101(p: usize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let p = p % period;
    if p < n {
        p
    } else {
        period - p
    }
}

fn clip_histogram(hist: &mut [usize; 256], area: usize, clip_limit: f64) {
    if clip_limit <= 0.0 {
        return;
    }
    let limit = ((clip_limit * area as f64 / 256.0) as usize).max(1);
    let mut excess = 0usize;
    for h in hist.iter_mut() {
        if *h > limit {
            excess += *h - limit;
            *h = limit;
        }
    }
    let per_bin = excess / 256;
    let mut residual = excess - per_bin * 256;
    for h in hist.iter_mut() {
        *h += per_bin;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn build_lut(hist: &[usize; 256], area: usize) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }
    let scale = 255.0 / area as f64;
    let mut sum = 0usize;
    for (i, &h) in hist.iter().enumerate() {
        sum += h;
        lut[i] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and the weight of the second one.
fn interp_coord(p: usize, tile: usize, count: usize) -> (usize, usize, f64) {
    let f = p as f64 / tile as f64 - 0.5;
    let t1 = f.floor();
    let a = f - t1;
    let i1 = (t1.max(0.0) as usize).min(count - 1);
    let i2 = ((t1 + 1.0).max(0.0) as usize).min(count - 1);
    (i1, i2, a)
}

// ---------------------------------------------------------------------------
// Boundary highlight
// ---------------------------------------------------------------------------

/// Force to 255 every pixel that is zero but nonzero after a 3 × 3
/// grayscale dilation.
pub fn highlight_edges(pixels: &mut [u8], h: usize, w: usize) {
    if h == 0 || w == 0 {
        return;
    }
    let Some(image) = GrayImage::from_raw(w as u32, h as u32, pixels.to_vec()) else {
        return;
    };
    let dilated = grayscale_dilate(&image, &StructuringElement::square(1));
    for (p, d) in pixels.iter_mut().zip(dilated.as_raw()) {
        if *p == 0 && *d > 0 {
            *p = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn percentile_interpolates() {
        let data: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&data, 1.0), 1.0);
        assert_eq!(percentile(&data, 99.0), 99.0);
        assert_eq!(percentile(&[1.0, 3.0], 50.0), 2.0);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn scale_abs_saturates() {
        assert_eq!(scale_abs(0, 2.0, 30.0), 30);
        assert_eq!(scale_abs(100, 2.0, 30.0), 230);
        assert_eq!(scale_abs(200, 2.0, 30.0), 255);
    }

    #[test]
    fn clahe_flat_image_stays_flat() {
        let src = vec![77u8; 32 * 24];
        let out = clahe(&src, 24, 32, 8, 3.0);
        assert_eq!(out.len(), src.len());
        let first = out[0];
        assert!(out.iter().all(|&v| v == first));
    }

    #[test]
    fn clahe_pads_frames_the_grid_does_not_divide() {
        // 10 × 10 with an 8-tile grid is equalized over a 16 × 16 padded
        // frame: 2 × 2 pixel tiles.
        let flat = vec![90u8; 100];
        let out = clahe(&flat, 10, 10, 8, 3.0);
        assert!(out.iter().all(|&v| v == out[0]));

        let ramp: Vec<u8> = (0..100).map(|v| (v * 2) as u8).collect();
        let out = clahe(&ramp, 10, 10, 8, 3.0);
        assert_eq!(out.len(), 100);
        assert!(out[99] > out[0]);
    }

    #[test]
    fn reflect101_skips_the_edge_sample() {
        assert_eq!(reflect101(3, 5), 3);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(8, 5), 0);
        assert_eq!(reflect101(9, 5), 1);
        assert_eq!(reflect101(4, 3), 0);
        assert_eq!(reflect101(7, 1), 0);
    }

    #[test]
    fn clahe_handles_tiny_and_empty_frames() {
        assert!(clahe(&[], 0, 0, 8, 3.0).is_empty());
        let out = clahe(&[0, 255, 128], 1, 3, 8, 3.0);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn clahe_keeps_ordering_within_a_tile() {
        // A gradient inside a single tile: equalization is monotone.
        let src: Vec<u8> = (0..64).map(|v| (v * 4) as u8).collect();
        let out = clahe(&src, 8, 8, 1, 3.0);
        assert!(out.windows(2).all(|p| p[0] <= p[1]));
        assert_eq!(*out.last().unwrap(), 255);
    }

    #[test]
    fn highlight_marks_ring_around_mask() {
        let mut px = vec![0u8; 25];
        px[12] = 50; // centre of a 5 × 5 frame
        highlight_edges(&mut px, 5, 5);
        assert_eq!(px[12], 50);
        for i in [6, 7, 8, 11, 13, 16, 17, 18] {
            assert_eq!(px[i], 255, "pixel {i}");
        }
        assert_eq!(px[0], 0);
        assert_eq!(px[24], 0);
    }

    #[test]
    fn enhanced_render_zero_outside_mask_and_ring() {
        let (h, w) = (20, 20);
        let band = Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32 * 0.001);
        let mask = Mask::from_shape_fn((h, w), |(r, c)| (5..15).contains(&r) && (5..15).contains(&c));
        let out = enhance_segmented(band.view(), &mask, &RenderConfig::default());
        for r in 0..h {
            for c in 0..w {
                let near = (4..16).contains(&r) && (4..16).contains(&c);
                if !near {
                    assert_eq!(out[r * w + c], 0, "({r}, {c})");
                }
            }
        }
        // Masked pixels receive at least the brightness offset.
        assert!(out[10 * w + 10] >= 30);
        // The ring just outside the mask is highlighted.
        assert_eq!(out[4 * w + 10], 255);
    }

    #[test]
    fn enhanced_render_empty_or_constant_mask_is_black() {
        let band = Array2::from_elem((6, 6), 0.5f32);
        let none = Mask::from_elem((6, 6), false);
        let all = Mask::from_elem((6, 6), true);
        let cfg = RenderConfig::default();
        assert!(enhance_segmented(band.view(), &none, &cfg).iter().all(|&v| v == 0));
        assert!(enhance_segmented(band.view(), &all, &cfg).iter().all(|&v| v == 0));
    }
}
