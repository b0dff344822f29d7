/// Band rendering: one spectral band → displayable 8-bit grayscale.
///
/// ```text
///   band slice (f32, H × W)
///        │
///        ├── Raw ─────────► min–max stretch
///        ├── Masked ──────► min–max over nonzero masked pixels
///        └── Enhanced ────► percentile stretch → CLAHE → gain/offset → edge highlight
///        │
///        ▼
///   orientation (identical for every mode)
///        │
///        ▼
///   GrayImage
/// ```
pub mod enhance;

use image::{imageops, GrayImage, ImageBuffer, Luma, Pixel, RgbImage};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::config::{Orientation, RenderConfig};
use crate::data::model::Mask;
use crate::geometry::DataSize;

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// What the display currently shows. Part of the band cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Raw,
    Segmented,
}

/// How a single band slice is stretched to 8 bits.
#[derive(Debug, Clone, Copy)]
pub enum RenderMode<'a> {
    Raw,
    /// Min–max stretch restricted to nonzero pixels inside the mask.
    Masked(&'a Mask),
    /// Staged enhancement for low band count acquisitions.
    Enhanced(&'a Mask),
}

// ---------------------------------------------------------------------------
// BandRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BandRenderer {
    config: RenderConfig,
}

impl BandRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Pick the segmented rendering for a cube with `bands` bands.
    pub fn segmented_mode<'a>(&self, mask: &'a Mask, bands: usize) -> RenderMode<'a> {
        if bands == self.config.low_band_count {
            RenderMode::Enhanced(mask)
        } else {
            RenderMode::Masked(mask)
        }
    }

    /// Render a band slice. The output is oriented for display.
    pub fn render(&self, band: ArrayView2<'_, f32>, mode: RenderMode<'_>) -> GrayImage {
        let (h, w) = band.dim();
        let pixels = match mode {
            RenderMode::Raw => stretch_raw(band),
            RenderMode::Masked(mask) => {
                debug_assert_eq!(mask.dim(), (h, w));
                stretch_masked(band, mask)
            }
            RenderMode::Enhanced(mask) => {
                debug_assert_eq!(mask.dim(), (h, w));
                enhance::enhance_segmented(band, mask, &self.config)
            }
        };
        orient(to_gray(h, w, &pixels), self.config.orientation)
    }
}

/// Build a `GrayImage` from a row-major H × W buffer.
pub fn to_gray(h: usize, w: usize, pixels: &[u8]) -> GrayImage {
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([pixels[y as usize * w + x as usize]])
    })
}

/// Apply the display orientation.
pub fn orient<P>(img: ImageBuffer<P, Vec<P::Subpixel>>, orientation: Orientation) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    match orientation {
        Orientation::Identity => img,
        Orientation::Rotate90Cw => imageops::rotate90(&img),
    }
}

impl Orientation {
    /// Map a pixel of the rendered buffer back to its data-space `(row, col)`.
    /// `None` when the pixel lies outside the rendered frame.
    pub fn to_data(self, row: usize, col: usize, size: DataSize) -> Option<(usize, usize)> {
        match self {
            Orientation::Identity => (row < size.height && col < size.width).then_some((row, col)),
            Orientation::Rotate90Cw => {
                if row >= size.width {
                    return None;
                }
                Some((size.height.checked_sub(col)?.checked_sub(1)?, row))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stretches
// ---------------------------------------------------------------------------

/// Linear min–max stretch of the whole band to 0..=255.
///
/// A constant band renders all zero.
pub fn stretch_raw(band: ArrayView2<'_, f32>) -> Vec<u8> {
    let (min, max) = min_max(band.iter().copied());
    if !(max > min) {
        log::debug!("degenerate band (min == max == {min}), rendering zeros");
        return vec![0; band.len()];
    }
    let range = max - min;
    band.iter()
        .map(|&v| scale_to_u8((v as f64 - min) / range))
        .collect()
}

/// Min–max stretch over nonzero pixels inside `mask`; everything else is 0.
pub fn stretch_masked(band: ArrayView2<'_, f32>, mask: &Mask) -> Vec<u8> {
    let active = |v: f32, m: bool| m && v != 0.0;
    let (min, max) = min_max(
        band.iter()
            .zip(mask.iter())
            .filter(|(&v, &m)| active(v, m))
            .map(|(&v, _)| v),
    );
    if !(max > min) {
        log::debug!("masked band has no contrast, rendering zeros");
        return vec![0; band.len()];
    }
    let range = max - min;
    band.iter()
        .zip(mask.iter())
        .map(|(&v, &m)| {
            if active(v, m) {
                scale_to_u8((v as f64 - min) / range)
            } else {
                0
            }
        })
        .collect()
}

/// Replicate the normalized band across three channels for the segmenter.
/// Always in data-space orientation.
pub fn grayscale_rgb(band: ArrayView2<'_, f32>) -> RgbImage {
    let (h, w) = band.dim();
    let gray = stretch_raw(band);
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let v = gray[y as usize * w + x as usize];
        image::Rgb([v, v, v])
    })
}

/// Min and max over finite values; `(0, 0)` when there are none.
pub(crate) fn min_max(values: impl Iterator<Item = f32>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        let v = v as f64;
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

fn scale_to_u8(t: f64) -> u8 {
    if t.is_nan() {
        return 0;
    }
    (t * 255.0).round().clamp(0.0, 255.0) as u8
}
