use ndarray::{s, ArrayView3, Axis};
use serde::Serialize;

use crate::data::model::{Cube, Mask, Region};

/// Label used for the whole-cube signature in exports.
pub const FULL_IMAGE_LABEL: &str = "Full Image";

// ---------------------------------------------------------------------------
// SpectralSignature
// ---------------------------------------------------------------------------

/// Per-band mean reflectance over some set of pixels.
///
/// An empty pixel set yields a signature of NaN values; aggregates skip it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralSignature {
    pub label: String,
    pub values: Vec<f64>,
    /// Number of pixels averaged.
    pub pixels: usize,
}

/// Summary logged per signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl SpectralSignature {
    pub fn new(label: impl Into<String>, values: Vec<f64>, pixels: usize) -> Self {
        Self {
            label: label.into(),
            values,
            pixels,
        }
    }

    fn empty(label: impl Into<String>, bands: usize) -> Self {
        Self {
            label: label.into(),
            values: vec![f64::NAN; bands],
            pixels: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels == 0
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn stats(&self) -> Option<SignatureStats> {
        if self.is_empty() || self.values.is_empty() {
            return None;
        }
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
        Some(SignatureStats { min, max, mean })
    }
}

// ---------------------------------------------------------------------------
// RegionSpectralExtractor
// ---------------------------------------------------------------------------

/// Mean signature over `cube[y1:y2, x1:x2, :]`.
pub fn extract(region: &Region, cube: &Cube) -> SpectralSignature {
    let b = region.pixel_bounds(cube.size());
    if b.is_empty() {
        log::warn!("region '{}' covers no pixels, excluded from statistics", region.label);
        return SpectralSignature::empty(&region.label, cube.bands());
    }
    let view = cube.data().slice(s![b.y1..b.y2, b.x1..b.x2, ..]);
    mean_over_pixels(&region.label, view)
}

/// Mean signature over the whole spatial extent.
pub fn extract_full(cube: &Cube) -> SpectralSignature {
    mean_over_pixels(FULL_IMAGE_LABEL, cube.data().view())
}

/// Mean signature over the pixels selected by `mask`.
pub fn extract_masked(label: &str, mask: &Mask, cube: &Cube) -> SpectralSignature {
    let bands = cube.bands();
    let mut sums = vec![0.0f64; bands];
    let mut count = 0usize;
    for ((r, c), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        count += 1;
        for (acc, &v) in sums.iter_mut().zip(cube.data().slice(s![r, c, ..])) {
            *acc += v as f64;
        }
    }
    if count == 0 {
        log::warn!("mask '{label}' selects no pixels");
        return SpectralSignature::empty(label, bands);
    }
    finish(label, sums, count)
}

fn mean_over_pixels(label: &str, view: ArrayView3<'_, f32>) -> SpectralSignature {
    let bands = view.len_of(Axis(2));
    let mut sums = vec![0.0f64; bands];
    let mut count = 0usize;
    for spectrum in view.lanes(Axis(2)) {
        count += 1;
        for (acc, &v) in sums.iter_mut().zip(spectrum) {
            *acc += v as f64;
        }
    }
    if count == 0 {
        return SpectralSignature::empty(label, bands);
    }
    finish(label, sums, count)
}

fn finish(label: &str, sums: Vec<f64>, count: usize) -> SpectralSignature {
    let n = count as f64;
    SpectralSignature {
        label: label.to_string(),
        values: sums.into_iter().map(|s| s / n).collect(),
        pixels: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn cube() -> Cube {
        Cube::new(Array3::from_shape_fn((6, 8, 3), |(r, c, b)| {
            (r * 8 + c) as f32 + b as f32 * 100.0
        }))
        .unwrap()
    }

    #[test]
    fn full_region_equals_whole_cube() {
        let cube = cube();
        let region = Region::new(0.0, 0.0, 8.0, 6.0, "all", [0, 0, 0]);
        let a = extract(&region, &cube);
        let b = extract_full(&cube);
        assert_eq!(a.values, b.values);
        assert_eq!(a.pixels, 48);
    }

    #[test]
    fn sub_region_mean() {
        let cube = cube();
        // Rows 1..3, cols 2..4 → pixel indices 10, 11, 18, 19.
        let region = Region::new(2.0, 1.0, 2.0, 2.0, "r", [0, 0, 0]);
        let sig = extract(&region, &cube);
        assert_eq!(sig.values, vec![14.5, 114.5, 214.5]);
        let stats = sig.stats().unwrap();
        assert_eq!(stats.min, 14.5);
        assert_eq!(stats.max, 214.5);
        assert_eq!(stats.mean, 114.5);
    }

    #[test]
    fn empty_region_is_nan_not_panic() {
        let cube = cube();
        let region = Region::new(20.0, 20.0, 4.0, 4.0, "gone", [0, 0, 0]);
        let sig = extract(&region, &cube);
        assert!(sig.is_empty());
        assert_eq!(sig.len(), 3);
        assert!(sig.values.iter().all(|v| v.is_nan()));
        assert!(sig.stats().is_none());
    }

    #[test]
    fn masked_mean_uses_selected_pixels_only() {
        let cube = cube();
        let mut mask = Mask::from_elem((6, 8), false);
        mask[(0, 0)] = true;
        mask[(5, 7)] = true;
        let sig = extract_masked("seg", &mask, &cube);
        assert_eq!(sig.values, vec![23.5, 123.5, 223.5]);
        assert!(extract_masked("none", &Mask::from_elem((6, 8), false), &cube).is_empty());
    }
}
