use std::fmt;
use std::path::PathBuf;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::color::{region_color, Rgb};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{DataSize, PixelRect, ViewRect};

/// A boolean H × W mask in data space.
pub type Mask = Array2<bool>;

// ---------------------------------------------------------------------------
// Cube – the hyperspectral data array
// ---------------------------------------------------------------------------

/// Reflectance cube shaped (height, width, bands).
#[derive(Debug, Clone)]
pub struct Cube {
    data: Array3<f32>,
    /// Centre wavelength per band, when the header provides one.
    pub wavelengths: Option<Vec<f64>>,
    /// File the cube was loaded from.
    pub source: Option<PathBuf>,
    /// RGB rendering of the scene shipped next to the cube.
    pub preview: Option<PathBuf>,
}

impl Cube {
    /// Wrap an array, rejecting zero extent along any axis.
    pub fn new(data: Array3<f32>) -> EngineResult<Self> {
        let (h, w, b) = data.dim();
        if h == 0 || w == 0 {
            return Err(EngineError::InvalidCube(format!(
                "empty spatial extent {h}x{w}"
            )));
        }
        if b == 0 {
            return Err(EngineError::InvalidCube("cube has no bands".into()));
        }
        Ok(Cube {
            data,
            wavelengths: None,
            source: None,
            preview: None,
        })
    }

    pub fn with_wavelengths(mut self, wavelengths: Vec<f64>) -> Self {
        if wavelengths.len() == self.bands() {
            self.wavelengths = Some(wavelengths);
        } else {
            log::warn!(
                "ignoring {} wavelengths for a {}-band cube",
                wavelengths.len(),
                self.bands()
            );
        }
        self
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_preview(mut self, preview: PathBuf) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn bands(&self) -> usize {
        self.data.dim().2
    }

    pub fn size(&self) -> DataSize {
        DataSize {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// A cube of the same shape carrying this cube's metadata.
    pub(crate) fn derive(&self, data: Array3<f32>) -> Cube {
        debug_assert_eq!(data.dim(), self.data.dim());
        Cube {
            data,
            wavelengths: self.wavelengths.clone(),
            source: self.source.clone(),
            preview: self.preview.clone(),
        }
    }

    /// One spectral band as a 2-D view.
    pub fn band(&self, band: usize) -> EngineResult<ArrayView2<'_, f32>> {
        if band >= self.bands() {
            return Err(EngineError::BandOutOfRange {
                band,
                bands: self.bands(),
            });
        }
        Ok(self.data.index_axis(Axis(2), band))
    }
}

// ---------------------------------------------------------------------------
// Region – a user-drawn rectangle in pixel space
// ---------------------------------------------------------------------------

/// Rectangular region of interest in the cube's pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    pub color: Rgb,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64, label: impl Into<String>, color: Rgb) -> Self {
        Region {
            x,
            y,
            width,
            height,
            label: label.into(),
            color,
        }
    }

    /// Half-open slice bounds clamped to the data extent.
    ///
    /// The far corner is `trunc(x) + width`, truncated, so a region drawn at
    /// fractional coordinates keeps its drawn width.
    pub fn pixel_bounds(&self, size: DataSize) -> PixelRect {
        let x1 = slice_bound(self.x, size.width);
        let y1 = slice_bound(self.y, size.height);
        let x2 = slice_bound(self.x.trunc() + self.width, size.width);
        let y2 = slice_bound(self.y.trunc() + self.height, size.height);
        PixelRect {
            x1,
            y1,
            x2: x2.max(x1),
            y2: y2.max(y1),
        }
    }

    /// Same rectangle, as a view rect over the data itself.
    pub fn as_view_rect(&self) -> ViewRect {
        ViewRect::new(self.x, self.y, self.width, self.height)
    }

    /// Rasterize the rectangle into an H × W mask.
    pub fn rasterize(&self, size: DataSize) -> Mask {
        let bounds = self.pixel_bounds(size);
        Mask::from_shape_fn((size.height, size.width), |(r, c)| bounds.contains(r, c))
    }

    /// Whether the region touches no pixel of the data extent.
    pub fn is_empty_in(&self, size: DataSize) -> bool {
        self.pixel_bounds(size).is_empty()
    }
}

fn slice_bound(v: f64, dim: usize) -> usize {
    if !v.is_finite() {
        return 0;
    }
    v.trunc().clamp(0.0, dim as f64) as usize
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: x={:.1}, y={:.1}, width={:.1}, height={:.1}",
            self.label, self.x, self.y, self.width, self.height
        )
    }
}

// ---------------------------------------------------------------------------
// RegionSet – regions in creation order
// ---------------------------------------------------------------------------

/// Ordered collection of regions. Labels default to `Object N`.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    /// Number of regions ever created; drives labels and colours.
    created: usize,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region with the next default label and colour.
    pub fn push_rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &Region {
        // Skip labels already taken by explicitly added regions.
        while self.get(&format!("Object {}", self.created + 1)).is_some() {
            self.created += 1;
        }
        let label = format!("Object {}", self.created + 1);
        let color = region_color(self.created);
        self.push(Region::new(x, y, width, height, label, color))
    }

    /// Append a fully specified region.
    pub fn push(&mut self, region: Region) -> &Region {
        self.created += 1;
        self.regions.push(region);
        &self.regions[self.regions.len() - 1]
    }

    pub fn get(&self, label: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.label == label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.label == label)
    }

    pub fn remove(&mut self, label: &str) -> Option<Region> {
        let idx = self.regions.iter().position(|r| r.label == label)?;
        Some(self.regions.remove(idx))
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.created = 0;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_rejects_zero_extent() {
        assert!(matches!(
            Cube::new(Array3::zeros((0, 4, 3))),
            Err(EngineError::InvalidCube(_))
        ));
        assert!(matches!(
            Cube::new(Array3::zeros((4, 4, 0))),
            Err(EngineError::InvalidCube(_))
        ));
        let cube = Cube::new(Array3::zeros((4, 5, 3))).unwrap();
        assert_eq!((cube.height(), cube.width(), cube.bands()), (4, 5, 3));
        assert!(matches!(
            cube.band(3),
            Err(EngineError::BandOutOfRange { band: 3, bands: 3 })
        ));
    }

    #[test]
    fn pixel_bounds_clamp_to_extent() {
        let size = DataSize {
            width: 50,
            height: 40,
        };
        let r = Region::new(45.7, -3.0, 20.0, 10.0, "a", [0, 0, 0]);
        assert_eq!(r.pixel_bounds(size), PixelRect::new(45, 0, 50, 7));

        let outside = Region::new(60.0, 10.0, 5.0, 5.0, "b", [0, 0, 0]);
        assert!(outside.is_empty_in(size));
    }

    #[test]
    fn rasterize_matches_bounds() {
        let size = DataSize {
            width: 10,
            height: 10,
        };
        let r = Region::new(2.0, 3.0, 4.0, 2.0, "a", [0, 0, 0]);
        let m = r.rasterize(size);
        assert_eq!(m.iter().filter(|&&v| v).count(), 8);
        assert!(m[(3, 2)] && m[(4, 5)]);
        assert!(!m[(5, 2)] && !m[(3, 6)]);
    }

    #[test]
    fn region_set_labels_follow_creation_order() {
        let mut set = RegionSet::new();
        set.push_rect(0.0, 0.0, 1.0, 1.0);
        set.push_rect(1.0, 1.0, 1.0, 1.0);
        set.remove("Object 1");
        set.push_rect(2.0, 2.0, 1.0, 1.0);
        let labels: Vec<&str> = set.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["Object 2", "Object 3"]);
        assert_ne!(set.as_slice()[0].color, set.as_slice()[1].color);
    }
}
