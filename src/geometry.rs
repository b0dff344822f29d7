use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rectangles in view space and data space
// ---------------------------------------------------------------------------

/// A rectangle as drawn by the user, in view (display widget) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Size of the view the rectangle was drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f64,
    pub height: f64,
}

/// Spatial size of the data (cube width = samples, height = lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSize {
    pub width: usize,
    pub height: usize,
}

impl From<DataSize> for ViewSize {
    fn from(size: DataSize) -> Self {
        ViewSize {
            width: size.width as f64,
            height: size.height as f64,
        }
    }
}

/// Integer pixel corners in data space.
///
/// Produced by [`map_to_data_space`] the corners are inclusive and clamped to
/// `[0, dim - 1]`; produced by [`Region::pixel_bounds`](crate::data::model::Region::pixel_bounds)
/// they are half-open slice bounds clamped to `[0, dim]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl PixelRect {
    pub fn new(x1: usize, y1: usize, x2: usize, y2: usize) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> usize {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> usize {
        self.y2.saturating_sub(self.y1)
    }

    /// Number of pixels covered when read as half-open bounds.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// `[x1, y1, x2, y2]`, the box layout segmenters expect.
    pub fn as_box(&self) -> [usize; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Whether `(row, col)` lies inside the half-open bounds.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.y1 && row < self.y2 && col >= self.x1 && col < self.x2
    }
}

// ---------------------------------------------------------------------------
// CoordinateMapper
// ---------------------------------------------------------------------------

/// Map a view-space rectangle into data-space pixel corners.
///
/// Each corner is scaled by `data / view`, truncated toward zero and clamped
/// independently to `[0, dim - 1]`. The mapping is total: degenerate inputs
/// (zero view size, rectangles outside the view) yield degenerate rectangles
/// that consumers treat as empty.
pub fn map_to_data_space(view_rect: &ViewRect, view_size: ViewSize, data_size: DataSize) -> PixelRect {
    let scale_x = scale(data_size.width, view_size.width);
    let scale_y = scale(data_size.height, view_size.height);

    let x1 = clamp_coord(view_rect.x * scale_x, data_size.width);
    let y1 = clamp_coord(view_rect.y * scale_y, data_size.height);
    let x2 = clamp_coord((view_rect.x + view_rect.width) * scale_x, data_size.width);
    let y2 = clamp_coord((view_rect.y + view_rect.height) * scale_y, data_size.height);

    PixelRect { x1, y1, x2, y2 }
}

/// Scale a view-space rectangle into data units without rounding or
/// clamping. Used when storing a drawn region.
pub fn scale_to_data(view_rect: &ViewRect, view_size: ViewSize, data_size: DataSize) -> ViewRect {
    let sx = scale(data_size.width, view_size.width);
    let sy = scale(data_size.height, view_size.height);
    ViewRect::new(
        view_rect.x * sx,
        view_rect.y * sy,
        view_rect.width * sx,
        view_rect.height * sy,
    )
}

fn scale(data_dim: usize, view_dim: f64) -> f64 {
    if view_dim > 0.0 && view_dim.is_finite() {
        data_dim as f64 / view_dim
    } else {
        0.0
    }
}

fn clamp_coord(v: f64, dim: usize) -> usize {
    if dim == 0 || !v.is_finite() {
        return 0;
    }
    let max = (dim - 1) as f64;
    v.trunc().clamp(0.0, max) as usize
}
