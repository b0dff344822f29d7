/// Data layer: core types and loading.
///
/// Architecture:
/// ```text
///  folder / .hdr + raw / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  ENVI header + binary → Array3<f32>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   Cube    │  (lines, samples, bands), wavelengths
///   └──────────┘
///        +
///   ┌──────────┐
///   │ RegionSet │  user rectangles in pixel space
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
