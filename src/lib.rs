//! Band visualization and segmentation compositing for hyperspectral cubes.
//!
//! ```text
//!  loader ──► Cube ──► Session ──► BandRenderer ──► BandCache ──► GrayImage
//!                        │
//!                        ├──► spectral (signatures) ──► SpectralCache
//!                        │
//!                        └──► Segmenter ──► compose ──► metrics
//!                                              │
//!                                              └──► export
//! ```

pub mod cache;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod geometry;
pub mod render;
pub mod segment;
pub mod spectral;
pub mod state;

pub use data::model::{Cube, Mask, Region, RegionSet};
pub use error::{EngineError, EngineResult, SegmenterError};
pub use state::Session;
