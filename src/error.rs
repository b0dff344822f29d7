use thiserror::Error;

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors raised by the core engine.
///
/// Geometry problems (empty regions) and constant bands are not errors: they
/// are absorbed where they occur with a documented fallback and logged.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cube missing dimensions, wrong rank or zero spatial extent.
    #[error("invalid cube: {0}")]
    InvalidCube(String),

    #[error("no cube loaded")]
    NoCube,

    #[error("band {band} out of range (cube has {bands} bands)")]
    BandOutOfRange { band: usize, bands: usize },

    #[error("no regions defined")]
    NoRegions,

    #[error("no segmentation available")]
    NoSegmentation,

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("a region labelled '{0}' already exists")]
    DuplicateRegion(String),

    /// The segmenter returned a mask that does not match the image shape.
    #[error("mask for '{region}' has shape {got:?}, expected {expected:?}")]
    MaskShape {
        region: String,
        got: (usize, usize),
        expected: (usize, usize),
    },

    /// The external segmenter failed; the whole pass is discarded.
    #[error("segmentation failed on '{region}': {source}")]
    SegmenterFailure {
        region: String,
        #[source]
        source: SegmenterError,
    },
}

/// Failure reported by a [`Segmenter`](crate::segment::Segmenter) implementation.
#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("no image set before predict")]
    NoImage,

    #[error("prediction returned no candidates")]
    NoCandidates,

    #[error("{0}")]
    Model(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
