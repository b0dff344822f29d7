/// Segmentation: collaborator contract, compositing and quality metrics.
///
/// ```text
///   band → RGB ──► Segmenter::set_image
///   regions ─────► Segmenter::predict (one box per region, sequential)
///        │
///        ▼
///   Vec<RegionMask>   (every prediction collected before anything commits)
///        │
///        ├──► compose  → CombinedMask → segment_cube
///        └──► metrics  → SegmentationMetrics
/// ```
pub mod compose;
pub mod contour;
pub mod edges;
pub mod metrics;
pub mod otsu;

use image::RgbImage;

use crate::data::model::{Mask, Region};
use crate::error::{EngineError, EngineResult, SegmenterError};
use crate::geometry::{map_to_data_space, DataSize, PixelRect};

pub use compose::{best_candidate, compose, segment_cube, RegionMask};
pub use metrics::{evaluate, RegionScore, SegmentationMetrics};
pub use otsu::OtsuBoxSegmenter;

// ---------------------------------------------------------------------------
// Segmenter contract
// ---------------------------------------------------------------------------

/// Candidate masks for one box, each with a confidence score in [0, 1].
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub masks: Vec<Mask>,
    pub scores: Vec<f32>,
}

impl Prediction {
    /// Index and score of the best candidate. Ties go to the first.
    pub fn best(&self) -> Option<(usize, f32)> {
        let n = self.masks.len().min(self.scores.len());
        best_candidate(&self.scores[..n])
    }
}

/// A promptable segmentation model: given an image and a box, return
/// candidate masks with confidence scores.
pub trait Segmenter {
    fn set_image(&mut self, rgb: &RgbImage) -> Result<(), SegmenterError>;

    /// `bbox` holds inclusive pixel corners clamped to the image.
    fn predict(&mut self, bbox: PixelRect, multimask_output: bool) -> Result<Prediction, SegmenterError>;
}

// ---------------------------------------------------------------------------
// Segmentation pass
// ---------------------------------------------------------------------------

/// Run the segmenter over every non-empty region and keep each region's best
/// candidate.
///
/// Nothing is returned unless every region succeeds: the first failure aborts
/// the pass and the results gathered so far are dropped.
pub fn segment_regions(
    segmenter: &mut dyn Segmenter,
    image: &RgbImage,
    regions: &[Region],
) -> EngineResult<Vec<RegionMask>> {
    let size = DataSize {
        width: image.width() as usize,
        height: image.height() as usize,
    };
    segmenter
        .set_image(image)
        .map_err(|source| EngineError::SegmenterFailure {
            region: "<image>".into(),
            source,
        })?;

    let mut results = Vec::with_capacity(regions.len());
    for region in regions {
        if region.is_empty_in(size) {
            log::warn!("region '{}' covers no pixels, not segmented", region.label);
            continue;
        }
        let bbox = map_to_data_space(&region.as_view_rect(), size.into(), size);
        log::debug!("predicting '{}' with box {:?}", region.label, bbox.as_box());

        let prediction = segmenter
            .predict(bbox, true)
            .map_err(|source| EngineError::SegmenterFailure {
                region: region.label.clone(),
                source,
            })?;
        results.push(RegionMask::select(region, prediction, size)?);
    }
    Ok(results)
}
