use std::f64::consts::PI;

use image::{GrayImage, Luma};
use ndarray::Zip;
use serde::Serialize;

use crate::config::MetricsConfig;
use crate::data::model::Mask;
use crate::geometry::DataSize;

use super::compose::{coverage_percent, RegionMask};
use super::{contour, edges};

/// Per-region agreement between the chosen mask and the drawn rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionScore {
    pub label: String,
    pub iou: f64,
    pub confidence: f64,
}

/// Descriptive quality figures for one segmentation pass.
///
/// These are heuristics kept for continuity with earlier reports, not
/// accuracy measures:
/// - IoU is taken against the rectangle the user drew, so it says whether the
///   model respected the box, nothing about ground truth
/// - `boundary_smoothness = 1 - edge_pixels / (2 * sqrt(area))` can go
///   negative for ragged masks
/// - `compactness = 4π * area / perimeter²` uses the summed perimeter of all
///   external contours, so several blobs score lower than one
///
/// None of the values gate processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentationMetrics {
    pub avg_confidence: f64,
    pub per_region: Vec<RegionScore>,
    pub avg_iou: f64,
    pub coverage_percent: f64,
    pub boundary_smoothness: f64,
    pub compactness: f64,
    pub area: usize,
    pub edge_pixels: usize,
    pub perimeter: f64,
}

/// Compute every metric for the selected region masks and their union.
pub fn evaluate(region_masks: &[RegionMask], combined: &Mask, config: &MetricsConfig) -> SegmentationMetrics {
    let (h, w) = combined.dim();
    let size = DataSize {
        width: w,
        height: h,
    };

    let per_region: Vec<RegionScore> = region_masks
        .iter()
        .map(|rm| RegionScore {
            label: rm.region.label.clone(),
            iou: iou(&rm.mask, &rm.region.rasterize(size)),
            confidence: rm.score as f64,
        })
        .collect();
    let avg_confidence = mean(per_region.iter().map(|r| r.confidence));
    let avg_iou = mean(
        region_masks
            .iter()
            .zip(&per_region)
            .filter(|(rm, _)| !rm.region.is_empty_in(size))
            .map(|(_, s)| s.iou),
    );

    let area = combined.iter().filter(|&&m| m).count();

    let rendered = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if combined[(y as usize, x as usize)] { 255 } else { 0 }])
    });
    let edge_pixels = edges::canny(&rendered, config.canny_low, config.canny_high)
        .iter()
        .filter(|&&e| e)
        .count();
    let boundary_smoothness = if area > 0 {
        1.0 - edge_pixels as f64 / (2.0 * (area as f64).sqrt())
    } else {
        0.0
    };

    let perimeter: f64 = contour::external_contours(combined)
        .iter()
        .map(|c| contour::arc_length(c))
        .sum();
    let compactness = if perimeter > 0.0 {
        4.0 * PI * area as f64 / (perimeter * perimeter)
    } else {
        0.0
    };

    let metrics = SegmentationMetrics {
        avg_confidence,
        per_region,
        avg_iou,
        coverage_percent: coverage_percent(combined),
        boundary_smoothness,
        compactness,
        area,
        edge_pixels,
        perimeter,
    };
    log::info!(
        "segmentation: confidence {:.3}, IoU {:.3}, coverage {:.2}%, smoothness {:.3}, compactness {:.3}",
        metrics.avg_confidence,
        metrics.avg_iou,
        metrics.coverage_percent,
        metrics.boundary_smoothness,
        metrics.compactness
    );
    metrics
}

/// Intersection over union of two equally shaped masks; 0 for an empty union.
pub fn iou(a: &Mask, b: &Mask) -> f64 {
    if a.dim() != b.dim() {
        return 0.0;
    }
    let mut inter = 0usize;
    let mut union = 0usize;
    Zip::from(a).and(b).for_each(|&x, &y| {
        inter += (x && y) as usize;
        union += (x || y) as usize;
    });
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Region;
    use crate::segment::compose::compose;

    fn region_mask(region: Region, mask: Mask, score: f32) -> RegionMask {
        RegionMask {
            region,
            mask,
            score,
            candidates: 1,
        }
    }

    #[test]
    fn iou_extremes() {
        let a = Mask::from_shape_fn((4, 4), |(r, _)| r < 2);
        let b = Mask::from_shape_fn((4, 4), |(r, _)| r >= 2);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &b), 0.0);
        let none = Mask::from_elem((4, 4), false);
        assert_eq!(iou(&none, &none), 0.0);
    }

    #[test]
    fn box_shaped_mask_scores_perfect_iou() {
        let size = DataSize {
            width: 40,
            height: 40,
        };
        let region = Region::new(10.0, 10.0, 20.0, 20.0, "Object 1", [255, 0, 0]);
        let mask = region.rasterize(size);
        let rms = vec![region_mask(region, mask, 0.75)];
        let combined = compose((40, 40), &rms);
        let m = evaluate(&rms, &combined, &MetricsConfig::default());

        assert_eq!(m.per_region.len(), 1);
        assert_eq!(m.per_region[0].iou, 1.0);
        assert_eq!(m.avg_iou, 1.0);
        assert_eq!(m.avg_confidence, 0.75);
        assert_eq!(m.area, 400);
        assert_eq!(m.coverage_percent, 25.0);
        assert_eq!(m.perimeter, 76.0);
        assert!((m.compactness - 4.0 * PI * 400.0 / 76.0f64.powi(2)).abs() < 1e-12);
        assert!(m.edge_pixels > 0);
        assert!(m.boundary_smoothness < 1.0);
    }

    #[test]
    fn empty_combined_mask_is_all_zero() {
        let combined = Mask::from_elem((10, 10), false);
        let m = evaluate(&[], &combined, &MetricsConfig::default());
        assert_eq!(m, SegmentationMetrics::default());
    }

    #[test]
    fn off_box_candidate_has_zero_iou() {
        let size = DataSize {
            width: 20,
            height: 20,
        };
        let region = Region::new(0.0, 0.0, 5.0, 5.0, "a", [0, 0, 0]);
        let elsewhere = Region::new(10.0, 10.0, 5.0, 5.0, "b", [0, 0, 0]).rasterize(size);
        let rms = vec![region_mask(region, elsewhere, 0.5)];
        let combined = compose((20, 20), &rms);
        let m = evaluate(&rms, &combined, &MetricsConfig::default());
        assert_eq!(m.avg_iou, 0.0);
        assert_eq!(m.avg_confidence, 0.5);
    }
}
