use image::{imageops, GrayImage, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::stats::histogram;

use crate::data::model::Mask;
use crate::error::SegmenterError;
use crate::geometry::PixelRect;

use super::{Prediction, Segmenter};

/// Classical stand-in for a promptable model: splits each box with an Otsu
/// threshold on luminance.
///
/// Three candidates are offered per box, bright foreground, dark foreground
/// and the whole box. The score of a class candidate is the Otsu
/// separability `σ²_between / σ²_total` inside the box, halved when that
/// class is the majority (boxes are drawn around objects, so the object is
/// usually the smaller class). The whole box scores `1 - separability`.
#[derive(Debug, Default)]
pub struct OtsuBoxSegmenter {
    luma: Option<GrayImage>,
}

impl OtsuBoxSegmenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Segmenter for OtsuBoxSegmenter {
    fn set_image(&mut self, rgb: &RgbImage) -> Result<(), SegmenterError> {
        self.luma = Some(imageops::grayscale(rgb));
        Ok(())
    }

    fn predict(&mut self, bbox: PixelRect, multimask_output: bool) -> Result<Prediction, SegmenterError> {
        let luma = self.luma.as_ref().ok_or(SegmenterError::NoImage)?;
        let (w, h) = (luma.width() as usize, luma.height() as usize);
        if h == 0 || w == 0 {
            return Err(SegmenterError::Model("image has no pixels".into()));
        }
        let x1 = bbox.x1.min(w - 1);
        let y1 = bbox.y1.min(h - 1);
        let x2 = bbox.x2.min(w - 1).max(x1);
        let y2 = bbox.y2.min(h - 1).max(y1);
        let in_box = |r: usize, c: usize| r >= y1 && r <= y2 && c >= x1 && c <= x2;

        let (bw, bh) = ((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
        let crop = imageops::crop_imm(luma, x1 as u32, y1 as u32, bw, bh).to_image();
        let (threshold, separability) = otsu(&crop);
        let hist = histogram(&crop).channels[0];
        let total: u64 = hist.iter().map(|&c| c as u64).sum();
        let bright_count: u64 = hist[threshold as usize + 1..].iter().map(|&c| c as u64).sum();
        let bright_minority = bright_count * 2 <= total;
        let value = |r: usize, c: usize| luma.get_pixel(c as u32, r as u32).0[0];

        let bright = Mask::from_shape_fn((h, w), |(r, c)| in_box(r, c) && value(r, c) > threshold);
        let dark = Mask::from_shape_fn((h, w), |(r, c)| in_box(r, c) && value(r, c) <= threshold);
        let full = Mask::from_shape_fn((h, w), |(r, c)| in_box(r, c));

        let eta = separability as f32;
        let scores = vec![
            if bright_minority { eta } else { eta * 0.5 },
            if bright_minority { eta * 0.5 } else { eta },
            1.0 - eta,
        ];
        let mut prediction = Prediction {
            masks: vec![bright, dark, full],
            scores,
        };
        log::trace!("otsu box {:?}: t={threshold} eta={eta:.3}", bbox.as_box());

        if !multimask_output {
            if let Some((i, score)) = prediction.best() {
                let mask = prediction.masks.swap_remove(i);
                prediction = Prediction {
                    masks: vec![mask],
                    scores: vec![score],
                };
            }
        }
        Ok(prediction)
    }
}

/// Otsu threshold of an 8-bit image and its separability
/// `σ²_between / σ²_total` in [0, 1].
///
/// Values `<= threshold` form the lower class. A constant image gives
/// separability 0.
pub fn otsu(image: &GrayImage) -> (u8, f64) {
    if image.width() == 0 || image.height() == 0 {
        return (0, 0.0);
    }
    let threshold = otsu_level(image);
    (threshold, separability(&histogram(image).channels[0], threshold))
}

/// Between-class over total variance of the split at `threshold`.
fn separability(hist: &[u32; 256], threshold: u8) -> f64 {
    let n: f64 = hist.iter().map(|&c| c as f64).sum();
    if n == 0.0 {
        return 0.0;
    }
    let moment = |range: std::ops::Range<usize>| -> (f64, f64) {
        hist[range.clone()]
            .iter()
            .zip(range)
            .fold((0.0, 0.0), |(w, s), (&c, i)| (w + c as f64, s + i as f64 * c as f64))
    };
    let (_, sum_all) = moment(0..256);
    let mean = sum_all / n;
    let var_total = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| c as f64 * (i as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    if var_total <= 0.0 {
        return 0.0;
    }

    let (w0, sum0) = moment(0..threshold as usize + 1);
    let w1 = n - w0;
    if w0 == 0.0 || w1 == 0.0 {
        return 0.0;
    }
    let mu0 = sum0 / w0;
    let mu1 = (sum_all - sum0) / w1;
    let between = (w0 / n) * (w1 / n) * (mu0 - mu1).powi(2);
    (between / var_total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn image_with_square() -> RgbImage {
        RgbImage::from_fn(20, 20, |x, y| {
            if (8..12).contains(&x) && (8..12).contains(&y) {
                Rgb([220, 220, 220])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    #[test]
    fn otsu_splits_bimodal_image() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 10 } else { 200 }]));
        let (t, eta) = otsu(&img);
        assert!((10..200).contains(&t));
        assert!((eta - 1.0).abs() < 1e-9);

        let flat = GrayImage::from_pixel(3, 3, Luma([42]));
        assert_eq!(otsu(&flat).1, 0.0);
    }

    #[test]
    fn bright_object_in_box_wins() {
        let mut seg = OtsuBoxSegmenter::new();
        seg.set_image(&image_with_square()).unwrap();
        let p = seg.predict(PixelRect::new(5, 5, 14, 14), true).unwrap();
        assert_eq!(p.masks.len(), 3);
        let (best, score) = p.best().unwrap();
        assert_eq!(best, 0);
        assert!(score > 0.99);
        let mask = &p.masks[0];
        assert_eq!(mask.iter().filter(|&&m| m).count(), 16);
        assert!(mask[(8, 8)] && mask[(11, 11)] && !mask[(7, 8)]);
    }

    #[test]
    fn uniform_box_prefers_the_box() {
        let mut seg = OtsuBoxSegmenter::new();
        seg.set_image(&image_with_square()).unwrap();
        let p = seg.predict(PixelRect::new(0, 0, 4, 4), false).unwrap();
        assert_eq!(p.masks.len(), 1);
        assert_eq!(p.scores, vec![1.0]);
        assert_eq!(p.masks[0].iter().filter(|&&m| m).count(), 25);
    }

    #[test]
    fn predict_without_image_fails() {
        let mut seg = OtsuBoxSegmenter::new();
        assert!(matches!(
            seg.predict(PixelRect::new(0, 0, 1, 1), true),
            Err(SegmenterError::NoImage)
        ));
    }
}
