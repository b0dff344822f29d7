use ndarray::{Axis, Zip};

use crate::data::model::{Cube, Mask, Region};
use crate::error::{EngineError, EngineResult, SegmenterError};
use crate::geometry::DataSize;

use super::Prediction;

// ---------------------------------------------------------------------------
// RegionMask – the best candidate for one region
// ---------------------------------------------------------------------------

/// Segmentation result for a single region.
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub region: Region,
    /// Highest-scoring candidate, in data space.
    pub mask: Mask,
    pub score: f32,
    /// How many candidates the segmenter offered.
    pub candidates: usize,
}

impl RegionMask {
    /// Keep the best candidate of `prediction`, validating its shape.
    pub fn select(region: &Region, mut prediction: Prediction, size: DataSize) -> EngineResult<Self> {
        let candidates = prediction.masks.len();
        let (index, score) = prediction.best().ok_or_else(|| EngineError::SegmenterFailure {
            region: region.label.clone(),
            source: SegmenterError::NoCandidates,
        })?;
        let mask = prediction.masks.swap_remove(index);

        let expected = (size.height, size.width);
        if mask.dim() != expected {
            return Err(EngineError::MaskShape {
                region: region.label.clone(),
                got: mask.dim(),
                expected,
            });
        }
        log::debug!(
            "'{}': picked candidate {index} of {candidates} (score {score:.3})",
            region.label
        );
        Ok(RegionMask {
            region: region.clone(),
            mask,
            score,
            candidates,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

// ---------------------------------------------------------------------------
// Compositing
// ---------------------------------------------------------------------------

/// Position and value of the highest score, ignoring NaN. Ties go to the
/// first occurrence.
pub fn best_candidate(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

/// Union of every region's best mask. `shape` is `(height, width)`.
///
/// Order independent and idempotent; an empty slice gives an all-false mask.
pub fn compose(shape: (usize, usize), masks: &[RegionMask]) -> Mask {
    let mut combined = Mask::from_elem(shape, false);
    for rm in masks {
        if rm.mask.dim() != shape {
            log::warn!("skipping mask for '{}': shape {:?}", rm.region.label, rm.mask.dim());
            continue;
        }
        Zip::from(&mut combined).and(&rm.mask).for_each(|c, &m| *c |= m);
    }
    combined
}

/// Zero every spectrum outside `mask`. The input cube is untouched.
pub fn segment_cube(cube: &Cube, mask: &Mask) -> EngineResult<Cube> {
    let expected = (cube.height(), cube.width());
    if mask.dim() != expected {
        return Err(EngineError::MaskShape {
            region: "combined".into(),
            got: mask.dim(),
            expected,
        });
    }
    let mut data = cube.data().clone();
    Zip::from(data.lanes_mut(Axis(2)))
        .and(mask)
        .for_each(|mut spectrum, &keep| {
            if !keep {
                spectrum.fill(0.0);
            }
        });
    Ok(cube.derive(data))
}

/// Share of `mask` pixels that are set, in percent.
pub fn coverage_percent(mask: &Mask) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let set = mask.iter().filter(|&&m| m).count();
    set as f64 / mask.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn region(label: &str) -> Region {
        Region::new(0.0, 0.0, 2.0, 2.0, label, [1, 2, 3])
    }

    fn rm(label: &str, mask: Mask) -> RegionMask {
        RegionMask {
            region: region(label),
            mask,
            score: 1.0,
            candidates: 1,
        }
    }

    fn square(shape: (usize, usize), r0: usize, c0: usize, n: usize) -> Mask {
        Mask::from_shape_fn(shape, |(r, c)| (r0..r0 + n).contains(&r) && (c0..c0 + n).contains(&c))
    }

    #[test]
    fn select_keeps_highest_score() {
        let size = DataSize {
            width: 4,
            height: 3,
        };
        let a = Mask::from_elem((3, 4), false);
        let b = Mask::from_elem((3, 4), true);
        let p = Prediction {
            masks: vec![a, b.clone()],
            scores: vec![0.2, 0.7],
        };
        let picked = RegionMask::select(&region("r"), p, size).unwrap();
        assert_eq!(picked.mask, b);
        assert_eq!(picked.score, 0.7);
        assert_eq!(picked.candidates, 2);
    }

    #[test]
    fn select_rejects_wrong_shape_and_empty_predictions() {
        let size = DataSize {
            width: 4,
            height: 3,
        };
        let p = Prediction {
            masks: vec![Mask::from_elem((4, 3), true)],
            scores: vec![0.9],
        };
        assert!(matches!(
            RegionMask::select(&region("r"), p, size),
            Err(EngineError::MaskShape {
                got: (4, 3),
                expected: (3, 4),
                ..
            })
        ));
        assert!(matches!(
            RegionMask::select(&region("r"), Prediction::default(), size),
            Err(EngineError::SegmenterFailure {
                source: SegmenterError::NoCandidates,
                ..
            })
        ));
    }

    #[test]
    fn union_is_commutative_and_idempotent() {
        let shape = (10, 10);
        let a = rm("a", square(shape, 0, 0, 4));
        let b = rm("b", square(shape, 3, 3, 4));

        let ab = compose(shape, &[a.clone(), b.clone()]);
        let ba = compose(shape, &[b.clone(), a.clone()]);
        assert_eq!(ab, ba);
        assert_eq!(compose(shape, &[a.clone(), a.clone()]), a.mask);
        // 16 + 16 - 1 overlapping pixel.
        assert_eq!(ab.iter().filter(|&&m| m).count(), 31);
        assert!(!compose(shape, &[]).iter().any(|&m| m));
    }

    #[test]
    fn coverage_never_decreases_when_adding_regions() {
        let shape = (12, 12);
        let masks: Vec<RegionMask> = (0..4)
            .map(|i| rm(&format!("r{i}"), square(shape, i * 2, i * 3, 3)))
            .collect();
        let mut last = 0.0;
        for n in 0..=masks.len() {
            let cov = coverage_percent(&compose(shape, &masks[..n]));
            assert!(cov >= last);
            last = cov;
        }
    }

    #[test]
    fn segment_cube_zeroes_outside_mask() {
        let cube = Cube::new(Array3::from_elem((3, 3, 2), 5.0f32))
            .unwrap()
            .with_wavelengths(vec![400.0, 500.0]);
        let mut mask = Mask::from_elem((3, 3), false);
        mask[(1, 1)] = true;
        let seg = segment_cube(&cube, &mask).unwrap();
        assert_eq!(seg.data()[(1, 1, 0)], 5.0);
        assert_eq!(seg.data()[(1, 1, 1)], 5.0);
        assert_eq!(seg.data()[(0, 0, 1)], 0.0);
        assert_eq!(seg.wavelengths, cube.wavelengths);
        // Source cube unchanged.
        assert_eq!(cube.data()[(0, 0, 1)], 5.0);

        assert!(segment_cube(&cube, &Mask::from_elem((2, 3), true)).is_err());
    }
}
