use std::collections::{HashMap, VecDeque};

use image::GrayImage;

use crate::geometry::PixelRect;
use crate::render::ViewMode;
use crate::spectral::SpectralSignature;

// ---------------------------------------------------------------------------
// BandCache – bounded (band, mode) → rendered image
// ---------------------------------------------------------------------------

pub type BandKey = (usize, ViewMode);

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Fixed-capacity cache of rendered bands, evicting in insertion order.
#[derive(Debug)]
pub struct BandCache {
    capacity: usize,
    order: VecDeque<BandKey>,
    entries: HashMap<BandKey, GrayImage>,
    stats: CacheStats,
}

impl BandCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Return the cached render for `(band, mode)`, computing it on a miss.
    pub fn get_or_render<F>(&mut self, band: usize, mode: ViewMode, compute: F) -> &GrayImage
    where
        F: FnOnce() -> GrayImage,
    {
        let key = (band, mode);
        if self.entries.contains_key(&key) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            let image = compute();
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(old) => {
                        self.entries.remove(&old);
                        self.stats.evictions += 1;
                        log::trace!("band cache evicted {old:?}");
                    }
                    None => break,
                }
            }
            self.order.push_back(key);
            self.entries.insert(key, image);
        }
        &self.entries[&key]
    }

    pub fn contains(&self, band: usize, mode: ViewMode) -> bool {
        self.entries.contains_key(&(band, mode))
    }

    /// Drop every entry. Counters are kept.
    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("band cache invalidated ({} entries)", self.entries.len());
        }
        self.order.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// SpectralCache – signatures per region label
// ---------------------------------------------------------------------------

/// Memoized signatures keyed by region label. Each entry remembers the pixel
/// bounds it was computed from; a lookup with different bounds is a miss.
#[derive(Debug, Default)]
pub struct SpectralCache {
    regions: HashMap<String, (PixelRect, SpectralSignature)>,
    full: Option<SpectralSignature>,
    masked: Option<SpectralSignature>,
}

impl SpectralCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region_or_insert_with<F>(&mut self, label: &str, bounds: PixelRect, compute: F) -> &SpectralSignature
    where
        F: FnOnce() -> SpectralSignature,
    {
        let stale = match self.regions.get(label) {
            Some((cached, _)) => *cached != bounds,
            None => true,
        };
        if stale {
            self.regions.insert(label.to_string(), (bounds, compute()));
        }
        &self.regions[label].1
    }

    pub fn full_or_insert_with<F>(&mut self, compute: F) -> &SpectralSignature
    where
        F: FnOnce() -> SpectralSignature,
    {
        self.full.get_or_insert_with(compute)
    }

    /// Signature over the combined mask.
    pub fn masked_or_insert_with<F>(&mut self, compute: F) -> &SpectralSignature
    where
        F: FnOnce() -> SpectralSignature,
    {
        self.masked.get_or_insert_with(compute)
    }

    pub fn forget(&mut self, label: &str) {
        self.regions.remove(label);
    }

    /// Drop the combined-mask signature after the mask changes.
    pub fn forget_masked(&mut self) {
        self.masked = None;
    }

    pub fn invalidate(&mut self) {
        self.regions.clear();
        self.full = None;
        self.masked = None;
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn img(v: u8) -> GrayImage {
        GrayImage::from_pixel(2, 2, image::Luma([v]))
    }

    #[test]
    fn hit_does_not_recompute() {
        let mut cache = BandCache::new(10);
        let calls = Cell::new(0);
        for _ in 0..3 {
            let out = cache.get_or_render(3, ViewMode::Raw, || {
                calls.set(calls.get() + 1);
                img(7)
            });
            assert_eq!(out.get_pixel(0, 0).0, [7]);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn capacity_is_respected() {
        let mut cache = BandCache::new(10);
        for band in 0..11 {
            cache.get_or_render(band, ViewMode::Raw, || img(band as u8));
        }
        assert_eq!(cache.len(), 10);
        assert!(cache.stats().evictions >= 1);
        // First inserted is the one evicted.
        assert!(!cache.contains(0, ViewMode::Raw));
        assert!(cache.contains(10, ViewMode::Raw));
    }

    #[test]
    fn modes_are_distinct_keys() {
        let mut cache = BandCache::new(4);
        cache.get_or_render(1, ViewMode::Raw, || img(1));
        cache.get_or_render(1, ViewMode::Segmented, || img(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_or_render(1, ViewMode::Raw, || img(9)).get_pixel(0, 0).0, [1]);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let mut cache = BandCache::new(4);
        cache.get_or_render(3, ViewMode::Raw, || img(1));
        cache.invalidate();
        assert!(cache.is_empty());
        let out = cache.get_or_render(3, ViewMode::Raw, || img(2));
        assert_eq!(out.get_pixel(0, 0).0, [2]);
    }

    #[test]
    fn spectral_cache_tracks_geometry() {
        let mut cache = SpectralCache::new();
        let a = PixelRect::new(0, 0, 2, 2);
        let b = PixelRect::new(1, 1, 3, 3);
        let sig = |v: f64| SpectralSignature::new("Object 1", vec![v], 1);

        assert_eq!(cache.region_or_insert_with("Object 1", a, || sig(1.0)).values, [1.0]);
        assert_eq!(cache.region_or_insert_with("Object 1", a, || sig(2.0)).values, [1.0]);
        assert_eq!(cache.region_or_insert_with("Object 1", b, || sig(3.0)).values, [3.0]);

        cache.full_or_insert_with(|| sig(4.0));
        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.full_or_insert_with(|| sig(5.0)).values, [5.0]);
    }
}
