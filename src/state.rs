use image::GrayImage;

use crate::cache::{BandCache, CacheStats, SpectralCache};
use crate::config::EngineConfig;
use crate::data::model::{Cube, Mask, Region, RegionSet};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{scale_to_data, ViewRect, ViewSize};
use crate::render::{grayscale_rgb, BandRenderer, RenderMode, ViewMode};
use crate::segment::{compose, evaluate, segment_cube, segment_regions, RegionMask, SegmentationMetrics, Segmenter};
use crate::spectral::{self, SpectralSignature};

// ---------------------------------------------------------------------------
// Segmentation – committed result of one pass
// ---------------------------------------------------------------------------

/// Everything a successful segmentation pass produced. Replaced as a whole.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub region_masks: Vec<RegionMask>,
    pub combined: Mask,
    /// The cube zeroed outside `combined`.
    pub cube: Cube,
    pub metrics: SegmentationMetrics,
    /// Band the segmenter was shown.
    pub band: usize,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The document context: one cube, its regions, the current view and the
/// caches derived from them.
///
/// Caches are invalidated before any state they depend on is replaced, so a
/// lookup can never return a value computed from an older cube or mask.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    renderer: BandRenderer,

    cube: Option<Cube>,
    /// Bumped on every cube replacement.
    generation: u64,

    regions: RegionSet,
    band: usize,
    view_mode: ViewMode,
    segmentation: Option<Segmentation>,

    band_cache: BandCache,
    spectral_cache: SpectralCache,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitize();
        Self {
            renderer: BandRenderer::new(config.render.clone()),
            band_cache: BandCache::new(config.cache.band_capacity),
            spectral_cache: SpectralCache::new(),
            config,
            cube: None,
            generation: 0,
            regions: RegionSet::new(),
            band: 0,
            view_mode: ViewMode::Raw,
            segmentation: None,
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cube(&self) -> Option<&Cube> {
        self.cube.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn band(&self) -> usize {
        self.band
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn segmentation(&self) -> Option<&Segmentation> {
        self.segmentation.as_ref()
    }

    pub fn band_cache_stats(&self) -> CacheStats {
        self.band_cache.stats()
    }

    fn require_cube(&self) -> EngineResult<&Cube> {
        self.cube.as_ref().ok_or(EngineError::NoCube)
    }

    // -- cube --------------------------------------------------------------

    /// Replace the cube. Regions are kept; everything derived is dropped.
    pub fn load_cube(&mut self, cube: Cube) {
        self.band_cache.invalidate();
        self.spectral_cache.invalidate();
        self.segmentation = None;
        self.view_mode = ViewMode::Raw;
        self.band = 0;
        self.generation += 1;
        log::info!(
            "loaded cube {}x{}x{} (generation {})",
            cube.height(),
            cube.width(),
            cube.bands(),
            self.generation
        );
        self.cube = Some(cube);
    }

    // -- regions -----------------------------------------------------------

    /// Store a rectangle drawn in a view of size `view_size`.
    pub fn add_region_from_view(&mut self, view_rect: ViewRect, view_size: ViewSize) -> EngineResult<&Region> {
        let size = self.require_cube()?.size();
        let r = scale_to_data(&view_rect, view_size, size);
        self.regions_changed();
        let region = self.regions.push_rect(r.x, r.y, r.width, r.height);
        if region.is_empty_in(size) {
            log::warn!("'{}' lies outside the cube", region.label);
        }
        Ok(region)
    }

    /// Add a region with its own label and colour.
    pub fn add_region(&mut self, region: Region) -> EngineResult<&Region> {
        if self.regions.get(&region.label).is_some() {
            return Err(EngineError::DuplicateRegion(region.label));
        }
        self.regions_changed();
        Ok(self.regions.push(region))
    }

    /// Move a region to a new top-left corner, keeping its size.
    pub fn move_region(&mut self, label: &str, x: f64, y: f64) -> EngineResult<()> {
        let region = self
            .regions
            .get_mut(label)
            .ok_or_else(|| EngineError::UnknownRegion(label.to_string()))?;
        region.x = x;
        region.y = y;
        self.spectral_cache.forget(label);
        self.regions_changed();
        Ok(())
    }

    pub fn remove_region(&mut self, label: &str) -> EngineResult<Region> {
        let region = self
            .regions
            .remove(label)
            .ok_or_else(|| EngineError::UnknownRegion(label.to_string()))?;
        self.spectral_cache.forget(label);
        self.regions_changed();
        Ok(region)
    }

    pub fn clear_regions(&mut self) {
        for region in &self.regions {
            self.spectral_cache.forget(&region.label);
        }
        self.regions.clear();
        self.regions_changed();
    }

    /// A region edit makes the committed mask stale.
    fn regions_changed(&mut self) {
        if self.segmentation.is_some() {
            log::debug!("regions changed, dropping segmentation");
            self.band_cache.invalidate();
            self.spectral_cache.forget_masked();
            self.segmentation = None;
            self.view_mode = ViewMode::Raw;
        }
    }

    // -- view --------------------------------------------------------------

    pub fn set_band(&mut self, band: usize) -> EngineResult<()> {
        let bands = self.require_cube()?.bands();
        if band >= bands {
            return Err(EngineError::BandOutOfRange { band, bands });
        }
        self.band = band;
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) -> EngineResult<()> {
        if mode == ViewMode::Segmented && self.segmentation.is_none() {
            return Err(EngineError::NoSegmentation);
        }
        self.view_mode = mode;
        Ok(())
    }

    pub fn render_current(&mut self) -> EngineResult<&GrayImage> {
        self.render_band(self.band)
    }

    /// Render `band` in the current view mode, through the band cache.
    pub fn render_band(&mut self, band: usize) -> EngineResult<&GrayImage> {
        let cube = self.cube.as_ref().ok_or(EngineError::NoCube)?;
        let mode = self.view_mode;
        let renderer = &self.renderer;

        match (mode, &self.segmentation) {
            (ViewMode::Segmented, Some(seg)) => {
                let slice = seg.cube.band(band)?;
                let render_mode = renderer.segmented_mode(&seg.combined, cube.bands());
                Ok(self
                    .band_cache
                    .get_or_render(band, mode, || renderer.render(slice, render_mode)))
            }
            (ViewMode::Segmented, None) => Err(EngineError::NoSegmentation),
            (ViewMode::Raw, _) => {
                let slice = cube.band(band)?;
                Ok(self
                    .band_cache
                    .get_or_render(band, mode, || renderer.render(slice, RenderMode::Raw)))
            }
        }
    }

    // -- spectra -----------------------------------------------------------

    /// Mean signature of every region, in creation order. Empty regions give
    /// NaN signatures.
    pub fn region_signatures(&mut self) -> EngineResult<Vec<SpectralSignature>> {
        let cube = self.cube.as_ref().ok_or(EngineError::NoCube)?;
        let size = cube.size();
        let mut out = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let bounds = region.pixel_bounds(size);
            let sig = self
                .spectral_cache
                .region_or_insert_with(&region.label, bounds, || spectral::extract(region, cube));
            out.push(sig.clone());
        }
        Ok(out)
    }

    pub fn full_signature(&mut self) -> EngineResult<SpectralSignature> {
        let cube = self.cube.as_ref().ok_or(EngineError::NoCube)?;
        Ok(self
            .spectral_cache
            .full_or_insert_with(|| spectral::extract_full(cube))
            .clone())
    }

    /// Mean signature over the committed combined mask.
    pub fn masked_signature(&mut self) -> EngineResult<SpectralSignature> {
        let cube = self.cube.as_ref().ok_or(EngineError::NoCube)?;
        let seg = self.segmentation.as_ref().ok_or(EngineError::NoSegmentation)?;
        Ok(self
            .spectral_cache
            .masked_or_insert_with(|| spectral::extract_masked("Segmented", &seg.combined, cube))
            .clone())
    }

    // -- segmentation ------------------------------------------------------

    /// Segment every region on the current band and commit the result.
    ///
    /// All predictions are gathered before anything is committed; if any
    /// region fails the session is left exactly as it was.
    pub fn segment(&mut self, segmenter: &mut dyn Segmenter) -> EngineResult<&SegmentationMetrics> {
        let cube = self.require_cube()?;
        if self.regions.is_empty() {
            return Err(EngineError::NoRegions);
        }
        let image = grayscale_rgb(cube.band(self.band)?);
        let region_masks = segment_regions(segmenter, &image, self.regions.as_slice())?;

        let combined = compose((cube.height(), cube.width()), &region_masks);
        let segmented = segment_cube(cube, &combined)?;
        let metrics = evaluate(&region_masks, &combined, &self.config.metrics);

        self.band_cache.invalidate();
        self.spectral_cache.forget_masked();
        let seg = self.segmentation.insert(Segmentation {
            region_masks,
            combined,
            cube: segmented,
            metrics,
            band: self.band,
        });
        self.view_mode = ViewMode::Segmented;
        Ok(&seg.metrics)
    }

    /// Drop the cube, regions, segmentation and every cache entry.
    pub fn clear(&mut self) {
        self.band_cache.invalidate();
        self.spectral_cache.invalidate();
        self.segmentation = None;
        self.cube = None;
        self.regions.clear();
        self.band = 0;
        self.view_mode = ViewMode::Raw;
        log::info!("session cleared");
    }
}
