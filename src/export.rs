//! Export surface: signature tables, region listings, images and metadata.
//!
//! ```text
//!  <out>/
//!    bounding_boxes.txt
//!    metadata.json
//!    segmented_cube.hdr + .raw
//!    plots/   segmented_objects_spectral_signatures.csv
//!             full_spectral_signature.csv
//!             spectral_signatures.parquet
//!    images/  segmentation_mask.png  colored_mask.png  segmented_image.png
//!             rgb_image.png (when the cube came with a preview)
//!    bands/   segmented_band_000.png ...
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use arrow::array::{Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use image::{GrayImage, Luma};
use ndarray::ArrayView2;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::color::colorize_mask;
use crate::config::Orientation;
use crate::data::loader::EnviDataType;
use crate::data::model::{Cube, Mask, Region};
use crate::render::{orient, ViewMode};
use crate::segment::SegmentationMetrics;
use crate::spectral::{SpectralSignature, FULL_IMAGE_LABEL};
use crate::state::Session;

// ---------------------------------------------------------------------------
// Signature tables
// ---------------------------------------------------------------------------

/// One row per band: `Band,<region labels…>,Full Image`. Regions that cover
/// no pixels are left out.
pub fn write_signatures_csv(path: &Path, regions: &[SpectralSignature], full: &SpectralSignature) -> Result<()> {
    let columns: Vec<&SpectralSignature> = regions
        .iter()
        .filter(|s| !s.is_empty())
        .chain(std::iter::once(full))
        .collect();

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec!["Band"];
    header.extend(columns[..columns.len() - 1].iter().map(|s| s.label.as_str()));
    header.push(FULL_IMAGE_LABEL);
    writer.write_record(&header)?;

    for band in 0..full.len() {
        let mut row = vec![band.to_string()];
        for sig in &columns {
            let v = sig.values.get(band).copied().unwrap_or(f64::NAN);
            row.push(format!("{v:.6}"));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Two-column table `Band,Reflectance`.
pub fn write_full_signature_csv(path: &Path, full: &SpectralSignature) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Band", "Reflectance"])?;
    for (band, v) in full.values.iter().enumerate() {
        writer.write_record([band.to_string(), format!("{v:.6}")])?;
    }
    writer.flush()?;
    Ok(())
}

/// Signatures as Parquet rows `{x: [band axis], y: [mean values], label,
/// pixels}`. The x axis holds wavelengths when known, band indices otherwise.
pub fn write_signatures_parquet(
    path: &Path,
    signatures: &[SpectralSignature],
    wavelengths: Option<&[f64]>,
) -> Result<()> {
    let rows: Vec<&SpectralSignature> = signatures.iter().filter(|s| !s.is_empty()).collect();

    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for sig in &rows {
        let values = x_builder.values();
        for band in 0..sig.len() {
            let x = wavelengths
                .and_then(|wl| wl.get(band).copied())
                .unwrap_or(band as f64);
            values.append_value(x);
        }
        x_builder.append(true);

        let values = y_builder.values();
        for &v in &sig.values {
            values.append_value(v);
        }
        y_builder.append(true);
    }
    let label_array = StringArray::from(rows.iter().map(|s| s.label.as_str()).collect::<Vec<_>>());
    let pixels_array = Int64Array::from(rows.iter().map(|s| s.pixels as i64).collect::<Vec<_>>());

    let item = || Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item()), false),
        Field::new("y", DataType::List(item()), false),
        Field::new("label", DataType::Utf8, false),
        Field::new("pixels", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(label_array),
            Arc::new(pixels_array),
        ],
    )
    .context("building signature batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// `label: x=…, y=…, width=…, height=…`, one region per line.
pub fn write_bounding_boxes(path: &Path, regions: &[Region]) -> Result<()> {
    let mut file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    for region in regions {
        writeln!(file, "{region}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Stretch nonzero pixels to 0..=255 (truncating); zeros stay black.
pub fn normalize_nonzero(band: ArrayView2<'_, f32>) -> GrayImage {
    let (h, w) = band.dim();
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in band.iter().filter(|v| **v != 0.0 && v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if !(max > min) {
        return GrayImage::new(w as u32, h as u32);
    }
    let range = (max - min) as f64;
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = band[(y as usize, x as usize)];
        if v == 0.0 || !v.is_finite() {
            Luma([0])
        } else {
            Luma([((v - min) as f64 / range * 255.0).clamp(0.0, 255.0) as u8])
        }
    })
}

/// Binary mask as a 0/255 image.
pub fn mask_image(mask: &Mask) -> GrayImage {
    let (h, w) = mask.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if mask[(y as usize, x as usize)] { 255 } else { 0 }])
    })
}

// ---------------------------------------------------------------------------
// ENVI writer
// ---------------------------------------------------------------------------

/// Write `cube` as a little-endian float32 BSQ pair: `hdr_path` plus a
/// `.raw` file with the same stem. Returns the raw path.
pub fn write_envi(cube: &Cube, hdr_path: &Path) -> Result<PathBuf> {
    let raw_path = hdr_path.with_extension("raw");
    let (h, w, b) = cube.data().dim();

    let mut header = format!(
        "ENVI\nsamples = {w}\nlines = {h}\nbands = {b}\nheader offset = 0\n\
         file type = ENVI Standard\ndata type = {}\ninterleave = bsq\nbyte order = 0\n",
        EnviDataType::F32.code()
    );
    if let Some(wl) = &cube.wavelengths {
        let list: Vec<String> = wl.iter().map(|v| format!("{v}")).collect();
        header.push_str(&format!("wavelength = {{ {} }}\n", list.join(", ")));
    }
    std::fs::write(hdr_path, header).with_context(|| format!("writing {}", hdr_path.display()))?;

    let mut bytes = Vec::with_capacity(h * w * b * 4);
    for band in 0..b {
        for r in 0..h {
            for c in 0..w {
                bytes.extend_from_slice(&cube.data()[(r, c, band)].to_le_bytes());
            }
        }
    }
    std::fs::write(&raw_path, bytes).with_context(|| format!("writing {}", raw_path.display()))?;
    Ok(raw_path)
}

// ---------------------------------------------------------------------------
// Full export
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ExportMetadata<'a> {
    exported_at_unix: u64,
    source: Option<String>,
    /// `[height, width, bands]`.
    dimensions: [usize; 3],
    bands: usize,
    selected_band: usize,
    view_mode: ViewMode,
    orientation: Orientation,
    wavelengths: Option<&'a [f64]>,
    regions: &'a [Region],
    metrics: Option<&'a SegmentationMetrics>,
}

/// Write every artefact the session can produce under `dir`. Returns the
/// written files.
pub fn export_all(session: &mut Session, dir: &Path) -> Result<Vec<PathBuf>> {
    if session.cube().is_none() {
        bail!("No data available to export");
    }
    let plots = dir.join("plots");
    let images = dir.join("images");
    let bands_dir = dir.join("bands");
    for d in [dir, plots.as_path(), images.as_path(), bands_dir.as_path()] {
        std::fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
    }
    let mut written = Vec::new();

    // Signatures
    let region_sigs = session.region_signatures()?;
    let full = session.full_signature()?;
    if !session.regions().is_empty() {
        let p = plots.join("segmented_objects_spectral_signatures.csv");
        write_signatures_csv(&p, &region_sigs, &full)?;
        written.push(p);

        let p = dir.join("bounding_boxes.txt");
        write_bounding_boxes(&p, session.regions().as_slice())?;
        written.push(p);
    }
    let p = plots.join("full_spectral_signature.csv");
    write_full_signature_csv(&p, &full)?;
    written.push(p);

    let cube = session.cube().context("cube disappeared during export")?;
    let mut parquet_rows = region_sigs;
    parquet_rows.push(full);
    let p = plots.join("spectral_signatures.parquet");
    write_signatures_parquet(&p, &parquet_rows, cube.wavelengths.as_deref())?;
    written.push(p);

    // Scene preview, copied as shipped
    if let Some(preview) = cube.preview.as_deref().filter(|p| p.is_file()) {
        let p = images.join("rgb_image.png");
        std::fs::copy(preview, &p)
            .with_context(|| format!("copying {} to {}", preview.display(), p.display()))?;
        written.push(p);
    }

    // Segmentation artefacts
    let orientation = session.config().render.orientation;
    if let Some(seg) = session.segmentation() {
        let save = |img: GrayImage, path: PathBuf, written: &mut Vec<PathBuf>| -> Result<()> {
            orient(img, orientation)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
            Ok(())
        };

        save(mask_image(&seg.combined), images.join("segmentation_mask.png"), &mut written)?;

        let colored = orient(colorize_mask(&seg.combined, session.regions().as_slice()), orientation);
        let p = images.join("colored_mask.png");
        colored.save(&p).with_context(|| format!("writing {}", p.display()))?;
        written.push(p);

        save(
            normalize_nonzero(seg.cube.band(session.band())?),
            images.join("segmented_image.png"),
            &mut written,
        )?;
        for band in 0..seg.cube.bands() {
            save(
                normalize_nonzero(seg.cube.band(band)?),
                bands_dir.join(format!("segmented_band_{band:03}.png")),
                &mut written,
            )?;
        }

        let hdr = dir.join("segmented_cube.hdr");
        let raw = write_envi(&seg.cube, &hdr)?;
        written.push(hdr);
        written.push(raw);
    }

    // Metadata
    let metadata = ExportMetadata {
        exported_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        source: cube.source.as_ref().map(|p| p.display().to_string()),
        dimensions: [cube.height(), cube.width(), cube.bands()],
        bands: cube.bands(),
        selected_band: session.band(),
        view_mode: session.view_mode(),
        orientation,
        wavelengths: cube.wavelengths.as_deref(),
        regions: session.regions().as_slice(),
        metrics: session.segmentation().map(|s| &s.metrics),
    };
    let p = dir.join("metadata.json");
    let json = serde_json::to_string_pretty(&metadata).context("serializing metadata")?;
    std::fs::write(&p, json).with_context(|| format!("writing {}", p.display()))?;
    written.push(p);

    log::info!("exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
