use std::path::Path;

use anyhow::{Context, Result};

use rusty_hyperseg::config::EngineConfig;
use rusty_hyperseg::data::loader::{load_cube, load_regions};
use rusty_hyperseg::export::{self, write_signatures_csv, write_signatures_parquet};
use rusty_hyperseg::segment::OtsuBoxSegmenter;
use rusty_hyperseg::state::Session;

use crate::Commands;

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub fn run(command: Commands, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let mut session = Session::new(config);

    match command {
        Commands::Info { input } => info(&mut session, &input),
        Commands::Render {
            input,
            band,
            regions,
            out,
        } => render(&mut session, &input, band, regions.as_deref(), &out),
        Commands::Signatures {
            input,
            regions,
            out,
            parquet,
        } => signatures(&mut session, &input, &regions, &out, parquet.as_deref()),
        Commands::Segment {
            input,
            regions,
            band,
            out,
        } => segment(&mut session, &input, &regions, band, out.as_deref()),
        Commands::Export {
            input,
            regions,
            band,
            out,
            no_segment,
        } => export_cmd(&mut session, &input, regions.as_deref(), band, &out, no_segment),
    }
}

/// Load the cube and, optionally, the regions into the session.
fn open(session: &mut Session, input: &Path, regions: Option<&Path>) -> Result<()> {
    let cube = load_cube(input).with_context(|| format!("loading {}", input.display()))?;
    session.load_cube(cube);
    if let Some(path) = regions {
        for region in load_regions(path)? {
            session.add_region(region)?;
        }
        log::info!("{} regions from {}", session.regions().len(), path.display());
    }
    Ok(())
}

fn run_segmenter(session: &mut Session, band: usize) -> Result<()> {
    session.set_band(band)?;
    let mut segmenter = OtsuBoxSegmenter::new();
    session.segment(&mut segmenter)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn info(session: &mut Session, input: &Path) -> Result<()> {
    open(session, input, None)?;
    let full = session.full_signature()?;
    let cube = session.cube().context("no cube")?;

    println!("source:     {}", input.display());
    println!("lines:      {}", cube.height());
    println!("samples:    {}", cube.width());
    println!("bands:      {}", cube.bands());
    match &cube.wavelengths {
        Some(wl) if !wl.is_empty() => {
            println!("wavelength: {:.2} .. {:.2}", wl[0], wl[wl.len() - 1]);
        }
        _ => println!("wavelength: none"),
    }
    if let Some(stats) = full.stats() {
        println!(
            "mean reflectance: min {:.6}, max {:.6}, mean {:.6}",
            stats.min, stats.max, stats.mean
        );
    }
    Ok(())
}

fn render(session: &mut Session, input: &Path, band: usize, regions: Option<&Path>, out: &Path) -> Result<()> {
    open(session, input, regions)?;
    if regions.is_some() {
        run_segmenter(session, band)?;
    } else {
        session.set_band(band)?;
    }
    let image = session.render_current()?;
    image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    log::info!("band {band} ({:?}) written to {}", session.view_mode(), out.display());
    Ok(())
}

fn signatures(
    session: &mut Session,
    input: &Path,
    regions: &Path,
    out: &Path,
    parquet: Option<&Path>,
) -> Result<()> {
    open(session, input, Some(regions))?;
    let sigs = session.region_signatures()?;
    let full = session.full_signature()?;
    for sig in &sigs {
        if let Some(s) = sig.stats() {
            log::info!(
                "{}: {} px, min {:.6}, max {:.6}, mean {:.6}",
                sig.label,
                sig.pixels,
                s.min,
                s.max,
                s.mean
            );
        }
    }
    write_signatures_csv(out, &sigs, &full)?;

    if let Some(path) = parquet {
        let mut rows = sigs;
        rows.push(full);
        let wavelengths = session.cube().and_then(|c| c.wavelengths.as_deref());
        write_signatures_parquet(path, &rows, wavelengths)?;
    }
    Ok(())
}

fn segment(session: &mut Session, input: &Path, regions: &Path, band: usize, out: Option<&Path>) -> Result<()> {
    open(session, input, Some(regions))?;
    run_segmenter(session, band)?;
    let metrics = &session.segmentation().context("no segmentation")?.metrics;
    let json = serde_json::to_string_pretty(metrics)?;
    match out {
        Some(path) => std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn export_cmd(
    session: &mut Session,
    input: &Path,
    regions: Option<&Path>,
    band: usize,
    out: &Path,
    no_segment: bool,
) -> Result<()> {
    open(session, input, regions)?;
    if !no_segment && !session.regions().is_empty() {
        run_segmenter(session, band)?;
    } else {
        session.set_band(band)?;
    }
    let files = export::export_all(session, out)?;
    println!("{} files written to {}", files.len(), out.display());
    Ok(())
}
