use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array3;
use serde::Deserialize;

use super::model::{Cube, Region};
use crate::color::{region_color, Rgb};

/// Extensions accepted as the binary companion of an ENVI header.
const RAW_EXTENSIONS: &[&str] = &["raw", "img", "bil", "bsq", "bip", "dat"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a cube from a file or folder. Dispatch by extension.
///
/// Supported inputs:
/// * folder – searched recursively for the first `.hdr` with raw data; the
///   first `.png` found is kept as the scene preview
/// * `.hdr` – ENVI header next to its binary file
/// * `.raw` / `.img` / `.bil` / `.bsq` / `.bip` / `.dat` – binary file next
///   to its `.hdr`
/// * `.json` – `{ "shape": [h, w, b], "data": [...] }`, row-major
pub fn load_cube(path: &Path) -> Result<Cube> {
    if path.is_dir() {
        let scan = find_cube_in_folder(path)?;
        let cube = load_envi(&scan.header)?;
        return Ok(match scan.preview {
            Some(png) => cube.with_preview(png),
            None => cube,
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "hdr" => load_envi(path),
        "json" => load_json_cube(path),
        e if RAW_EXTENSIONS.contains(&e) => {
            let hdr = path.with_extension("hdr");
            if !hdr.exists() {
                bail!("No ENVI header next to {}", path.display());
            }
            load_envi(&hdr)
        }
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// What a folder scan turned up.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderScan {
    /// ENVI header of the cube to load.
    pub header: PathBuf,
    /// RGB rendering of the scene, if the folder ships one.
    pub preview: Option<PathBuf>,
}

/// First ENVI header under `dir` (depth-first, sorted by name) that has a
/// binary companion, plus the first `.png` in the same walk. Other
/// candidates are logged and ignored.
pub fn find_cube_in_folder(dir: &Path) -> Result<FolderScan> {
    let mut files = Vec::new();
    collect_files(dir, &mut files).with_context(|| format!("scanning {}", dir.display()))?;

    let mut usable = files
        .iter()
        .filter(|p| has_extension(p, "hdr") && find_raw_companion(p).is_some());
    let header = usable
        .next()
        .with_context(|| format!("No ENVI header with raw data found in {}", dir.display()))?
        .clone();
    let others = usable.count();
    if others > 0 {
        log::info!(
            "{others} more cubes in {}, using {}",
            dir.display(),
            header.display()
        );
    }

    let mut pngs = files.iter().filter(|p| has_extension(p, "png"));
    let preview = pngs.next().cloned();
    if let Some(png) = &preview {
        let others = pngs.count();
        if others > 0 {
            log::info!("{others} more PNG files, using {} as preview", png.display());
        }
    }
    Ok(FolderScan { header, preview })
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Every file under `dir`, depth-first with entries sorted by name.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Binary file belonging to an ENVI header: same stem with a raw extension
/// (either case), or the bare stem.
pub fn find_raw_companion(hdr: &Path) -> Option<PathBuf> {
    let stem = hdr.with_extension("");
    RAW_EXTENSIONS
        .iter()
        .flat_map(|e| [e.to_string(), e.to_ascii_uppercase()])
        .map(|e| stem.with_extension(e))
        .chain(std::iter::once(stem.clone()))
        .find(|p| p.is_file())
}

// ---------------------------------------------------------------------------
// ENVI header
// ---------------------------------------------------------------------------

/// Sample encodings of the ENVI `data type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnviDataType {
    U8,
    I16,
    I32,
    F32,
    F64,
    U16,
    U32,
    I64,
    U64,
}

impl EnviDataType {
    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::U8,
            2 => Self::I16,
            3 => Self::I32,
            4 => Self::F32,
            5 => Self::F64,
            12 => Self::U16,
            13 => Self::U32,
            14 => Self::I64,
            15 => Self::U64,
            other => bail!("Unsupported ENVI data type {other}"),
        })
    }

    pub fn code(self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 => 3,
            Self::F32 => 4,
            Self::F64 => 5,
            Self::U16 => 12,
            Self::U32 => 13,
            Self::I64 => 14,
            Self::U64 => 15,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bsq,
    Bil,
    Bip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnviHeader {
    pub samples: usize,
    pub lines: usize,
    pub bands: usize,
    pub header_offset: usize,
    pub data_type: EnviDataType,
    pub interleave: Interleave,
    pub byte_order: ByteOrder,
    pub wavelengths: Option<Vec<f64>>,
}

impl EnviHeader {
    /// Offset of sample `(line, sample, band)` in elements.
    fn index(&self, line: usize, sample: usize, band: usize) -> usize {
        match self.interleave {
            Interleave::Bsq => (band * self.lines + line) * self.samples + sample,
            Interleave::Bil => (line * self.bands + band) * self.samples + sample,
            Interleave::Bip => (line * self.samples + sample) * self.bands + band,
        }
    }
}

/// Parse the text of an ENVI header.
pub fn parse_header(text: &str) -> Result<EnviHeader> {
    let fields = header_fields(text)?;

    let int = |key: &str| -> Result<usize> {
        let v = fields
            .get(key)
            .with_context(|| format!("ENVI header missing '{key}'"))?;
        v.parse::<usize>()
            .with_context(|| format!("ENVI header '{key}' = '{v}' is not an integer"))
    };

    let header_offset = match fields.get("header offset") {
        Some(v) => v
            .parse()
            .with_context(|| format!("bad header offset '{v}'"))?,
        None => 0,
    };
    let data_type = EnviDataType::from_code(int("data type")? as u32)?;
    let interleave = match fields.get("interleave").map(|s| s.to_ascii_lowercase()) {
        None => Interleave::Bsq,
        Some(s) => match s.as_str() {
            "bsq" => Interleave::Bsq,
            "bil" => Interleave::Bil,
            "bip" => Interleave::Bip,
            other => bail!("Unsupported interleave '{other}'"),
        },
    };
    let byte_order = match fields.get("byte order").map(String::as_str) {
        None | Some("0") => ByteOrder::Little,
        Some("1") => ByteOrder::Big,
        Some(other) => bail!("Unsupported byte order '{other}'"),
    };
    let wavelengths = match fields.get("wavelength") {
        Some(list) => Some(
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| {
                    t.parse::<f64>()
                        .with_context(|| format!("wavelength '{t}' is not a number"))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };

    Ok(EnviHeader {
        samples: int("samples")?,
        lines: int("lines")?,
        bands: int("bands")?,
        header_offset,
        data_type,
        interleave,
        byte_order,
        wavelengths,
    })
}

/// `key = value` pairs with lowercase keys. Braced values may span lines;
/// the braces are stripped.
fn header_fields(text: &str) -> Result<BTreeMap<String, String>> {
    let mut lines = text.lines();
    match lines.next().map(str::trim) {
        Some("ENVI") => {}
        _ => bail!("Not an ENVI header (missing 'ENVI' magic)"),
    }

    let mut fields = BTreeMap::new();
    let mut pending: Option<(String, String)> = None;
    for line in lines {
        if let Some((key, mut value)) = pending.take() {
            value.push(' ');
            value.push_str(line.trim());
            if value.contains('}') {
                fields.insert(key, strip_braces(&value));
            } else {
                pending = Some((key, value));
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        if value.starts_with('{') && !value.contains('}') {
            pending = Some((key, value));
        } else {
            fields.insert(key, strip_braces(&value));
        }
    }
    if let Some((key, _)) = pending {
        bail!("Unterminated '{{' in ENVI field '{key}'");
    }
    Ok(fields)
}

fn strip_braces(v: &str) -> String {
    v.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// ENVI loader
// ---------------------------------------------------------------------------

/// Load an ENVI cube from its header path.
pub fn load_envi(hdr: &Path) -> Result<Cube> {
    let text = std::fs::read_to_string(hdr)
        .with_context(|| format!("reading ENVI header {}", hdr.display()))?;
    let header = parse_header(&text).with_context(|| format!("parsing {}", hdr.display()))?;
    let raw_path = find_raw_companion(hdr)
        .with_context(|| format!("No raw data file next to {}", hdr.display()))?;
    let bytes = std::fs::read(&raw_path)
        .with_context(|| format!("reading {}", raw_path.display()))?;

    log::info!(
        "ENVI {}: {}x{}x{} {:?} {:?}",
        raw_path.display(),
        header.lines,
        header.samples,
        header.bands,
        header.data_type,
        header.interleave
    );

    let data = decode_envi(&header, &bytes)?;
    let mut cube = Cube::new(data)?.with_source(raw_path);
    if let Some(wl) = header.wavelengths {
        cube = cube.with_wavelengths(wl);
    }
    Ok(cube)
}

/// Decode the binary payload into a (lines, samples, bands) array.
pub fn decode_envi(header: &EnviHeader, bytes: &[u8]) -> Result<Array3<f32>> {
    let size = header.data_type.size();
    let needed = header
        .lines
        .checked_mul(header.samples)
        .and_then(|n| n.checked_mul(header.bands))
        .and_then(|n| n.checked_mul(size))
        .and_then(|n| n.checked_add(header.header_offset));
    let Some(needed) = needed else {
        bail!(
            "header describes {}x{}x{} samples, more than can be addressed",
            header.lines,
            header.samples,
            header.bands
        );
    };
    if bytes.len() < needed {
        bail!(
            "raw file holds {} bytes, header describes {needed}",
            bytes.len()
        );
    }
    if bytes.len() > needed {
        log::warn!("raw file has {} trailing bytes", bytes.len() - needed);
    }
    let payload = &bytes[header.header_offset..needed];

    Ok(Array3::from_shape_fn(
        (header.lines, header.samples, header.bands),
        |(l, s, b)| {
            let at = header.index(l, s, b) * size;
            read_sample(&payload[at..at + size], header.data_type, header.byte_order)
        },
    ))
}

fn read_sample(chunk: &[u8], data_type: EnviDataType, order: ByteOrder) -> f32 {
    macro_rules! num {
        ($t:ty, $n:expr) => {{
            let a: [u8; $n] = std::array::from_fn(|i| chunk[i]);
            (match order {
                ByteOrder::Little => <$t>::from_le_bytes(a),
                ByteOrder::Big => <$t>::from_be_bytes(a),
            }) as f32
        }};
    }
    match data_type {
        EnviDataType::U8 => chunk[0] as f32,
        EnviDataType::I16 => num!(i16, 2),
        EnviDataType::U16 => num!(u16, 2),
        EnviDataType::I32 => num!(i32, 4),
        EnviDataType::U32 => num!(u32, 4),
        EnviDataType::F32 => num!(f32, 4),
        EnviDataType::F64 => num!(f64, 8),
        EnviDataType::I64 => num!(i64, 8),
        EnviDataType::U64 => num!(u64, 8),
    }
}

// ---------------------------------------------------------------------------
// JSON cube
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonCube {
    shape: [usize; 3],
    data: Vec<f32>,
    #[serde(default)]
    wavelengths: Option<Vec<f64>>,
}

/// Small cubes for tests and demos:
///
/// ```json
/// { "shape": [2, 3, 4], "data": [ ...24 values, band fastest... ] }
/// ```
fn load_json_cube(path: &Path) -> Result<Cube> {
    let text = std::fs::read_to_string(path).context("reading JSON cube")?;
    let parsed: JsonCube = serde_json::from_str(&text).context("parsing JSON cube")?;
    let [h, w, b] = parsed.shape;
    let count = h.checked_mul(w).and_then(|n| n.checked_mul(b));
    if count != Some(parsed.data.len()) {
        bail!(
            "shape {h}x{w}x{b} does not match {} values",
            parsed.data.len()
        );
    }
    let data = Array3::from_shape_vec((h, w, b), parsed.data).context("shaping JSON cube")?;
    let mut cube = Cube::new(data)?.with_source(path.to_path_buf());
    if let Some(wl) = parsed.wavelengths {
        cube = cube.with_wavelengths(wl);
    }
    Ok(cube)
}

// ---------------------------------------------------------------------------
// Regions file
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RegionRecord {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    color: Option<Rgb>,
}

/// Load regions from a JSON array of `{x, y, width, height[, label, color]}`
/// records. Missing labels become `Object N` and missing colours come from
/// the region palette, both by position in the file.
pub fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading regions {}", path.display()))?;
    let records: Vec<RegionRecord> = serde_json::from_str(&text).context("parsing regions JSON")?;
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            Region::new(
                r.x,
                r.y,
                r.width,
                r.height,
                r.label.unwrap_or_else(|| format!("Object {}", i + 1)),
                r.color.unwrap_or_else(|| region_color(i)),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ENVI\n\
        description = {synthetic\n  cube}\n\
        samples = 3\n\
        lines = 2\n\
        bands = 2\n\
        header offset = 0\n\
        data type = 4\n\
        interleave = bsq\n\
        byte order = 0\n\
        wavelength = {\n 450.0, 550.5\n}\n";

    #[test]
    fn parses_header_fields() {
        let h = parse_header(HEADER).unwrap();
        assert_eq!((h.lines, h.samples, h.bands), (2, 3, 2));
        assert_eq!(h.data_type, EnviDataType::F32);
        assert_eq!(h.interleave, Interleave::Bsq);
        assert_eq!(h.byte_order, ByteOrder::Little);
        assert_eq!(h.wavelengths, Some(vec![450.0, 550.5]));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(parse_header("samples = 3").is_err());
        assert!(parse_header("ENVI\nsamples = 3\nlines = 2\nbands = 1\ndata type = 6\n").is_err());
        assert!(parse_header("ENVI\nlines = 2\nbands = 1\ndata type = 4\n").is_err());
    }

    /// Encode `value(l, s, b)` as big-endian u16 in the given interleave.
    fn encode(h: &EnviHeader, value: impl Fn(usize, usize, usize) -> u16) -> Vec<u8> {
        let mut out = vec![0u8; h.header_offset + h.lines * h.samples * h.bands * 2];
        for l in 0..h.lines {
            for s in 0..h.samples {
                for b in 0..h.bands {
                    let at = h.header_offset + h.index(l, s, b) * 2;
                    out[at..at + 2].copy_from_slice(&value(l, s, b).to_be_bytes());
                }
            }
        }
        out
    }

    #[test]
    fn all_interleaves_decode_to_the_same_cube() {
        let value = |l: usize, s: usize, b: usize| (l * 100 + s * 10 + b) as u16;
        let mut cubes = Vec::new();
        for interleave in [Interleave::Bsq, Interleave::Bil, Interleave::Bip] {
            let h = EnviHeader {
                samples: 4,
                lines: 3,
                bands: 5,
                header_offset: 7,
                data_type: EnviDataType::U16,
                interleave,
                byte_order: ByteOrder::Big,
                wavelengths: None,
            };
            cubes.push(decode_envi(&h, &encode(&h, value)).unwrap());
        }
        assert_eq!(cubes[0], cubes[1]);
        assert_eq!(cubes[1], cubes[2]);
        assert_eq!(cubes[0][(2, 3, 4)], 234.0);
    }

    #[test]
    fn short_payload_is_an_error() {
        let h = parse_header(HEADER).unwrap();
        assert!(decode_envi(&h, &[0u8; 10]).is_err());
    }

    #[test]
    fn oversized_header_is_an_error() {
        let h = parse_header("ENVI\nsamples = 4294967296\nlines = 4294967296\nbands = 1\ndata type = 1\n")
            .unwrap();
        let err = decode_envi(&h, &[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("more than can be addressed"));

        let h = parse_header("ENVI\nsamples = 65536\nlines = 65536\nbands = 65536\ndata type = 5\n").unwrap();
        assert!(decode_envi(&h, &[0u8; 16]).is_err());
    }

    #[test]
    fn loads_envi_pair_and_discovers_folder() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("scan");
        std::fs::create_dir(&sub).unwrap();
        // A header without data is skipped by discovery.
        std::fs::write(dir.path().join("a_orphan.hdr"), HEADER).unwrap();
        std::fs::write(sub.join("cube.hdr"), HEADER).unwrap();
        let payload: Vec<u8> = (0..12).flat_map(|i| (i as f32).to_le_bytes()).collect();
        std::fs::write(sub.join("cube.RAW"), payload).unwrap();
        std::fs::write(sub.join("rgb.png"), b"png").unwrap();
        std::fs::write(sub.join("thumb.png"), b"png").unwrap();

        let found = find_cube_in_folder(dir.path()).unwrap();
        assert_eq!(found.header, sub.join("cube.hdr"));
        assert_eq!(found.preview, Some(sub.join("rgb.png")));

        let cube = load_cube(dir.path()).unwrap();
        assert_eq!(cube.preview, Some(sub.join("rgb.png")));
        assert_eq!((cube.height(), cube.width(), cube.bands()), (2, 3, 2));
        // BSQ: band 1 starts after 6 samples.
        assert_eq!(cube.data()[(0, 0, 1)], 6.0);
        assert_eq!(cube.data()[(1, 2, 0)], 5.0);
        assert_eq!(cube.wavelengths, Some(vec![450.0, 550.5]));
    }

    #[test]
    fn loads_json_cube_and_regions() {
        let dir = tempfile::tempdir().unwrap();
        let cube_path = dir.path().join("cube.json");
        std::fs::write(&cube_path, r#"{"shape": [1, 2, 2], "data": [1, 2, 3, 4]}"#).unwrap();
        let cube = load_cube(&cube_path).unwrap();
        assert_eq!(cube.data()[(0, 1, 0)], 3.0);

        std::fs::write(&cube_path, r#"{"shape": [1, 2, 2], "data": [1, 2, 3]}"#).unwrap();
        assert!(load_cube(&cube_path).is_err());
        let huge = format!(r#"{{"shape": [{0}, {0}, 2], "data": [1]}}"#, usize::MAX);
        std::fs::write(&cube_path, huge).unwrap();
        assert!(load_cube(&cube_path).is_err());

        let regions_path = dir.path().join("regions.json");
        std::fs::write(
            &regions_path,
            r#"[{"x": 1, "y": 2, "width": 3, "height": 4},
                {"x": 0, "y": 0, "width": 1, "height": 1, "label": "leaf", "color": [1, 2, 3]}]"#,
        )
        .unwrap();
        let regions = load_regions(&regions_path).unwrap();
        assert_eq!(regions[0].label, "Object 1");
        assert_eq!(regions[0].color, region_color(0));
        assert_eq!(regions[1].label, "leaf");
        assert_eq!(regions[1].color, [1, 2, 3]);
    }

    #[test]
    fn unsupported_extension() {
        assert!(load_cube(Path::new("cube.tiff")).is_err());
    }
}
