use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::Array3;

use rusty_hyperseg::color::region_color;
use rusty_hyperseg::data::model::{Cube, Region};
use rusty_hyperseg::export::write_envi;

const LINES: usize = 96;
const SAMPLES: usize = 128;
const BANDS: usize = 60;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Reflectance of one material at `wl` nm: a flat baseline plus absorption /
/// reflectance peaks.
fn reflectance(wl: f64, baseline: f64, peaks: &[(f64, f64, f64)]) -> f64 {
    baseline
        + peaks
            .iter()
            .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
            .sum::<f64>()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// A material placed in the scene.
struct Object {
    label: &'static str,
    shape: Shape,
    baseline: f64,
    peaks: Vec<(f64, f64, f64)>,
}

enum Shape {
    Disk { cx: f64, cy: f64, r: f64 },
    Rect { x: f64, y: f64, w: f64, h: f64 },
}

impl Shape {
    fn contains(&self, col: f64, row: f64) -> bool {
        match *self {
            Shape::Disk { cx, cy, r } => (col - cx).powi(2) + (row - cy).powi(2) <= r * r,
            Shape::Rect { x, y, w, h } => col >= x && col < x + w && row >= y && row < y + h,
        }
    }

    /// Loose bounding box, the way a user would drag it.
    fn prompt(&self, margin: f64) -> (f64, f64, f64, f64) {
        match *self {
            Shape::Disk { cx, cy, r } => (cx - r - margin, cy - r - margin, 2.0 * (r + margin), 2.0 * (r + margin)),
            Shape::Rect { x, y, w, h } => (x - margin, y - margin, w + 2.0 * margin, h + 2.0 * margin),
        }
    }
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_cube"));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // 400 → 990 nm, step 10
    let wavelengths: Vec<f64> = (0..BANDS).map(|i| 400.0 + i as f64 * 10.0).collect();

    let objects = [
        Object {
            label: "Leaf",
            shape: Shape::Disk { cx: 32.0, cy: 30.0, r: 16.0 },
            baseline: 0.05,
            peaks: vec![(550.0, 30.0, 0.15), (850.0, 90.0, 0.55)],
        },
        Object {
            label: "Plastic",
            shape: Shape::Rect { x: 72.0, y: 14.0, w: 36.0, h: 24.0 },
            baseline: 0.45,
            peaks: vec![(480.0, 40.0, 0.2)],
        },
        Object {
            label: "Soil",
            shape: Shape::Disk { cx: 60.0, cy: 70.0, r: 18.0 },
            baseline: 0.12,
            peaks: vec![(700.0, 150.0, 0.25)],
        },
    ];

    let mut data = Array3::<f32>::zeros((LINES, SAMPLES, BANDS));
    for row in 0..LINES {
        for col in 0..SAMPLES {
            let (c, r) = (col as f64 + 0.5, row as f64 + 0.5);
            let object = objects.iter().find(|o| o.shape.contains(c, r));
            for (b, &wl) in wavelengths.iter().enumerate() {
                let clean = match object {
                    Some(o) => reflectance(wl, o.baseline, &o.peaks),
                    None => 0.02,
                };
                let noisy = clean + rng.gauss(0.0, 0.004);
                data[(row, col, b)] = noisy.max(0.0) as f32;
            }
        }
    }

    let cube = Cube::new(data)?.with_wavelengths(wavelengths);
    let hdr = out_dir.join("sample.hdr");
    let raw = write_envi(&cube, &hdr)?;

    let regions: Vec<Region> = objects
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let (x, y, w, h) = o.shape.prompt(3.0);
            Region::new(x, y, w, h, o.label, region_color(i))
        })
        .collect();
    let regions_path = out_dir.join("regions.json");
    let json = serde_json::to_string_pretty(&regions)?;
    std::fs::write(&regions_path, json).with_context(|| format!("writing {}", regions_path.display()))?;

    println!(
        "Wrote {LINES}x{SAMPLES}x{BANDS} cube to {} (+ {}) and {} regions to {}",
        hdr.display(),
        raw.display(),
        regions.len(),
        regions_path.display()
    );
    Ok(())
}
