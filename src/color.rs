use image::RgbImage;
use palette::{Hsl, IntoColor, Srgb};

use crate::data::model::{Mask, Region};
use crate::geometry::DataSize;

/// 8-bit RGB triple.
pub type Rgb = [u8; 3];

// ---------------------------------------------------------------------------
// Region colours
// ---------------------------------------------------------------------------

/// Fixed colours handed to the first regions, in creation order.
pub const REGION_COLORS: [Rgb; 14] = [
    [255, 0, 0],     // red
    [255, 165, 0],   // orange
    [0, 255, 0],     // green
    [128, 0, 128],   // purple
    [255, 0, 255],   // magenta
    [0, 255, 255],   // cyan
    [255, 255, 0],   // yellow
    [255, 140, 0],   // dark orange
    [147, 112, 219], // medium purple
    [255, 105, 180], // hot pink
    [255, 120, 100], // light salmon
    [144, 238, 144], // light green
    [255, 182, 193], // light pink
    [0, 0, 0],       // black
];

/// Colour for the `index`-th region ever created.
///
/// The fixed table covers the first regions; later ones get hues spaced by
/// the golden angle so they stay distinguishable from their neighbours.
pub fn region_color(index: usize) -> Rgb {
    if let Some(c) = REGION_COLORS.get(index) {
        return *c;
    }
    let step = index - REGION_COLORS.len();
    let hue = (step as f32 * 137.507_77) % 360.0;
    hsl_to_rgb(hue, 0.75, 0.55)
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Rgb {
    let hsl = Hsl::new(hue, saturation, lightness);
    let rgb: Srgb = hsl.into_color();
    [
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
    ]
}

// ---------------------------------------------------------------------------
// Coloured mask overlay
// ---------------------------------------------------------------------------

/// Paint every masked pixel inside each region's rectangle with the region's
/// colour on a black background. Later regions paint over earlier ones.
pub fn colorize_mask(mask: &Mask, regions: &[Region]) -> RgbImage {
    let (h, w) = mask.dim();
    let size = DataSize {
        width: w,
        height: h,
    };
    let mut out = RgbImage::new(w as u32, h as u32);
    for region in regions {
        let b = region.pixel_bounds(size);
        for r in b.y1..b.y2 {
            for c in b.x1..b.x2 {
                if mask[(r, c)] {
                    out.put_pixel(c as u32, r as u32, image::Rgb(region.color));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_colors_then_generated() {
        assert_eq!(region_color(0), [255, 0, 0]);
        assert_eq!(region_color(13), [0, 0, 0]);
        let a = region_color(14);
        let b = region_color(15);
        assert_ne!(a, b);
    }

    #[test]
    fn colorize_only_paints_inside_regions() {
        let mut mask = Mask::from_elem((6, 6), true);
        mask[(1, 1)] = false;
        let regions = vec![Region::new(0.0, 0.0, 3.0, 3.0, "a", [10, 20, 30])];
        let img = colorize_mask(&mask, &regions);
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(4, 4).0, [0, 0, 0]);
    }
}
