//! Canny edge detection on 8-bit images.
//!
//! 3 × 3 Sobel gradients with replicated borders, L1 magnitude, non-maximum
//! suppression along the quantized gradient direction and 8-connected
//! hysteresis between the two thresholds. No smoothing is applied before the
//! gradients.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// tan(22.5°) in 15-bit fixed point.
const TG22: i64 = 13573;
const SHIFT: u32 = 15;

/// Row-major edge map of `image`.
pub fn canny(image: &GrayImage, low: f64, high: f64) -> Vec<bool> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let n = h * w;
    if n == 0 {
        return Vec::new();
    }
    let (low, high) = if low > high { (high, low) } else { (low, high) };

    let dx: Vec<i32> = horizontal_sobel(image).into_raw().into_iter().map(i32::from).collect();
    let dy: Vec<i32> = vertical_sobel(image).into_raw().into_iter().map(i32::from).collect();
    let mag: Vec<i32> = dx.iter().zip(&dy).map(|(x, y)| x.abs() + y.abs()).collect();

    // Magnitude outside the frame is zero.
    let m_at = |r: isize, c: isize| -> i32 {
        if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
            0
        } else {
            mag[r as usize * w + c as usize]
        }
    };

    // 0 = not an edge, 1 = weak candidate, 2 = strong.
    let mut class = vec![0u8; n];
    let mut stack = Vec::new();
    for r in 0..h as isize {
        for c in 0..w as isize {
            let i = r as usize * w + c as usize;
            let m = mag[i];
            if (m as f64) <= low {
                continue;
            }
            let xs = dx[i] as i64;
            let ys = dy[i] as i64;
            let x = xs.abs();
            let y = ys.abs() << SHIFT;
            let tg22x = x * TG22;

            let is_max = if y < tg22x {
                m > m_at(r, c - 1) && m >= m_at(r, c + 1)
            } else {
                let tg67x = tg22x + (x << (SHIFT + 1));
                if y > tg67x {
                    m > m_at(r - 1, c) && m >= m_at(r + 1, c)
                } else {
                    let s: isize = if (xs ^ ys) < 0 { -1 } else { 1 };
                    m > m_at(r - 1, c - s) && m > m_at(r + 1, c + s)
                }
            };
            if !is_max {
                continue;
            }
            if (m as f64) > high {
                class[i] = 2;
                stack.push(i);
            } else {
                class[i] = 1;
            }
        }
    }

    // Hysteresis: grow strong edges through weak candidates.
    while let Some(i) = stack.pop() {
        let (r, c) = ((i / w) as isize, (i % w) as isize);
        for dr in -1..=1isize {
            for dc in -1..=1isize {
                let (rr, cc) = (r + dr, c + dc);
                if rr < 0 || cc < 0 || rr >= h as isize || cc >= w as isize {
                    continue;
                }
                let j = rr as usize * w + cc as usize;
                if class[j] == 1 {
                    class[j] = 2;
                    stack.push(j);
                }
            }
        }
    }

    class.into_iter().map(|v| v == 2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn image(h: u32, w: u32, f: impl Fn(u32, u32) -> u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([f(y, x)]))
    }

    #[test]
    fn flat_image_has_no_edges() {
        let flat = image(16, 16, |_, _| 128);
        assert!(canny(&flat, 100.0, 200.0).iter().all(|&e| !e));
        assert!(canny(&GrayImage::new(0, 0), 100.0, 200.0).is_empty());
    }

    #[test]
    fn vertical_step_gives_single_column() {
        // Left half 0, right half 255.
        let (h, w) = (8, 10);
        let edges = canny(&image(h, w, |_, c| if c >= 5 { 255 } else { 0 }), 100.0, 200.0);
        let w = w as usize;
        for r in 0..h as usize {
            let cols: Vec<usize> = (0..w).filter(|&c| edges[r * w + c]).collect();
            assert_eq!(cols, vec![4], "row {r}");
        }
    }

    #[test]
    fn square_outline_is_detected() {
        let (h, w) = (20, 20);
        let src = image(h, w, |r, c| {
            if (5..15).contains(&r) && (5..15).contains(&c) {
                255
            } else {
                0
            }
        });
        let edges = canny(&src, 100.0, 200.0);
        let count = edges.iter().filter(|&&e| e).count();
        assert!(count > 0);
        // Edges hug the square; nothing far away or deep inside.
        let (h, w) = (h as usize, w as usize);
        for r in 0..h {
            for c in 0..w {
                if edges[r * w + c] {
                    assert!((3..17).contains(&r) && (3..17).contains(&c));
                    assert!(!((7..13).contains(&r) && (7..13).contains(&c)));
                }
            }
        }
    }
}
