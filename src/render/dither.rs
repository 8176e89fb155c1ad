//! # Dithering
//!
//! Turns a grayscale intensity buffer (0.0 = white, 1.0 = black) into packed
//! 1-bit rows in PBM order (MSB = leftmost pixel, 1 = black), ready to be
//! written into a [`BitmapStore`](crate::bitmap::BitmapStore).
//!
//! | Algorithm | Look on thermal paper | Rows in parallel |
//! |-----------|-----------------------|------------------|
//! | `Bayer` | regular halftone screen | yes |
//! | `FloydSteinberg` | fine noise, best for photos | no |
//! | `Atkinson` | high contrast, loses some shadow detail | no |
//! | `None` | hard 50% threshold | yes |
//!
//! ```
//! use catprint::render::dither::{dither, DitheringAlgorithm};
//!
//! let intensity = vec![1.0f32; 16 * 2];
//! let rows = dither(&intensity, 16, 2, DitheringAlgorithm::Bayer);
//! assert_eq!(rows, vec![0xFF; 4]);
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bayer 8x8 threshold matrix, values 0-63.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitheringAlgorithm {
    #[default]
    Bayer,
    FloydSteinberg,
    Atkinson,
    /// Plain threshold at 50%
    None,
}

impl std::str::FromStr for DitheringAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bayer" => Ok(Self::Bayer),
            "floyd-steinberg" | "floyd_steinberg" | "fs" => Ok(Self::FloydSteinberg),
            "atkinson" => Ok(Self::Atkinson),
            "none" | "threshold" => Ok(Self::None),
            other => Err(format!("unknown dithering algorithm '{}'", other)),
        }
    }
}

/// Threshold in (0, 1) for pixel `(x, y)`.
///
/// The +0.5 keeps full black always printing and full white never printing.
#[inline]
pub fn threshold(x: usize, y: usize) -> f32 {
    (BAYER8[y & 7][x & 7] as f32 + 0.5) / 64.0
}

#[inline]
pub fn should_print(x: usize, y: usize, intensity: f32) -> bool {
    intensity > threshold(x, y)
}

/// Pack booleans (true = black) into bytes, MSB first, zero padded.
///
/// ```
/// use catprint::render::dither::pack_row;
///
/// assert_eq!(pack_row(&[true; 12]), vec![0xFF, 0xF0]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; pixels.len().div_ceil(8)];
    for (i, _) in pixels.iter().enumerate().filter(|(_, p)| **p) {
        bytes[i / 8] |= 0x80 >> (i % 8);
    }
    bytes
}

/// Dither `intensity` (row-major, `width * height` values) into packed rows
/// of `width.div_ceil(8)` bytes each.
///
/// Panics if `intensity` holds fewer than `width * height` values.
pub fn dither(
    intensity: &[f32],
    width: usize,
    height: usize,
    algorithm: DitheringAlgorithm,
) -> Vec<u8> {
    assert!(intensity.len() >= width * height, "intensity buffer too small");
    let row_bytes = width.div_ceil(8);
    let mut out = vec![0u8; row_bytes * height];
    if width == 0 || height == 0 {
        return out;
    }

    match algorithm {
        DitheringAlgorithm::Bayer => {
            dither_ordered(intensity, width, &mut out, row_bytes, |x, y, v| should_print(x, y, v))
        }
        DitheringAlgorithm::None => {
            dither_ordered(intensity, width, &mut out, row_bytes, |_, _, v| v > 0.5)
        }
        DitheringAlgorithm::FloydSteinberg => {
            diffuse(intensity, width, height, &mut out, FLOYD_STEINBERG, 16.0)
        }
        DitheringAlgorithm::Atkinson => diffuse(intensity, width, height, &mut out, ATKINSON, 8.0),
    }
    out
}

fn dither_ordered<F>(intensity: &[f32], width: usize, out: &mut [u8], row_bytes: usize, print: F)
where
    F: Fn(usize, usize, f32) -> bool + Sync,
{
    out.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let line = &intensity[y * width..(y + 1) * width];
            for (x, &value) in line.iter().enumerate() {
                if print(x, y, value) {
                    row[x / 8] |= 0x80 >> (x % 8);
                }
            }
        });
}

/// `(dx, dy, weight)` taps of an error diffusion kernel.
type Kernel = &'static [(isize, usize, f32)];

const FLOYD_STEINBERG: Kernel = &[(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

// Atkinson only spreads 6/8 of the error
const ATKINSON: Kernel = &[
    (1, 0, 1.0),
    (2, 0, 1.0),
    (-1, 1, 1.0),
    (0, 1, 1.0),
    (1, 1, 1.0),
    (0, 2, 1.0),
];

fn diffuse(
    intensity: &[f32],
    width: usize,
    height: usize,
    out: &mut [u8],
    kernel: Kernel,
    divisor: f32,
) {
    let row_bytes = width.div_ceil(8);
    let mut work = intensity[..width * height].to_vec();

    for y in 0..height {
        for x in 0..width {
            let value = work[y * width + x];
            let black = value > 0.5;
            if black {
                out[y * row_bytes + x / 8] |= 0x80 >> (x % 8);
            }
            let error = value - if black { 1.0 } else { 0.0 };

            for &(dx, dy, weight) in kernel {
                let nx = x as isize + dx;
                let ny = y + dy;
                if nx < 0 || nx as usize >= width || ny >= height {
                    continue;
                }
                work[ny * width + nx as usize] += error * weight / divisor;
            }
        }
    }
}
