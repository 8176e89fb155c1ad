//! # Raster Images
//!
//! Bridges ordinary image files and [`BitmapStore`]. Any format the `image`
//! crate decodes can be scaled to the paper width, dithered and printed. The
//! reverse direction renders a store to PNG for previews.

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma, imageops::FilterType};
use tracing::debug;

use super::dither::{DitheringAlgorithm, dither};
use crate::bitmap::BitmapStore;
use crate::error::{PrinterError, Result};

/// Decode an image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    image::open(path)
        .map_err(|e| PrinterError::Image(format!("Failed to open {}: {}", path.display(), e)))
}

/// Height after scaling to `width`, keeping the aspect ratio.
pub fn scaled_height(image: &DynamicImage, width: usize) -> usize {
    if image.width() == 0 {
        return 0;
    }
    let height = image.height() as f64 * width as f64 / image.width() as f64;
    (height.round() as usize).max(1)
}

/// Resize to `width` x `height` and convert to intensity (0.0 = white,
/// 1.0 = black). Transparent pixels count as white paper.
pub fn image_to_intensity(image: &DynamicImage, width: usize, height: usize) -> Vec<f32> {
    let resized = image.resize_exact(width as u32, height as u32, FilterType::Lanczos3);
    resized
        .to_luma_alpha8()
        .pixels()
        .map(|p| (1.0 - p[0] as f32 / 255.0) * (p[1] as f32 / 255.0))
        .collect()
}

/// Scale `image` to `paper_width`, dither it, and load it into a new store
/// as one page.
pub fn image_to_store(
    image: &DynamicImage,
    paper_width: usize,
    algorithm: DitheringAlgorithm,
) -> Result<BitmapStore> {
    let mut store = BitmapStore::new(paper_width)?;
    let height = scaled_height(image, paper_width);
    let intensity = image_to_intensity(image, paper_width, height);
    let rows = dither(&intensity, paper_width, height, algorithm);
    store.write(&rows);
    store.push_page(height);
    debug!(
        width = paper_width,
        height,
        ?algorithm,
        "image dithered"
    );
    Ok(store)
}

/// Render the stored bitmap as a grayscale image, black on white.
pub fn store_to_image(store: &BitmapStore) -> GrayImage {
    let width = store.width();
    let height = store.height();
    let row_bytes = store.data_width();
    let data = store.as_bytes();

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let black = data
            .get(y * row_bytes + x / 8)
            .is_some_and(|byte| byte & (0x80 >> (x % 8)) != 0);
        Luma([if black { 0 } else { 255 }])
    })
}

/// Save a PNG preview of the store.
pub fn save_png<P: AsRef<Path>>(store: &BitmapStore, path: P) -> Result<()> {
    let path = path.as_ref();
    store_to_image(store)
        .save(path)
        .map_err(|e| PrinterError::Image(format!("Failed to save PNG: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn split_image() -> DynamicImage {
        // Left half black, right half white
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 32, |x, _| {
            if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        }))
    }

    #[test]
    fn test_scaled_height_keeps_aspect() {
        assert_eq!(scaled_height(&split_image(), 384), 192);
        assert_eq!(scaled_height(&split_image(), 32), 16);
    }

    #[test]
    fn test_transparent_is_white() {
        let image = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(
            8,
            8,
            LumaA([0u8, 0u8]),
        ));
        let intensity = image_to_intensity(&image, 8, 8);
        assert!(intensity.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_image_to_store() {
        let store = image_to_store(&split_image(), 64, DitheringAlgorithm::None).unwrap();
        assert_eq!(store.width(), 64);
        assert_eq!(store.height(), 32);
        assert_eq!(store.pages().iter().copied().collect::<Vec<_>>(), vec![32]);

        let row = store.read_all(8).next().unwrap();
        assert_eq!(row[0], 0xFF);
        assert_eq!(row[7], 0x00);
    }

    #[test]
    fn test_store_to_image() {
        let mut store = BitmapStore::new(8).unwrap();
        store.write(&[0b1000_0001, 0x00]);
        let image = store_to_image(&store);
        assert_eq!(image.dimensions(), (8, 2));
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(1, 0)[0], 255);
        assert_eq!(image.get_pixel(7, 0)[0], 0);
        assert_eq!(image.get_pixel(0, 1)[0], 255);
    }
}
