//! # Rendering Module
//!
//! Converts ordinary images into printable bitmaps and back.
//!
//! ## Modules
//!
//! - [`dither`]: Bayer, error diffusion and threshold dithering
//! - [`image`]: image decoding, scaling to paper width, PNG previews
//!
//! ## Usage Example
//!
//! ```no_run
//! use catprint::render::{dither::DitheringAlgorithm, image};
//!
//! let photo = image::load_image("cat.jpg")?;
//! let store = image::image_to_store(&photo, 384, DitheringAlgorithm::FloydSteinberg)?;
//! image::save_png(&store, "preview.png")?;
//! # Ok::<(), catprint::PrinterError>(())
//! ```

pub mod dither;
pub mod image;
