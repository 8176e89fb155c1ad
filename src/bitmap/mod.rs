//! # Bitmap Storage
//!
//! - [`store`]: the capacity-bounded [`BitmapStore`]
//! - [`pbm`]: PBM (`P4`) import and export for the store

pub mod pbm;
pub mod store;

pub use store::{BitmapStore, DEFAULT_MAX_SIZE};
