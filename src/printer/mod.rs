//! # Printer Module
//!
//! This module provides printer-specific configurations.
//!
//! ## Modules
//!
//! - [`model`]: Model capability table
//! - [`config`]: Job and link settings

pub mod config;
pub mod model;

pub use config::PrintConfig;
pub use model::{Model, ModelRegistry};
