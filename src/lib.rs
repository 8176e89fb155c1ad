//! # catprint - BLE Cat Printer Driver
//!
//! catprint drives the cheap Bluetooth thermal printers sold as GB01, GB03,
//! MX06 and friends ("cat printers"). It provides:
//!
//! - **Protocol implementation**: `0x51 0x78` framed commands with CRC-8
//! - **Bitmap store**: bounded 1-bit image buffer with PBM import/export
//! - **Flow control**: pause/resume notifications gate chunked writes
//! - **Transport**: Bluetooth Low Energy via btleplug, plus an in-memory mock
//! - **Rendering**: dithering of ordinary images to the paper width
//!
//! ## Quick Start
//!
//! ```no_run
//! use catprint::{PrintConfig, Printer, transport::BleTransport};
//!
//! # async fn example() -> catprint::error::Result<()> {
//! let transport = BleTransport::new().await?;
//! let printer = Printer::new(transport, PrintConfig::default().with_identifier("GB01"));
//!
//! let pbm = std::fs::read("label.pbm")?;
//! let report = printer.print_pbm(&pbm[..]).await?;
//! println!("printed {} rows on {}", report.rows, report.model);
//!
//! printer.unload().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Command framing, checksums, bit transforms |
//! | [`bitmap`] | Ring-buffer bitmap store and PBM codec |
//! | [`printer`] | Model table and job configuration |
//! | [`transport`] | BLE and mock transports |
//! | [`connection`] | Scanning, connecting, flow-control listener |
//! | [`transmit`] | Chunked, pause-aware writer |
//! | [`session`] | Print job state machine and [`Printer`] facade |
//! | [`render`] | Image dithering and previews |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! `GB01`, `GB02`, `GB03`, `GT01`, `MX05`, `MX06`, `MX08`, `MX09`, `MX10` and
//! `YT01`, all 384 dots wide. Devices advertising an unknown name are driven
//! with a generic 384-dot profile.

pub mod bitmap;
pub mod connection;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transmit;
pub mod transport;

// Re-exports for convenience
pub use bitmap::BitmapStore;
pub use connection::{ConnectionManager, FlowControl};
pub use error::PrinterError;
pub use printer::{Model, ModelRegistry, PrintConfig};
pub use session::{PrintReport, PrintSession, Printer};
