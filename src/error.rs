//! # Error Types
//!
//! This module defines the error type used throughout the catprint library.
//!
//! Only [`ConnectionManager::disconnect`](crate::connection::ConnectionManager::disconnect)
//! swallows errors (teardown is best-effort). Everything else is returned to
//! the caller, which decides whether to abort the active print job.

use thiserror::Error;

/// Result alias for catprint operations
pub type Result<T> = std::result::Result<T, PrinterError>;

/// Main error type for catprint operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Command payload does not fit the single length byte of a frame
    #[error("Command payload too big ({size} > 255)")]
    PayloadTooLarge { size: usize },

    /// A byte sequence is not a well-formed command frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Input stream does not start with the `P4` magic
    #[error("Input is not a PBM (P4) image")]
    NotPbm,

    /// PBM header could not be parsed
    #[error("Invalid PBM header: {0}")]
    InvalidHeader(String),

    /// PBM page width differs from the store's fixed width
    #[error("Unsuitable image width: expected {expected}, got {got}")]
    UnsupportedWidth { expected: usize, got: usize },

    /// PBM body is shorter than its header declares
    #[error("Broken PBM image: expected {expected} bytes, got {got}")]
    TruncatedImage { expected: usize, got: usize },

    /// Printer model is not in the registry
    #[error("Model {0} is not supported yet")]
    UnknownModel(String),

    /// Device address is neither a MAC address nor a platform UUID
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Transport-level errors (connect, write, notify)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Scan yielded nothing when a device was required
    #[error("No available devices found")]
    NoDeviceFound,

    /// A print job is already running on this printer
    #[error("A print session is already in progress")]
    SessionBusy,

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
