//! # Printer Transport Layer
//!
//! The driver only needs four things from the link to a printer: discovery,
//! connect/disconnect, writes to the command characteristic, and a stream of
//! notifications from the notify characteristic. [`Transport`] captures
//! exactly that.
//!
//! ## Available Transports
//!
//! - [`ble`]: Bluetooth Low Energy via btleplug (`ble` feature, on by default)
//! - [`mock`]: in-memory transport that records writes, for tests
//!
//! All methods take `&self` so one transport can be shared between the
//! connection manager and the transmission controller.

#[cfg(feature = "ble")]
pub mod ble;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;

#[cfg(feature = "ble")]
pub use ble::BleTransport;
pub use mock::MockTransport;

/// Characteristic the driver writes commands to.
pub const TX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ae01_0000_1000_8000_00805f9b34fb);

/// Characteristic the printer sends notifications on.
pub const RX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ae02_0000_1000_8000_00805f9b34fb);

/// Stream of raw notification payloads.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Advertised name, which for cat printers is the model name
    pub name: Option<String>,
    /// MAC address, or a platform UUID where MACs are hidden
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
        }
    }
}

/// BLE-like link to one printer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Listen for advertisements for `duration` and return what was seen.
    async fn discover(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>>;

    /// Open the link to the device at `address`.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Subscribe to the notify characteristic.
    async fn subscribe(&self) -> Result<NotificationStream>;

    /// Stop notifications.
    async fn unsubscribe(&self) -> Result<()>;

    /// Write one chunk to the command characteristic.
    async fn write(&self, chunk: &[u8]) -> Result<()>;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;
}

// ============================================================================
// ADDRESS HELPERS
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Validate a device address: a MAC address, or a 128-bit UUID as used by
/// macOS in place of MACs.
pub fn is_valid_address(address: &str) -> bool {
    if is_valid_mac(address) {
        return true;
    }
    let hex: String = address.chars().filter(|&c| c != '-').collect();
    hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

// ============================================================================
// TESTS
// ============================================================================
