//! # Bluetooth Low Energy Transport
//!
//! Talks to a cat printer over BLE GATT using btleplug.
//!
//! ## GATT Layout
//!
//! | Characteristic | UUID | Use |
//! |----------------|------|-----|
//! | TX | `0000ae01-…-00805f9b34fb` | command writes (without response) |
//! | RX | `0000ae02-…-00805f9b34fb` | flow-control notifications |
//!
//! ## Addresses
//!
//! Devices are addressed by MAC. macOS hides MACs from applications; there
//! btleplug reports a zero address and the peripheral id string is used
//! instead.
//!
//! ## Setup (Linux)
//!
//! BlueZ must be running and the user must be allowed to talk to it over
//! D-Bus. Pairing is not needed: the printers accept unauthenticated
//! connections.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::{
    DiscoveredDevice, NotificationStream, RX_CHARACTERISTIC_UUID, TX_CHARACTERISTIC_UUID,
    Transport,
};
use crate::error::{PrinterError, Result};

/// How long to scan when asked to connect to a device not seen yet.
const CONNECT_SCAN_TIME: Duration = Duration::from_secs(4);

fn transport_err(context: &str, e: impl std::fmt::Display) -> PrinterError {
    PrinterError::Transport(format!("{}: {}", context, e))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The peripheral and its two characteristics, once connected.
#[derive(Clone)]
struct Link {
    peripheral: Peripheral,
    tx: Characteristic,
    rx: Characteristic,
}

/// # BLE Printer Transport
///
/// ## Example
///
/// ```no_run
/// use std::time::Duration;
/// use catprint::transport::{BleTransport, Transport};
///
/// # async fn example() -> Result<(), catprint::PrinterError> {
/// let transport = BleTransport::new().await?;
/// for device in transport.discover(Duration::from_secs(4)).await? {
///     println!("{:?} {}", device.name, device.address);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BleTransport {
    adapter: Adapter,
    link: Mutex<Option<Link>>,
    /// Peripheral whose connect is in flight, so `disconnect` can reach it
    /// when setup fails or is cancelled.
    connecting: Mutex<Option<Peripheral>>,
}

impl BleTransport {
    /// Open the first Bluetooth adapter of the system.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| transport_err("Failed to create BLE manager", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| transport_err("Failed to get BLE adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| PrinterError::Transport("No BLE adapters available".to_string()))?;
        info!("BLE adapter initialized");
        Ok(Self {
            adapter,
            link: Mutex::new(None),
            connecting: Mutex::new(None),
        })
    }

    fn link(&self) -> Result<Link> {
        lock(&self.link)
            .clone()
            .ok_or_else(|| PrinterError::Transport("not connected".to_string()))
    }

    async fn scan(&self, duration: Duration) -> Result<Vec<Peripheral>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| transport_err("Failed to start BLE scan", e))?;
        tokio::time::sleep(duration).await;
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| transport_err("Failed to stop BLE scan", e))?;
        self.adapter
            .peripherals()
            .await
            .map_err(|e| transport_err("Failed to list peripherals", e))
    }

    async fn find(&self, address: &str) -> Result<Option<Peripheral>> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| transport_err("Failed to list peripherals", e))?;
        Ok(peripherals
            .into_iter()
            .find(|p| peripheral_address(p).eq_ignore_ascii_case(address)))
    }
}

/// Discover services and pick out the TX and RX characteristics.
async fn characteristics(peripheral: &Peripheral) -> Result<(Characteristic, Characteristic)> {
    peripheral
        .discover_services()
        .await
        .map_err(|e| transport_err("Failed to discover services", e))?;

    let characteristics = peripheral.characteristics();
    let find = |uuid| {
        characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| PrinterError::Transport(format!("Characteristic {} not found", uuid)))
    };
    Ok((find(TX_CHARACTERISTIC_UUID)?, find(RX_CHARACTERISTIC_UUID)?))
}

fn peripheral_address(peripheral: &Peripheral) -> String {
    let address = peripheral.address();
    if address == BDAddr::default() {
        format!("{:?}", peripheral.id())
    } else {
        address.to_string()
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn discover(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        let mut devices = Vec::new();
        for peripheral in self.scan(duration).await? {
            let name = match peripheral.properties().await {
                Ok(Some(properties)) => properties.local_name,
                _ => None,
            };
            devices.push(DiscoveredDevice {
                name,
                address: peripheral_address(&peripheral),
            });
        }
        debug!(count = devices.len(), "BLE discovery finished");
        Ok(devices)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let peripheral = match self.find(address).await? {
            Some(p) => p,
            None => {
                debug!(address, "device not cached, scanning");
                self.scan(CONNECT_SCAN_TIME).await?;
                self.find(address).await?.ok_or_else(|| {
                    PrinterError::Transport(format!("Device {} not found", address))
                })?
            }
        };

        *lock(&self.connecting) = Some(peripheral.clone());
        if let Err(e) = peripheral.connect().await {
            lock(&self.connecting).take();
            return Err(transport_err("Connection failed", e));
        }

        let (tx, rx) = match characteristics(&peripheral).await {
            Ok(pair) => pair,
            Err(e) => {
                lock(&self.connecting).take();
                if let Err(de) = peripheral.disconnect().await {
                    warn!(address, error = %de, "failed to drop half-open link");
                }
                return Err(e);
            }
        };

        lock(&self.connecting).take();
        *lock(&self.link) = Some(Link { peripheral, tx, rx });
        info!(address, "connected to printer");
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        let link = self.link()?;
        link.peripheral
            .subscribe(&link.rx)
            .await
            .map_err(|e| transport_err("Failed to subscribe to notifications", e))?;
        let notifications = link
            .peripheral
            .notifications()
            .await
            .map_err(|e| transport_err("Failed to get notifications stream", e))?;
        Ok(notifications
            .filter_map(|n| async move { (n.uuid == RX_CHARACTERISTIC_UUID).then_some(n.value) })
            .boxed())
    }

    async fn unsubscribe(&self) -> Result<()> {
        let link = self.link()?;
        link.peripheral
            .unsubscribe(&link.rx)
            .await
            .map_err(|e| transport_err("Failed to unsubscribe", e))
    }

    async fn write(&self, chunk: &[u8]) -> Result<()> {
        let link = self.link()?;
        link.peripheral
            .write(&link.tx, chunk, WriteType::WithoutResponse)
            .await
            .map_err(|e| transport_err("Failed to write to characteristic", e))
    }

    async fn disconnect(&self) -> Result<()> {
        let link = lock(&self.link).take();
        let connecting = lock(&self.connecting).take();
        match link.map(|link| link.peripheral).or(connecting) {
            Some(peripheral) => peripheral
                .disconnect()
                .await
                .map_err(|e| transport_err("Failed to disconnect", e)),
            None => Ok(()),
        }
    }
}
