//! # Connection Management
//!
//! [`ConnectionManager`] owns the transport, finds printers, and keeps the
//! flow-control flag up to date while connected.
//!
//! ## States
//!
//! ```text
//!                connect()            transport ok
//! Disconnected ────────────► Connecting ─────────► Connected
//!      ▲                          │                    │
//!      └──── transport error ─────┘                    │
//!      └──────────── disconnect() / link lost ─────────┘
//! ```
//!
//! The link counts as lost once the notification stream ends. From then on
//! the manager reports `Disconnected` and the next `connect` opens a fresh
//! link, even to the same address.
//!
//! ## Flow Control
//!
//! While connected, a listener task reads the notify characteristic. The
//! printer sends a 9-byte pause frame when its buffer fills up and a resume
//! frame when it drained. The listener is the only writer of the
//! [`FlowControl`] flag; [`TransmissionController::flush`](crate::transmit::TransmissionController::flush)
//! is its only reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{PrinterError, Result};
use crate::printer::{Model, ModelRegistry, PrintConfig};
use crate::protocol::command::{DATA_FLOW_PAUSE, DATA_FLOW_RESUME};
use crate::transport::{DiscoveredDevice, NotificationStream, Transport, is_valid_address};

// ----------------------------------------------------------------------------
// Flow Control
// ----------------------------------------------------------------------------

/// Shared "device asked us to pause" flag.
#[derive(Debug, Clone, Default)]
pub struct FlowControl {
    paused: Arc<AtomicBool>,
}

impl FlowControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Update the flag from one notification payload.
    ///
    /// Only byte-exact pause/resume frames count. Returns whether the payload
    /// was one of them.
    pub fn handle_notification(&self, payload: &[u8]) -> bool {
        if payload == DATA_FLOW_PAUSE {
            self.set_paused(true);
            true
        } else if payload == DATA_FLOW_RESUME {
            self.set_paused(false);
            true
        } else {
            false
        }
    }
}

async fn listen(
    mut notifications: NotificationStream,
    flow: FlowControl,
    alive: Arc<AtomicBool>,
) {
    while let Some(payload) = notifications.next().await {
        if flow.handle_notification(&payload) {
            debug!(paused = flow.is_paused(), "flow control updated");
        } else {
            debug!(len = payload.len(), "ignoring notification");
        }
    }
    // Link gone: release anyone waiting on a resume that will never come
    alive.store(false, Ordering::Release);
    flow.set_paused(false);
    warn!("notification stream ended, printer link lost");
}

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The printer we are connected to.
#[derive(Debug, Clone)]
pub struct ConnectedDevice {
    pub name: Option<String>,
    pub address: String,
    pub model: Model,
}

/// Owns the transport and the connection to one printer.
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    registry: ModelRegistry,
    flow: FlowControl,
    state: ConnectionState,
    device: Option<ConnectedDevice>,
    listener: Option<JoinHandle<()>>,
    /// Cleared by the listener of the current link. A new flag per link.
    link_alive: Arc<AtomicBool>,
    scan_time: Duration,
    connection_timeout: Duration,
    fake: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, registry: ModelRegistry, config: &PrintConfig) -> Self {
        Self {
            transport,
            registry,
            flow: FlowControl::new(),
            state: ConnectionState::Disconnected,
            device: None,
            listener: None,
            link_alive: Arc::new(AtomicBool::new(false)),
            scan_time: config.scan_time,
            connection_timeout: config.connection_timeout,
            fake: config.fake,
        }
    }

    /// Scan for supported printers.
    ///
    /// `identifier` may be a model name (`GB01`), an address, or
    /// `name,address`. The last form skips discovery entirely. Only devices
    /// whose advertised name is a known model are returned. With
    /// `want_first_match`, the first result is connected to.
    ///
    /// ## Errors
    ///
    /// - [`PrinterError::UnknownModel`] if the identifier names no known model
    ///   and is not an address
    /// - [`PrinterError::InvalidAddress`] for a malformed `name,address`
    pub async fn scan(
        &mut self,
        identifier: Option<&str>,
        want_first_match: bool,
    ) -> Result<Vec<DiscoveredDevice>> {
        if self.fake {
            return Ok(Vec::new());
        }

        let identifier = identifier.map(str::trim).filter(|s| !s.is_empty());
        if let Some(identifier) = identifier {
            if let Some((name, address)) = identifier.split_once(',') {
                let (name, address) = (name.trim(), address.trim());
                self.registry.require(name)?;
                if !is_valid_address(address) {
                    return Err(PrinterError::InvalidAddress(address.to_string()));
                }
                if want_first_match {
                    self.connect(Some(name), address).await?;
                }
                return Ok(vec![DiscoveredDevice::new(Some(name), address)]);
            }
            if !self.registry.contains(identifier) && !is_valid_address(identifier) {
                return Err(PrinterError::UnknownModel(identifier.to_string()));
            }
        }

        let registry = &self.registry;
        let mut devices: Vec<DiscoveredDevice> = self
            .transport
            .discover(self.scan_time)
            .await?
            .into_iter()
            .filter(|d| d.name.as_deref().is_some_and(|name| registry.contains(name)))
            .collect();

        if let Some(identifier) = identifier {
            if registry.contains(identifier) {
                devices.retain(|d| d.name.as_deref() == Some(identifier));
            } else {
                devices.retain(|d| d.address.eq_ignore_ascii_case(identifier));
            }
        }
        info!(count = devices.len(), "scan finished");

        if want_first_match && let Some(first) = devices.first().cloned() {
            self.connect(first.name.as_deref(), &first.address).await?;
        }
        Ok(devices)
    }

    /// Return every device discovered, printer or not.
    pub async fn scan_everything(&self) -> Result<Vec<DiscoveredDevice>> {
        if self.fake {
            return Ok(Vec::new());
        }
        self.transport.discover(self.scan_time).await
    }

    /// Connect to the printer at `address`.
    ///
    /// A no-op when the link to the same address is still up. Any other
    /// connection, or a lost one, is torn down first. An unknown `name` does not fail: the
    /// generic model profile is used instead.
    pub async fn connect(&mut self, name: Option<&str>, address: &str) -> Result<()> {
        if self.fake {
            return Ok(());
        }
        if let Some(device) = self.device()
            && device.address.eq_ignore_ascii_case(address)
        {
            debug!(address, "already connected");
            return Ok(());
        }
        self.disconnect().await;

        let model = match name {
            Some(name) => self.registry.resolve(name),
            None => self.registry.fallback(),
        };

        self.state = ConnectionState::Connecting;
        let notifications = match self.open(address).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(address, error = %e, "connection failed");
                if let Err(e) = self.transport.disconnect().await {
                    debug!(error = %e, "cleanup after failed connect");
                }
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        self.flow.set_paused(false);
        self.link_alive = Arc::new(AtomicBool::new(true));
        self.listener = Some(tokio::spawn(listen(
            notifications,
            self.flow.clone(),
            Arc::clone(&self.link_alive),
        )));
        self.device = Some(ConnectedDevice {
            name: name.map(str::to_string),
            address: address.to_string(),
            model,
        });
        self.state = ConnectionState::Connected;
        info!(address, name = name.unwrap_or("?"), "printer connected");
        Ok(())
    }

    async fn open(&self, address: &str) -> Result<NotificationStream> {
        timeout(self.connection_timeout, self.transport.connect(address))
            .await
            .map_err(|_| PrinterError::Transport(format!("Connection to {} timed out", address)))??;
        self.transport.subscribe().await
    }

    /// Tear down the connection.
    ///
    /// Idempotent and safe from any state. Transport errors are logged and
    /// swallowed; local device state is always cleared.
    pub async fn disconnect(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.link_alive.store(false, Ordering::Release);
        self.flow.set_paused(false);

        if let Some(device) = self.device.take() {
            info!(address = %device.address, "disconnecting from printer");
            if let Err(e) = self.transport.unsubscribe().await {
                warn!(error = %e, "failed to stop notifications");
            }
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "failed to disconnect");
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        if self.state == ConnectionState::Connected && !self.link_alive.load(Ordering::Acquire) {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The connected printer, `None` once the link is lost.
    pub fn device(&self) -> Option<&ConnectedDevice> {
        self.device.as_ref().filter(|_| self.is_connected())
    }

    pub fn address(&self) -> Option<&str> {
        self.device().map(|d| d.address.as_str())
    }

    /// Model of the connected printer.
    pub fn model(&self) -> Option<Model> {
        self.device().map(|d| d.model)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn flow(&self) -> FlowControl {
        self.flow.clone()
    }

    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }
}
