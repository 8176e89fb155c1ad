//! # Print Sessions
//!
//! A print job runs through three phases:
//!
//! | Phase | Commands |
//! |-------|----------|
//! | Preparing | device state, start printing, DPI 200, speed, energy, apply energy, update device, flush, lattice start |
//! | Streaming | one `draw_bitmap` per row |
//! | Finishing | lattice end, cool-down speed, paper feed, device state, flush |
//!
//! [`PrintSession`] drives one job over a [`TransmissionController`].
//! [`Printer`] is the entry point most callers want: it owns the connection,
//! finds a printer when none is connected, and allows one job at a time.

use std::fs::{self, File};
use std::io::{BufRead, BufWriter};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::bitmap::BitmapStore;
use crate::connection::ConnectionManager;
use crate::error::{PrinterError, Result};
use crate::printer::config::{COOL_DOWN_SPEED, FEED_DISTANCE};
use crate::printer::model::FALLBACK_MODEL;
use crate::printer::{Model, PrintConfig};
use crate::protocol::Commander;
use crate::transmit::TransmissionController;
use crate::transport::{DiscoveredDevice, Transport};

/// File name of the raw command dump inside the dump directory.
pub const TRAFFIC_DUMP_FILE: &str = "traffic.dump";

/// File name of the printed bitmap inside the dump directory.
pub const BITMAP_DUMP_FILE: &str = "dump.pbm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Streaming,
    Finishing,
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReport {
    /// Bitmap rows sent, not counting blank feed rows
    pub rows: usize,
    /// Bytes handed to the transport
    pub bytes_written: usize,
    pub model: String,
    pub dry_run: bool,
}

// ============================================================================
// SESSION
// ============================================================================

/// One print job.
pub struct PrintSession<'a, T: Transport> {
    controller: TransmissionController<T>,
    model_name: String,
    model: Model,
    config: &'a PrintConfig,
    state: SessionState,
}

impl<'a, T: Transport> PrintSession<'a, T> {
    pub fn new(
        controller: TransmissionController<T>,
        model_name: impl Into<String>,
        model: Model,
        config: &'a PrintConfig,
    ) -> Self {
        Self {
            controller,
            model_name: model_name.into(),
            model,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Print `store`.
    ///
    /// The configured flips are applied to the store in place first. If
    /// preparing or streaming fails, the unsent data is dropped and the
    /// finishing commands are still attempted so the printer ends up in its
    /// idle state; the first error is returned.
    pub async fn run(&mut self, store: &mut BitmapStore) -> Result<PrintReport> {
        let paper_width = self.model.paper_width as usize;
        if store.width() != paper_width {
            return Err(PrinterError::UnsupportedWidth {
                expected: paper_width,
                got: store.width(),
            });
        }

        store.flip(self.config.flip_horizontal, self.config.flip_vertical);
        info!(
            model = %self.model_name,
            rows = store.height(),
            dry_run = self.config.dry_run,
            "print job started"
        );

        let streamed = self.prepare_and_stream(store).await;
        if streamed.is_err() {
            self.controller.discard_pending();
        }
        let finished = self.finish().await;
        self.state = SessionState::Idle;

        match (streamed, finished) {
            (Ok(rows), Ok(())) => {
                info!(rows, bytes = self.controller.bytes_written(), "print job finished");
                Ok(PrintReport {
                    rows,
                    bytes_written: self.controller.bytes_written(),
                    model: self.model_name.clone(),
                    dry_run: self.config.dry_run,
                })
            }
            (Ok(_), Err(e)) => {
                error!(error = %e, "finishing print job failed");
                Err(e)
            }
            (Err(e), finished) => {
                if let Err(finish_error) = finished {
                    warn!(error = %finish_error, "finishing after failure also failed");
                }
                error!(error = %e, "print job failed");
                Err(e)
            }
        }
    }

    async fn prepare_and_stream(&mut self, store: &BitmapStore) -> Result<usize> {
        self.prepare().await?;
        let rows = self.stream(store).await?;
        if let Some(dir) = &self.config.dump {
            fs::create_dir_all(dir)?;
            let path = dir.join(BITMAP_DUMP_FILE);
            store.write_pbm(BufWriter::new(File::create(&path)?), true)?;
            debug!(path = %path.display(), "bitmap dumped");
        }
        Ok(rows)
    }

    async fn prepare(&mut self) -> Result<()> {
        self.state = SessionState::Preparing;
        debug!("preparing printer");

        let c = &mut self.controller;
        c.get_device_state().await?;
        if self.model.supports_compressed_start {
            c.start_printing_new().await?;
        } else {
            c.start_printing().await?;
        }
        c.set_dpi_as_200().await?;
        // Speed 0 leaves the printer's own setting alone
        if self.config.speed != 0 {
            c.set_speed(self.config.speed).await?;
        }
        if let Some(energy) = self.config.energy {
            c.set_energy(energy).await?;
        }
        c.apply_energy().await?;
        c.update_device().await?;
        c.flush().await?;
        c.start_lattice().await
    }

    async fn stream(&mut self, store: &BitmapStore) -> Result<usize> {
        self.state = SessionState::Streaming;
        let row_bytes = self.model.data_width();
        let blank = vec![0u8; row_bytes];
        debug!(row_bytes, "streaming rows");

        let mut rows = 0;
        for row in store.read_all(row_bytes) {
            let row = if self.config.dry_run {
                &blank[..row.len()]
            } else {
                row
            };
            self.controller.draw_bitmap(row).await?;
            rows += 1;
        }
        Ok(rows)
    }

    async fn finish(&mut self) -> Result<()> {
        self.state = SessionState::Finishing;
        debug!("finishing print job");

        let c = &mut self.controller;
        c.end_lattice().await?;
        c.set_speed(COOL_DOWN_SPEED).await?;
        if self.model.has_feed_defect {
            let blank = vec![0u8; self.model.data_width()];
            for _ in 0..FEED_DISTANCE {
                c.draw_bitmap(&blank).await?;
            }
        } else {
            c.feed_paper(FEED_DISTANCE).await?;
        }
        c.get_device_state().await?;
        c.flush().await
    }
}

// ============================================================================
// PRINTER FACADE
// ============================================================================

/// # Printer
///
/// Owns the connection to one printer and runs print jobs on it, one at a
/// time.
///
/// ## Example
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use catprint::{BitmapStore, PrintConfig, Printer};
/// use catprint::transport::MockTransport;
///
/// let printer = Printer::new(MockTransport::new(), PrintConfig::default().with_fake(true));
/// let mut store = BitmapStore::new(384).unwrap();
/// store.write(&[0xFF; 48]);
/// let report = printer.print(&mut store).await.unwrap();
/// assert_eq!(report.rows, 1);
/// # });
/// ```
pub struct Printer<T: Transport> {
    connection: Mutex<ConnectionManager<T>>,
    transport: Arc<T>,
    config: PrintConfig,
}

impl<T: Transport> Printer<T> {
    pub fn new(transport: T, config: PrintConfig) -> Self {
        let transport = Arc::new(transport);
        let manager = ConnectionManager::new(Arc::clone(&transport), config.registry(), &config);
        Self {
            connection: Mutex::new(manager),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &PrintConfig {
        &self.config
    }

    /// See [`ConnectionManager::scan`].
    pub async fn scan(
        &self,
        identifier: Option<&str>,
        want_first_match: bool,
    ) -> Result<Vec<DiscoveredDevice>> {
        self.connection.lock().await.scan(identifier, want_first_match).await
    }

    pub async fn scan_everything(&self) -> Result<Vec<DiscoveredDevice>> {
        self.connection.lock().await.scan_everything().await
    }

    pub async fn connect(&self, name: Option<&str>, address: &str) -> Result<()> {
        self.connection.lock().await.connect(name, address).await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_connected()
    }

    /// Print a bitmap.
    ///
    /// Connects to the first printer matching the configured identifier if
    /// none is connected yet.
    ///
    /// ## Errors
    ///
    /// - [`PrinterError::SessionBusy`] if another job is running
    /// - [`PrinterError::NoDeviceFound`] if no printer could be found
    pub async fn print(&self, store: &mut BitmapStore) -> Result<PrintReport> {
        let mut connection = self
            .connection
            .try_lock()
            .map_err(|_| PrinterError::SessionBusy)?;
        self.ensure_connected(&mut connection).await?;
        self.run(&mut connection, store).await
    }

    /// Read PBM images from `reader` at the printer's paper width and print
    /// them.
    pub async fn print_pbm<R: BufRead>(&self, reader: R) -> Result<PrintReport> {
        let mut connection = self
            .connection
            .try_lock()
            .map_err(|_| PrinterError::SessionBusy)?;
        self.ensure_connected(&mut connection).await?;
        let (_, model) = self.select_model(&connection);
        let mut store = BitmapStore::from_pbm_reader(model.paper_width as usize, reader)?;
        self.run(&mut connection, &mut store).await
    }

    /// Connect to the first printer matching the configured identifier,
    /// unless one is connected already. Does nothing in fake mode.
    ///
    /// ## Errors
    ///
    /// - [`PrinterError::NoDeviceFound`] if the scan connected nothing
    pub async fn find_printer(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        self.ensure_connected(&mut connection).await
    }

    /// Paper width of the printer a job would run on right now.
    pub async fn paper_width(&self) -> usize {
        let connection = self.connection.lock().await;
        self.select_model(&connection).1.paper_width as usize
    }

    /// Disconnect from the printer.
    ///
    /// If a job is running, the link is cut underneath it first so the job
    /// fails fast instead of being waited for.
    pub async fn unload(&self) {
        let mut connection = match self.connection.try_lock() {
            Ok(connection) => connection,
            Err(_) => {
                warn!("print job in progress, cutting the link");
                if let Err(e) = self.transport.disconnect().await {
                    warn!(error = %e, "failed to disconnect");
                }
                self.connection.lock().await
            }
        };
        connection.disconnect().await;
    }

    async fn ensure_connected(&self, connection: &mut ConnectionManager<T>) -> Result<()> {
        if self.config.fake || connection.is_connected() {
            return Ok(());
        }
        connection.scan(self.config.identifier.as_deref(), true).await?;
        if connection.is_connected() {
            Ok(())
        } else {
            Err(PrinterError::NoDeviceFound)
        }
    }

    fn select_model(&self, connection: &ConnectionManager<T>) -> (String, Model) {
        let registry = connection.registry();
        if let Some(name) = &self.config.model {
            let model = registry.resolve(name);
            let name = if registry.contains(name) {
                name.clone()
            } else {
                FALLBACK_MODEL.to_string()
            };
            return (name, model);
        }
        match connection.device() {
            Some(device) => (
                device.name.clone().unwrap_or_else(|| FALLBACK_MODEL.to_string()),
                device.model,
            ),
            None => (FALLBACK_MODEL.to_string(), registry.fallback()),
        }
    }

    async fn run(
        &self,
        connection: &mut ConnectionManager<T>,
        store: &mut BitmapStore,
    ) -> Result<PrintReport> {
        let (name, model) = self.select_model(connection);

        let mut controller =
            TransmissionController::new(connection.transport(), connection.flow(), &self.config);
        if let Some(dir) = &self.config.dump {
            fs::create_dir_all(dir)?;
            controller = controller.with_traffic_dump(File::create(dir.join(TRAFFIC_DUMP_FILE))?);
        }

        let result = PrintSession::new(controller, name, model, &self.config)
            .run(store)
            .await;
        // The next job finds the printer again
        if let Err(PrinterError::Transport(e)) = &result {
            warn!(error = %e, "printer link failed, dropping connection");
            connection.disconnect().await;
        }
        result
    }
}
