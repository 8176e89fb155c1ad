//! # Print Configuration
//!
//! [`PrintConfig`] gathers every knob of a print job and of the driver's
//! link to the device. It deserializes from JSON with all fields optional,
//! and offers `with_*` builder methods for programmatic use.
//!
//! ```
//! use catprint::printer::PrintConfig;
//!
//! let config = PrintConfig::default()
//!     .with_energy(0x4000)
//!     .with_dry_run(true);
//! assert_eq!(config.speed, 32);
//! assert_eq!(config.mtu, 200);
//! ```
//!
//! ## Timing
//!
//! | Setting | Default | Used by |
//! |---------|---------|---------|
//! | `chunk_delay` | 20 ms | pause after every MTU-sized write |
//! | `pause_poll_interval` | 200 ms | flow-control wait loop |
//! | `scan_time` | 4 s | BLE discovery |
//! | `connection_timeout` | 5 s | BLE connect |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::{Model, ModelRegistry};
use crate::error::{PrinterError, Result};

/// Default paper speed. Slower makes heating more stable.
pub const DEFAULT_SPEED: u8 = 32;

/// Speed set after the bitmap stream, while the paper is fed out.
pub const COOL_DOWN_SPEED: u8 = 8;

/// Feed distance after a job, in pixels. Also the number of blank rows
/// printed instead on models with a feed defect.
pub const FEED_DISTANCE: u16 = 128;

/// Default BLE write size.
pub const DEFAULT_MTU: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    /// Device filter: model name, address, or `name,address`
    pub identifier: Option<String>,
    /// Model to assume instead of the advertised name
    pub model: Option<String>,
    /// Extra model definitions merged over the built-in table
    pub models: BTreeMap<String, Model>,
    /// Paper speed in device units, lower is faster; 0 leaves the device default
    pub speed: u8,
    /// Thermal energy, `None` leaves the device default
    pub energy: Option<u16>,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Run the whole command sequence with blank rows
    pub dry_run: bool,
    /// Skip the transport entirely
    pub fake: bool,
    /// Directory for `traffic.dump` and `dump.pbm`
    pub dump: Option<PathBuf>,
    /// Largest chunk written to the device at once
    pub mtu: usize,
    pub chunk_delay: Duration,
    pub pause_poll_interval: Duration,
    pub scan_time: Duration,
    pub connection_timeout: Duration,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            model: None,
            models: BTreeMap::new(),
            speed: DEFAULT_SPEED,
            energy: None,
            flip_horizontal: false,
            flip_vertical: false,
            dry_run: false,
            fake: false,
            dump: None,
            mtu: DEFAULT_MTU,
            chunk_delay: Duration::from_millis(20),
            pause_poll_interval: Duration::from_millis(200),
            scan_time: Duration::from_secs(4),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl PrintConfig {
    /// Load a configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| PrinterError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Built-in models plus the ones defined in this configuration.
    pub fn registry(&self) -> ModelRegistry {
        self.models
            .iter()
            .fold(ModelRegistry::builtin(), |registry, (name, model)| {
                registry.with_model(name.clone(), *model)
            })
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_energy(mut self, energy: u16) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_flip(mut self, horizontal: bool, vertical: bool) -> Self {
        self.flip_horizontal = horizontal;
        self.flip_vertical = vertical;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn with_fake(mut self, enabled: bool) -> Self {
        self.fake = enabled;
        self
    }

    pub fn with_dump(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump = Some(dir.into());
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval = interval;
        self
    }

    pub fn with_scan_time(mut self, time: Duration) -> Self {
        self.scan_time = time;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}
