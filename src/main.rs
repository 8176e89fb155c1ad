//! # catprint CLI
//!
//! Command-line interface for BLE cat printers.
//!
//! ## Usage
//!
//! ```bash
//! # List printers in range
//! catprint scan
//!
//! # Only MX06 printers, or every BLE device
//! catprint scan MX06
//! catprint scan --all
//!
//! # Print a PBM (or `-` for stdin) on the first printer found
//! catprint print label.pbm
//!
//! # Print a photo on a specific printer, skipping discovery
//! catprint print --device GB01,AA:BB:CC:DD:EE:FF --dither fs cat.jpg
//!
//! # Run the whole job without a printer, keeping the traffic
//! catprint print --fake --dump out/ label.pbm
//!
//! # Look at what would be printed
//! catprint preview cat.jpg --png preview.png
//! ```

use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use catprint::{
    BitmapStore, PrintConfig, PrintReport, Printer, PrinterError,
    render::{dither::DitheringAlgorithm, image},
    transport::{MockTransport, Transport},
};

/// catprint - BLE thermal cat printer utility
#[derive(Parser, Debug)]
#[command(name = "catprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for printers
    Scan {
        /// Model name, address, or `name,address`
        identifier: Option<String>,

        /// List every BLE device, not only printers
        #[arg(long)]
        all: bool,
    },

    /// Print a PBM or image file
    Print {
        /// PBM file, `-` for PBM on stdin, or any image file
        file: PathBuf,

        #[command(flatten)]
        job: JobArgs,

        /// Printer to use: model name, address, or `name,address`
        #[arg(long, short)]
        device: Option<String>,

        /// Print speed, lower is faster (0 keeps the printer's setting)
        #[arg(long)]
        speed: Option<u8>,

        /// Thermal energy
        #[arg(long)]
        energy: Option<u16>,

        /// Send blank rows instead of the image
        #[arg(long)]
        dry_run: bool,

        /// Do not talk to any printer
        #[arg(long)]
        fake: bool,

        /// Directory for traffic.dump and dump.pbm
        #[arg(long, value_name = "DIR")]
        dump: Option<PathBuf>,
    },

    /// Render the bitmap that would be printed to a PNG
    Preview {
        /// PBM file, `-` for PBM on stdin, or any image file
        file: PathBuf,

        #[command(flatten)]
        job: JobArgs,

        /// Output PNG file
        #[arg(long, value_name = "FILE")]
        png: PathBuf,
    },
}

/// Options shared by `print` and `preview`.
#[derive(clap::Args, Debug)]
struct JobArgs {
    /// Treat the printer as this model
    #[arg(long)]
    model: Option<String>,

    /// Mirror left to right
    #[arg(long)]
    flip_h: bool,

    /// Mirror top to bottom
    #[arg(long)]
    flip_v: bool,

    /// Dithering for non-PBM images (bayer, floyd-steinberg, atkinson, none)
    #[arg(long, default_value = "bayer")]
    dither: DitheringAlgorithm,
}

/// Input file, after sniffing its format.
enum Input {
    Pbm(Vec<u8>),
    Image(PathBuf),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_configuration(path: Option<&Path>) -> Result<PrintConfig, PrinterError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            PrintConfig::load_from_file(path)
        }
        None => Ok(PrintConfig::default()),
    }
}

async fn run(cli: Cli) -> Result<(), PrinterError> {
    let mut config = load_configuration(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { identifier, all } => {
            let transport = open_transport(config.fake).await?;
            scan(transport, config, identifier.as_deref(), all).await
        }

        Commands::Print {
            file,
            job,
            device,
            speed,
            energy,
            dry_run,
            fake,
            dump,
        } => {
            if let Some(device) = device {
                config.identifier = Some(device);
            }
            if let Some(speed) = speed {
                config.speed = speed;
            }
            if energy.is_some() {
                config.energy = energy;
            }
            if dump.is_some() {
                config.dump = dump;
            }
            config.dry_run |= dry_run;
            config.fake |= fake;
            apply_job_args(&mut config, &job);

            let input = read_input(&file)?;
            let transport = open_transport(config.fake).await?;
            let report = print(transport, config, input, job.dither).await?;
            println!(
                "Printed {} rows on {} ({} bytes{})",
                report.rows,
                report.model,
                report.bytes_written,
                if report.dry_run { ", dry run" } else { "" }
            );
            Ok(())
        }

        Commands::Preview { file, job, png } => {
            apply_job_args(&mut config, &job);
            let registry = config.registry();
            let model = match &config.model {
                Some(name) => registry.resolve(name),
                None => registry.fallback(),
            };

            let mut store = match read_input(&file)? {
                Input::Pbm(data) => BitmapStore::from_pbm_reader(model.paper_width as usize, &data[..])?,
                Input::Image(path) => image::image_to_store(
                    &image::load_image(path)?,
                    model.paper_width as usize,
                    job.dither,
                )?,
            };
            store.flip(config.flip_horizontal, config.flip_vertical);
            image::save_png(&store, &png)?;
            println!("Saved {}x{} preview to {}", store.width(), store.height(), png.display());
            Ok(())
        }
    }
}

fn apply_job_args(config: &mut PrintConfig, job: &JobArgs) {
    if job.model.is_some() {
        config.model = job.model.clone();
    }
    config.flip_horizontal |= job.flip_h;
    config.flip_vertical |= job.flip_v;
}

fn read_input(file: &Path) -> Result<Input, PrinterError> {
    if file == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        return Ok(Input::Pbm(data));
    }

    let mut magic = [0u8; 2];
    let mut reader = BufReader::new(std::fs::File::open(file)?);
    let is_pbm = reader.read_exact(&mut magic).is_ok() && &magic == b"P4";
    if is_pbm {
        Ok(Input::Pbm(std::fs::read(file)?))
    } else {
        Ok(Input::Image(file.to_path_buf()))
    }
}

#[cfg(feature = "ble")]
enum CliTransport {
    Ble(catprint::transport::BleTransport),
    Mock(MockTransport),
}

#[cfg(not(feature = "ble"))]
enum CliTransport {
    Mock(MockTransport),
}

async fn open_transport(fake: bool) -> Result<CliTransport, PrinterError> {
    if fake {
        return Ok(CliTransport::Mock(MockTransport::new()));
    }

    #[cfg(feature = "ble")]
    {
        Ok(CliTransport::Ble(catprint::transport::BleTransport::new().await?))
    }
    #[cfg(not(feature = "ble"))]
    {
        Err(PrinterError::Transport(
            "built without BLE support, only --fake is available".to_string(),
        ))
    }
}

async fn scan(
    transport: CliTransport,
    config: PrintConfig,
    identifier: Option<&str>,
    all: bool,
) -> Result<(), PrinterError> {
    match transport {
        #[cfg(feature = "ble")]
        CliTransport::Ble(t) => scan_with(Printer::new(t, config), identifier, all).await,
        CliTransport::Mock(t) => scan_with(Printer::new(t, config), identifier, all).await,
    }
}

async fn scan_with<T: Transport>(
    printer: Printer<T>,
    identifier: Option<&str>,
    all: bool,
) -> Result<(), PrinterError> {
    let devices = if all {
        printer.scan_everything().await?
    } else {
        printer.scan(identifier, false).await?
    };

    if devices.is_empty() {
        println!("No printers found");
    }
    for device in devices {
        println!("{},{}", device.name.as_deref().unwrap_or("?"), device.address);
    }
    Ok(())
}

async fn print(
    transport: CliTransport,
    config: PrintConfig,
    input: Input,
    dither: DitheringAlgorithm,
) -> Result<PrintReport, PrinterError> {
    match transport {
        #[cfg(feature = "ble")]
        CliTransport::Ble(t) => print_with(Printer::new(t, config), input, dither).await,
        CliTransport::Mock(t) => print_with(Printer::new(t, config), input, dither).await,
    }
}

async fn print_with<T: Transport>(
    printer: Printer<T>,
    input: Input,
    dither: DitheringAlgorithm,
) -> Result<PrintReport, PrinterError> {
    let result = match input {
        Input::Pbm(data) => printer.print_pbm(&data[..]).await,
        Input::Image(path) => {
            let photo = image::load_image(&path)?;
            // Paper width depends on the printer, so find it first
            printer.find_printer().await?;
            let mut store = image::image_to_store(&photo, printer.paper_width().await, dither)?;
            printer.print(&mut store).await
        }
    };
    printer.unload().await;
    result
}
