//! # Print Pipeline Tests
//!
//! End-to-end jobs over [`MockTransport`]: PBM in, command frames out.
//!
//! The mock records every chunk the driver writes, so the assertions decode
//! the byte stream back into frames and check what the printer would have
//! received.

use std::sync::Arc;
use std::time::Duration;

use catprint::bitmap::pbm::pbm_header;
use catprint::protocol::command::{
    Command, DATA_FLOW_PAUSE, DATA_FLOW_RESUME, LATTICE_END, Opcode, decode_stream, make_command,
};
use catprint::session::{BITMAP_DUMP_FILE, TRAFFIC_DUMP_FILE};
use catprint::transport::{DiscoveredDevice, MockTransport, Transport};
use catprint::{BitmapStore, PrintConfig, Printer, PrinterError};
use pretty_assertions::assert_eq;

const ADDR: &str = "AA:BB:CC:DD:EE:01";

// ============================================================================
// HELPERS
// ============================================================================

fn config() -> PrintConfig {
    PrintConfig::default()
        .with_chunk_delay(Duration::ZERO)
        .with_pause_poll_interval(Duration::from_millis(5))
        .with_scan_time(Duration::ZERO)
}

/// One PBM page of `height` rows, row `y` filled with byte `y + 1`.
fn pbm(width: usize, height: usize) -> Vec<u8> {
    let mut data = pbm_header(width, height);
    for y in 0..height {
        data.extend(vec![(y + 1) as u8; width / 8]);
    }
    data
}

fn gb01() -> MockTransport {
    MockTransport::new().with_devices(vec![DiscoveredDevice::new(Some("GB01"), ADDR)])
}

fn draws(commands: &[Command]) -> Vec<&Command> {
    commands
        .iter()
        .filter(|c| c.opcode == Opcode::DrawBitmap as u8)
        .collect()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// ============================================================================
// JOBS
// ============================================================================

#[tokio::test]
async fn test_dry_run_streams_blank_rows() {
    let mock = gb01();
    let printer = Printer::new(mock.clone(), config().with_dry_run(true));

    let mut store = BitmapStore::new(384).unwrap();
    store.from_pbm(&pbm(384, 10)[..]).unwrap();
    let report = printer.print(&mut store).await.unwrap();
    assert_eq!(report.rows, 10);
    assert!(report.dry_run);

    let commands = decode_stream(&mock.written_bytes()).unwrap();
    let rows = draws(&commands);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|c| c.payload == vec![0u8; 48]));

    // The last row is followed directly by the lattice end marker
    let last_draw = commands
        .iter()
        .rposition(|c| c.opcode == Opcode::DrawBitmap as u8)
        .unwrap();
    assert_eq!(commands[last_draw + 1].opcode, Opcode::Lattice as u8);
    assert_eq!(commands[last_draw + 1].payload, LATTICE_END.to_vec());
}

#[tokio::test]
async fn test_rows_sent_top_first() {
    let mock = gb01();
    let printer = Printer::new(mock.clone(), config());
    let report = printer.print_pbm(&pbm(384, 5)[..]).await.unwrap();
    assert_eq!(report.rows, 5);
    assert_eq!(report.model, "GB01");
    assert_eq!(report.bytes_written, mock.written_bytes().len());

    let commands = decode_stream(&mock.written_bytes()).unwrap();
    let firsts: Vec<u8> = draws(&commands).iter().map(|c| c.payload[0]).collect();
    // 0x01..0x05 bit-reversed
    assert_eq!(firsts, vec![0x80, 0x40, 0xC0, 0x20, 0xA0]);
}

#[tokio::test]
async fn test_flipped_job() {
    let mock = gb01();
    let printer = Printer::new(mock.clone(), config().with_flip(false, true));
    printer.print_pbm(&pbm(384, 3)[..]).await.unwrap();

    let commands = decode_stream(&mock.written_bytes()).unwrap();
    let firsts: Vec<u8> = draws(&commands).iter().map(|c| c.payload[0]).collect();
    assert_eq!(firsts, vec![0xC0, 0x40, 0x80]);
}

#[tokio::test]
async fn test_feed_defect_model_feeds_with_blank_rows() {
    let mock = MockTransport::new();
    let printer = Printer::new(mock.clone(), config().with_identifier(format!("MX09,{}", ADDR)));
    let report = printer.print_pbm(&pbm(384, 2)[..]).await.unwrap();
    assert_eq!(report.model, "MX09");
    assert_eq!(report.rows, 2);

    let commands = decode_stream(&mock.written_bytes()).unwrap();
    assert_eq!(draws(&commands).len(), 2 + 128);
    assert!(!commands.iter().any(|c| c.opcode == Opcode::FeedPaper as u8));
}

#[tokio::test]
async fn test_wrong_pbm_width() {
    let printer = Printer::new(gb01(), config());
    let result = printer.print_pbm(&pbm(200, 2)[..]).await;
    assert!(matches!(
        result,
        Err(PrinterError::UnsupportedWidth {
            expected: 384,
            got: 200
        })
    ));
}

#[tokio::test]
async fn test_fake_job_dumps_traffic_and_bitmap() {
    let dir = std::env::temp_dir().join(format!("catprint-pipeline-{}", std::process::id()));
    let input = pbm(384, 4);
    let printer = Printer::new(MockTransport::new(), config().with_fake(true).with_dump(&dir));
    let report = printer.print_pbm(&input[..]).await.unwrap();
    assert_eq!(report.bytes_written, 0);

    let traffic = std::fs::read(dir.join(TRAFFIC_DUMP_FILE)).unwrap();
    let commands = decode_stream(&traffic).unwrap();
    assert_eq!(draws(&commands).len(), 4);
    assert_eq!(std::fs::read(dir.join(BITMAP_DUMP_FILE)).unwrap(), input);

    std::fs::remove_dir_all(&dir).unwrap();
}

// ============================================================================
// FAILURES AND CONCURRENCY
// ============================================================================

#[tokio::test]
async fn test_mid_stream_failure_still_finishes() {
    let mock = gb01();
    let printer = Printer::new(mock.clone(), config());
    // Prepare goes out in one chunk; the stream fails on its third
    mock.fail_one_write_after(3);

    let result = printer.print_pbm(&pbm(384, 100)[..]).await;
    assert!(matches!(result, Err(PrinterError::Transport(_))));

    let mut finish = Vec::new();
    finish.extend(make_command(Opcode::Lattice as u8, &LATTICE_END).unwrap());
    finish.extend(make_command(Opcode::SetSpeed as u8, &[8]).unwrap());
    finish.extend(make_command(Opcode::FeedPaper as u8, &[128, 0]).unwrap());
    finish.extend(make_command(Opcode::DeviceState as u8, &[0]).unwrap());
    assert_eq!(mock.writes().last().unwrap(), &finish);

    // The failed link is dropped and the next job connects again
    assert!(!printer.is_connected().await);
    let report = printer.print_pbm(&pbm(384, 2)[..]).await.unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(mock.connect_count(), 2);
}

#[tokio::test]
async fn test_rescan_after_printer_switched_off() {
    let mock = gb01();
    let printer = Printer::new(mock.clone(), config());
    printer.connect(Some("GB01"), ADDR).await.unwrap();

    mock.disconnect().await.unwrap();
    settle().await;
    assert!(!printer.is_connected().await);

    printer.scan(Some("GB01"), true).await.unwrap();
    assert!(printer.is_connected().await);
    assert_eq!(mock.connect_count(), 2);

    let report = printer.print_pbm(&pbm(384, 3)[..]).await.unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(mock.connect_count(), 2);
}

#[tokio::test]
async fn test_concurrent_job_rejected() {
    let mock = gb01();
    let printer = Arc::new(Printer::new(mock.clone(), config()));
    printer.connect(Some("GB01"), ADDR).await.unwrap();

    mock.notify(&DATA_FLOW_PAUSE);
    settle().await;

    let first = {
        let printer = Arc::clone(&printer);
        tokio::spawn(async move { printer.print_pbm(&pbm(384, 3)[..]).await })
    };
    settle().await;
    assert_eq!(mock.write_count(), 0);

    let second = printer.print_pbm(&pbm(384, 3)[..]).await;
    assert!(matches!(second, Err(PrinterError::SessionBusy)));

    mock.notify(&DATA_FLOW_RESUME);
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.rows, 3);
}

#[tokio::test]
async fn test_unload_interrupts_paused_job() {
    let mock = gb01();
    let printer = Arc::new(Printer::new(mock.clone(), config()));
    printer.connect(Some("GB01"), ADDR).await.unwrap();

    mock.notify(&DATA_FLOW_PAUSE);
    settle().await;

    let job = {
        let printer = Arc::clone(&printer);
        tokio::spawn(async move { printer.print_pbm(&pbm(384, 3)[..]).await })
    };
    settle().await;

    printer.unload().await;
    assert!(matches!(job.await.unwrap(), Err(PrinterError::Transport(_))));
    assert!(!printer.is_connected().await);
    assert_eq!(mock.write_count(), 0);
}

#[tokio::test]
async fn test_no_printer_in_range() {
    let printer = Printer::new(
        MockTransport::new().with_devices(vec![DiscoveredDevice::new(Some("Speaker"), ADDR)]),
        config(),
    );
    assert!(matches!(
        printer.print_pbm(&pbm(384, 1)[..]).await,
        Err(PrinterError::NoDeviceFound)
    ));
}
