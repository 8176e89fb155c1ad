//! # Transmission Controller
//!
//! Buffers outgoing command bytes and pushes them to the transport in
//! MTU-sized chunks, honoring the printer's pause/resume flow control.
//!
//! ```text
//! send() ──► pending ──(len > 16 × mtu, not paused)──► flush()
//!                                                        │
//!               ┌────────────────────────────────────────┘
//!               ▼
//!     wait while paused ─► write chunk ─► sleep chunk_delay ─► next chunk
//! ```
//!
//! Chunks are written strictly in order; nothing is reordered or dropped
//! while paused. The pending buffer is not bounded while the printer holds
//! the pause.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connection::FlowControl;
use crate::error::Result;
use crate::printer::PrintConfig;
use crate::protocol::Commander;
use crate::transport::Transport;

/// A flush is forced once this many MTUs are pending.
pub const FLUSH_THRESHOLD_MTUS: usize = 16;

/// Chunked, flow-controlled writer for one print job.
pub struct TransmissionController<T: Transport> {
    transport: Arc<T>,
    flow: FlowControl,
    pending: Vec<u8>,
    mtu: usize,
    chunk_delay: Duration,
    poll_interval: Duration,
    fake: bool,
    traffic_dump: Option<File>,
    bytes_written: usize,
}

impl<T: Transport> TransmissionController<T> {
    pub fn new(transport: Arc<T>, flow: FlowControl, config: &PrintConfig) -> Self {
        Self {
            transport,
            flow,
            pending: Vec::new(),
            mtu: config.mtu.max(1),
            chunk_delay: config.chunk_delay,
            poll_interval: config.pause_poll_interval,
            fake: config.fake,
            traffic_dump: None,
            bytes_written: 0,
        }
    }

    /// Copy every command byte into `file` as it is sent.
    pub fn with_traffic_dump(mut self, file: File) -> Self {
        self.traffic_dump = Some(file);
        self
    }

    /// Write all pending bytes to the transport.
    ///
    /// Before each chunk, waits for as long as the printer holds a pause. On
    /// a transport error the unsent remainder stays pending.
    pub async fn flush(&mut self) -> Result<()> {
        let mut offset = 0;
        let mut waited = false;

        while offset < self.pending.len() {
            while self.flow.is_paused() {
                if !waited {
                    debug!(pending = self.pending.len() - offset, "printer paused, waiting");
                    waited = true;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
            if waited {
                debug!("printer resumed");
                waited = false;
            }

            let end = (offset + self.mtu).min(self.pending.len());
            if let Err(e) = self.transport.write(&self.pending[offset..end]).await {
                self.pending.drain(..offset);
                return Err(e);
            }
            self.bytes_written += end - offset;
            offset = end;

            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        self.pending.clear();
        Ok(())
    }

    /// Drop unsent bytes, e.g. after a failed write.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(bytes = dropped, "discarding unsent data");
        }
        self.pending.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bytes actually handed to the transport so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

#[async_trait]
impl<T: Transport> Commander for TransmissionController<T> {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if let Some(dump) = self.traffic_dump.as_mut() {
            dump.write_all(data)?;
        }
        if self.fake {
            return Ok(());
        }

        self.pending.extend_from_slice(data);
        if self.pending.len() > self.mtu * FLUSH_THRESHOLD_MTUS && !self.flow.is_paused() {
            self.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::printer::ModelRegistry;
    use crate::protocol::command::{DATA_FLOW_PAUSE, DATA_FLOW_RESUME};
    use crate::transport::MockTransport;

    fn config() -> PrintConfig {
        PrintConfig::default()
            .with_mtu(10)
            .with_chunk_delay(Duration::ZERO)
            .with_pause_poll_interval(Duration::from_millis(5))
    }

    async fn connected(mock: &MockTransport) -> ConnectionManager<MockTransport> {
        let mut manager =
            ConnectionManager::new(Arc::new(mock.clone()), ModelRegistry::builtin(), &config());
        manager.connect(Some("GB01"), "AA:BB:CC:DD:EE:FF").await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_flush_writes_mtu_chunks_in_order() {
        let mock = MockTransport::new();
        let manager = connected(&mock).await;
        let mut tx = TransmissionController::new(manager.transport(), manager.flow(), &config());

        let data: Vec<u8> = (0..25).collect();
        tx.send(&data).await.unwrap();
        assert_eq!(mock.write_count(), 0);

        tx.flush().await.unwrap();
        let sizes: Vec<usize> = mock.writes().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(mock.written_bytes(), data);
        assert_eq!(tx.bytes_written(), 25);
        assert_eq!(tx.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_send_forces_flush_past_threshold() {
        let mock = MockTransport::new();
        let manager = connected(&mock).await;
        let mut tx = TransmissionController::new(manager.transport(), manager.flow(), &config());

        tx.send(&[0u8; 160]).await.unwrap();
        assert_eq!(mock.write_count(), 0);
        tx.send(&[1u8]).await.unwrap();
        assert_eq!(mock.write_count(), 17);
        assert_eq!(tx.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_pause_gates_writes() {
        let mock = MockTransport::new();
        let manager = connected(&mock).await;
        mock.notify(&DATA_FLOW_PAUSE);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut tx = TransmissionController::new(manager.transport(), manager.flow(), &config());
        // Paused: the threshold is crossed but nothing is forced out
        tx.send(&[7u8; 200]).await.unwrap();
        assert_eq!(mock.write_count(), 0);

        let flush = tokio::spawn(async move {
            tx.flush().await.unwrap();
            tx
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mock.write_count(), 0);

        mock.notify(&DATA_FLOW_RESUME);
        let tx = flush.await.unwrap();
        assert_eq!(mock.written_bytes(), vec![7u8; 200]);
        assert_eq!(tx.bytes_written(), 200);
    }

    #[tokio::test]
    async fn test_write_error_keeps_remainder() {
        let mock = MockTransport::new();
        let manager = connected(&mock).await;
        let mut tx = TransmissionController::new(manager.transport(), manager.flow(), &config());

        mock.fail_writes_after(2);
        tx.send(&[3u8; 35]).await.unwrap();
        assert!(tx.flush().await.is_err());
        assert_eq!(mock.write_count(), 2);
        assert_eq!(tx.pending_len(), 15);
        assert_eq!(tx.discard_pending(), 15);
        assert_eq!(tx.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_fake_mode_discards() {
        let mock = MockTransport::new();
        let fake = config().with_fake(true);
        let mut tx = TransmissionController::new(Arc::new(mock.clone()), FlowControl::new(), &fake);
        tx.send(&[1u8; 500]).await.unwrap();
        tx.flush().await.unwrap();
        assert_eq!(tx.pending_len(), 0);
        assert_eq!(mock.write_count(), 0);
    }

    #[tokio::test]
    async fn test_traffic_dump_records_fake_traffic() {
        let dir = std::env::temp_dir().join(format!("catprint-dump-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("traffic.dump");

        let fake = config().with_fake(true);
        let mut tx = TransmissionController::new(
            Arc::new(MockTransport::new()),
            FlowControl::new(),
            &fake,
        )
        .with_traffic_dump(File::create(&path).unwrap());
        tx.send(&[1, 2]).await.unwrap();
        tx.send(&[3]).await.unwrap();
        drop(tx);

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
