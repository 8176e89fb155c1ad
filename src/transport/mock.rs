//! # Mock Transport
//!
//! An in-memory [`Transport`] that records every write and lets tests push
//! notifications as if they came from a printer. Clones share state, so a
//! test keeps one handle while the driver owns another.
//!
//! ```
//! # tokio_test_block(async {
//! use catprint::transport::{MockTransport, Transport};
//!
//! let mock = MockTransport::new();
//! mock.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
//! mock.write(&[1, 2, 3]).await.unwrap();
//! assert_eq!(mock.written_bytes(), vec![1, 2, 3]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;

use super::{DiscoveredDevice, NotificationStream, Transport};
use crate::error::{PrinterError, Result};

#[derive(Default)]
struct MockState {
    devices: Mutex<Vec<DiscoveredDevice>>,
    writes: Mutex<Vec<Vec<u8>>>,
    connected: Mutex<Option<String>>,
    notifier: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    discovers: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_writes_after: Mutex<Option<usize>>,
    fail_one_write_after: Mutex<Option<usize>>,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    connect_delay: Mutex<Duration>,
}

/// Recording transport for tests and offline runs.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices returned by `discover`.
    pub fn with_devices(self, devices: Vec<DiscoveredDevice>) -> Self {
        *lock(&self.state.devices) = devices;
        self
    }

    /// Keep `connect` busy for `delay` after the link is up, like a slow
    /// GATT service discovery.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *lock(&self.state.connect_delay) = delay;
        self
    }

    /// Deliver a notification to the current subscriber.
    ///
    /// Returns `false` if nobody is subscribed.
    pub fn notify(&self, payload: &[u8]) -> bool {
        match lock(&self.state.notifier).as_ref() {
            Some(tx) => tx.unbounded_send(payload.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Let `n` more writes succeed, then fail every write after that.
    pub fn fail_writes_after(&self, n: usize) {
        *lock(&self.state.fail_writes_after) = Some(n);
    }

    /// Let `n` more writes succeed, fail the next one, then recover.
    pub fn fail_one_write_after(&self, n: usize) {
        *lock(&self.state.fail_one_write_after) = Some(n);
    }

    pub fn fail_connect(&self, enabled: bool) {
        self.state.fail_connect.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, enabled: bool) {
        self.state.fail_disconnect.store(enabled, Ordering::SeqCst);
    }

    /// Every chunk written, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state.writes).clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        lock(&self.state.writes).concat()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.state.writes).len()
    }

    pub fn connected_address(&self) -> Option<String> {
        lock(&self.state.connected).clone()
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state.notifier).is_some()
    }

    pub fn discover_count(&self) -> usize {
        self.state.discovers.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn discover(&self, _duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        self.state.discovers.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state.devices).clone())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(PrinterError::Transport(format!(
                "mock connect to {} refused",
                address
            )));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.state.connected) = Some(address.to_string());
        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        if lock(&self.state.connected).is_none() {
            return Err(PrinterError::Transport("not connected".to_string()));
        }
        let (tx, rx) = mpsc::unbounded();
        *lock(&self.state.notifier) = Some(tx);
        Ok(rx.boxed())
    }

    async fn unsubscribe(&self) -> Result<()> {
        lock(&self.state.notifier).take();
        Ok(())
    }

    async fn write(&self, chunk: &[u8]) -> Result<()> {
        if lock(&self.state.connected).is_none() {
            return Err(PrinterError::Transport("not connected".to_string()));
        }
        {
            let mut budget = lock(&self.state.fail_writes_after);
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(PrinterError::Transport("mock write failed".to_string()));
                }
                *remaining -= 1;
            }
        }
        {
            let mut once = lock(&self.state.fail_one_write_after);
            if *once == Some(0) {
                *once = None;
                return Err(PrinterError::Transport("mock write failed once".to_string()));
            }
            if let Some(remaining) = once.as_mut() {
                *remaining -= 1;
            }
        }
        lock(&self.state.writes).push(chunk.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.notifier).take();
        lock(&self.state.connected).take();
        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(PrinterError::Transport("mock disconnect failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mock = MockTransport::new();
        assert!(mock.write(&[1]).await.is_err());
        mock.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        mock.write(&[1]).await.unwrap();
        assert_eq!(mock.writes(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn test_notifications_reach_subscriber() {
        let mock = MockTransport::new();
        assert!(!mock.notify(&[1]));
        mock.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        let mut stream = mock.subscribe().await.unwrap();
        assert!(mock.notify(&[9, 9]));
        assert_eq!(stream.next().await, Some(vec![9, 9]));

        mock.unsubscribe().await.unwrap();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_write_failure_budget() {
        let mock = MockTransport::new();
        mock.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        mock.fail_writes_after(1);
        assert!(mock.write(&[1]).await.is_ok());
        assert!(mock.write(&[2]).await.is_err());
        assert_eq!(mock.write_count(), 1);
    }

    #[tokio::test]
    async fn test_single_write_failure() {
        let mock = MockTransport::new();
        mock.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        mock.fail_one_write_after(1);
        assert!(mock.write(&[1]).await.is_ok());
        assert!(mock.write(&[2]).await.is_err());
        assert!(mock.write(&[3]).await.is_ok());
        assert_eq!(mock.writes(), vec![vec![1], vec![3]]);
    }
}
