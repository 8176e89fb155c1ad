//! # Bounded Bitmap Store
//!
//! [`BitmapStore`] accumulates monochrome bitmap rows for one print job. It
//! never grows past `max_size` bytes: a write that would cross the limit
//! rewinds the cursor to offset 0 and overwrites the oldest rows instead.
//!
//! ```text
//!          cursor
//!            ▼
//! ┌──────────┬───────────────────────┐
//! │ new rows │ old rows (still here) │   after the first wrap: full = true
//! └──────────┴───────────────────────┘
//! 0                              max_size
//! ```
//!
//! Once full, `height()` is pinned to `max_size / data_width` and each further
//! wrap drops the oldest entry of `pages`.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{PrinterError, Result};
use crate::protocol::bits::flip_in_place;

/// Default byte capacity of a store (64 MiB).
pub const DEFAULT_MAX_SIZE: usize = 64 * 1024 * 1024;

/// A capacity-bounded monochrome bitmap with page tracking.
#[derive(Debug, Clone)]
pub struct BitmapStore {
    width: usize,
    data_width: usize,
    data: Vec<u8>,
    cursor: usize,
    height: usize,
    pub(super) pages: VecDeque<usize>,
    max_size: usize,
    full: bool,
}

impl BitmapStore {
    /// Create an empty store for rows of `width` pixels.
    ///
    /// ## Errors
    ///
    /// `width` must be a positive multiple of 8.
    pub fn new(width: usize) -> Result<Self> {
        Self::with_max_size(width, DEFAULT_MAX_SIZE)
    }

    /// Create an empty store with a custom byte capacity.
    ///
    /// ## Errors
    ///
    /// `width` must be a positive multiple of 8 and `max_size` must hold at
    /// least one row.
    pub fn with_max_size(width: usize, max_size: usize) -> Result<Self> {
        if width == 0 || width % 8 != 0 {
            return Err(PrinterError::Config(format!(
                "bitmap width {} is not a positive multiple of 8",
                width
            )));
        }
        let data_width = width / 8;
        if max_size < data_width {
            return Err(PrinterError::Config(format!(
                "max size {} is smaller than one row ({} bytes)",
                max_size, data_width
            )));
        }
        Ok(Self {
            width,
            data_width,
            data: Vec::new(),
            cursor: 0,
            height: 0,
            pages: VecDeque::new(),
            max_size,
            full: false,
        })
    }

    /// Write bitmap bytes at the cursor, returning the cursor position after
    /// the write.
    ///
    /// If the write would cross `max_size`, the store becomes full and the
    /// cursor restarts at 0, overwriting the oldest bytes. A single write
    /// longer than `max_size` keeps only its last `max_size` bytes.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let bytes = if bytes.len() > self.max_size {
            self.wrap();
            &bytes[bytes.len() - self.max_size..]
        } else {
            bytes
        };

        if self.cursor + bytes.len() > self.max_size {
            self.wrap();
        }

        let end = self.cursor + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;

        if !self.full {
            self.height = self.cursor / self.data_width;
        }
        self.cursor
    }

    fn wrap(&mut self) {
        if !self.full {
            debug!(max_size = self.max_size, "bitmap store full, overwriting oldest rows");
        }
        self.full = true;
        self.cursor = 0;
        if let Some(rows) = self.pages.pop_front() {
            debug!(rows, "evicted oldest page");
        }
    }

    /// Iterate over the stored bytes from offset 0 in chunks of `chunk_size`.
    ///
    /// The iterator is finite and the cursor is untouched, so this can be
    /// called any number of times.
    pub fn read_all(&self, chunk_size: usize) -> impl Iterator<Item = &[u8]> + '_ {
        self.data.chunks(chunk_size.max(1))
    }

    /// Flip the stored bitmap in place.
    pub fn flip(&mut self, horizontal: bool, vertical: bool) {
        let height = self.height();
        flip_in_place(&mut self.data, self.width, height, horizontal, vertical);
    }

    /// Record a page of `rows` rows.
    pub(crate) fn push_page(&mut self, rows: usize) {
        self.pages.push_back(rows);
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Bytes per row.
    pub fn data_width(&self) -> usize {
        self.data_width
    }

    /// Number of rows held.
    pub fn height(&self) -> usize {
        if self.full {
            self.max_size / self.data_width
        } else {
            self.height
        }
    }

    /// Row counts of the pages still held, oldest first.
    pub fn pages(&self) -> &VecDeque<usize> {
        &self.pages
    }

    /// Whether the store has wrapped at least once.
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current write position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejects_bad_width() {
        assert!(BitmapStore::new(0).is_err());
        assert!(BitmapStore::new(383).is_err());
        assert!(BitmapStore::new(384).is_ok());
    }

    #[test]
    fn test_rejects_tiny_max_size() {
        assert!(BitmapStore::with_max_size(384, 47).is_err());
        assert!(BitmapStore::with_max_size(384, 48).is_ok());
    }

    #[test]
    fn test_write_tracks_height() {
        let mut store = BitmapStore::new(16).unwrap();
        assert_eq!(store.write(&[0xFF, 0x00]), 2);
        assert_eq!(store.write(&[0x0F, 0xF0, 0xAA, 0x55]), 6);
        assert_eq!(store.height(), 3);
        assert!(!store.is_full());
    }

    #[test]
    fn test_ring_overwrite() {
        // 4 rows of 2 bytes
        let mut store = BitmapStore::with_max_size(16, 8).unwrap();
        store.push_page(2);
        store.write(&[1, 1, 2, 2]);
        store.push_page(2);
        store.write(&[3, 3, 4, 4]);
        assert!(!store.is_full());
        assert_eq!(store.height(), 4);

        store.push_page(1);
        let cursor = store.write(&[5, 5]);
        assert_eq!(cursor, 2);
        assert!(store.is_full());
        assert_eq!(store.height(), 4);
        assert_eq!(store.as_bytes(), &[5, 5, 2, 2, 3, 3, 4, 4]);
        assert_eq!(store.pages().iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_height_pinned_when_full() {
        let mut store = BitmapStore::with_max_size(8, 5).unwrap();
        for i in 0..20u8 {
            store.write(&[i]);
        }
        assert!(store.is_full());
        assert_eq!(store.height(), 5);
        assert!(store.as_bytes().len() <= 5);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut store = BitmapStore::with_max_size(8, 4).unwrap();
        store.write(&[1, 2, 3, 4, 5, 6]);
        assert!(store.is_full());
        assert_eq!(store.as_bytes(), &[3, 4, 5, 6]);
        assert_eq!(store.cursor(), 4);
    }

    #[test]
    fn test_read_all_is_restartable() {
        let mut store = BitmapStore::new(16).unwrap();
        store.write(&[1, 2, 3, 4, 5]);
        let first: Vec<&[u8]> = store.read_all(2).collect();
        let second: Vec<&[u8]> = store.read_all(2).collect();
        assert_eq!(first, vec![&[1, 2][..], &[3, 4][..], &[5][..]]);
        assert_eq!(first, second);
        assert_eq!(store.cursor(), 5);
    }

    #[test]
    fn test_flip_vertical() {
        let mut store = BitmapStore::new(8).unwrap();
        store.write(&[1, 2, 3]);
        store.flip(false, true);
        assert_eq!(store.as_bytes(), &[3, 2, 1]);
    }
}
