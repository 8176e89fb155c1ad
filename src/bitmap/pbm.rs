//! # PBM Import and Export
//!
//! Raw PBM (`P4`) is the native input format of the printer pipeline:
//!
//! ```text
//! P4\n
//! # optional comment lines\n
//! <width> <height>\n
//! <packed rows: ceil(width / 8) bytes each, MSB = leftmost, 1 = black>
//! ```
//!
//! Several images may be concatenated in one stream. Each becomes a page of
//! the [`BitmapStore`]; every page must have the store's width.

use std::io::{BufRead, Read, Write};

use tracing::debug;

use super::store::BitmapStore;
use crate::error::{PrinterError, Result};

/// Read block size while ingesting a page (4 MiB).
const READ_BUFFER: usize = 4 * 1024 * 1024;

/// Build a PBM header for an image of the given size.
pub fn pbm_header(width: usize, height: usize) -> Vec<u8> {
    format!("P4\n{} {}\n", width, height).into_bytes()
}

fn parse_dimensions(line: &[u8]) -> Result<(usize, usize)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| PrinterError::InvalidHeader("dimensions are not ASCII".to_string()))?;
    let mut parts = text.split_ascii_whitespace().map(str::parse::<usize>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(width)), Some(Ok(height)), None) => Ok((width, height)),
        _ => Err(PrinterError::InvalidHeader(format!(
            "expected 'width height', got {:?}",
            text.trim_end()
        ))),
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl BitmapStore {
    /// Create a store of `width` pixels and fill it from a PBM stream.
    pub fn from_pbm_reader<R: BufRead>(width: usize, reader: R) -> Result<Self> {
        let mut store = Self::new(width)?;
        store.from_pbm(reader)?;
        Ok(store)
    }

    /// Append every PBM page in `reader` to the store.
    ///
    /// ## Errors
    ///
    /// - [`PrinterError::NotPbm`] if a page does not start with `P4`
    /// - [`PrinterError::InvalidHeader`] if the dimensions line is malformed
    /// - [`PrinterError::UnsupportedWidth`] if a page width differs from the store's
    /// - [`PrinterError::TruncatedImage`] if a page body ends early
    pub fn from_pbm<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if line.trim_ascii().is_empty() {
                continue;
            }
            if line.trim_ascii() != b"P4" {
                return Err(PrinterError::NotPbm);
            }

            let (width, height) = loop {
                line.clear();
                if reader.read_until(b'\n', &mut line)? == 0 {
                    return Err(PrinterError::InvalidHeader("missing dimensions".to_string()));
                }
                if !line.starts_with(b"#") {
                    break parse_dimensions(&line)?;
                }
            };
            if width != self.width() {
                return Err(PrinterError::UnsupportedWidth {
                    expected: self.width(),
                    got: width,
                });
            }

            self.read_page(&mut reader, height)?;
            self.push_page(height);
            debug!(width, height, "read PBM page");
        }
        Ok(())
    }

    fn read_page<R: Read>(&mut self, reader: &mut R, height: usize) -> Result<()> {
        let data_width = self.data_width();
        let expected = data_width * height;
        let block_rows = (READ_BUFFER / data_width).max(1);
        let mut block = vec![0u8; (block_rows * data_width).min(expected)];
        let mut total = 0;

        while total < expected {
            let want = block.len().min(expected - total);
            let got = read_full(reader, &mut block[..want])?;
            if got < want {
                // Keep the complete rows that did arrive
                for row in block[..got - got % data_width].chunks(data_width) {
                    self.write(row);
                }
                return Err(PrinterError::TruncatedImage {
                    expected,
                    got: total + got,
                });
            }
            for row in block[..got].chunks(data_width) {
                self.write(row);
            }
            total += got;
        }
        Ok(())
    }

    /// Re-emit the stored bitmap as PBM.
    ///
    /// With `merge_pages` a single image of `height()` rows is produced,
    /// otherwise one image per page. Content is read from offset 0, so after
    /// an overwrite the blocks reflect the ring layout rather than the input.
    /// Headers always declare the rows actually emitted.
    pub fn to_pbm(&self, merge_pages: bool) -> Box<dyn Iterator<Item = Vec<u8>> + '_> {
        let data = self.as_bytes();
        let width = self.width();
        let data_width = self.data_width();

        if merge_pages {
            let end = (self.height() * data_width).min(data.len());
            let mut block = pbm_header(width, end / data_width);
            block.extend_from_slice(&data[..end]);
            return Box::new(std::iter::once(block));
        }

        let mut offset = 0;
        Box::new(self.pages().iter().map(move |&rows| {
            let start = offset.min(data.len());
            let end = (offset + rows * data_width).min(data.len());
            offset += rows * data_width;
            let mut block = pbm_header(width, (end - start) / data_width);
            block.extend_from_slice(&data[start..end]);
            block
        }))
    }

    /// Write the stored bitmap as PBM to `writer`.
    pub fn write_pbm<W: Write>(&self, mut writer: W, merge_pages: bool) -> Result<()> {
        for block in self.to_pbm(merge_pages) {
            writer.write_all(&block)?;
        }
        writer.flush()?;
        Ok(())
    }
}
