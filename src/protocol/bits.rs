//! # Bit-Level Bitmap Transforms
//!
//! Bitmaps are stored the PBM way: 1 bit per pixel, MSB = leftmost pixel,
//! 1 = black. The printer wants the opposite bit order inside each byte
//! (LSB = leftmost), so every row goes through [`reverse_bits`] on its way out.
//!
//! ```text
//! 0b1100_0001  ──reverse_bits──►  0b1000_0011
//! ██░░░░░█                        █░░░░░██   (as seen by the printer)
//! ```

/// Mirror the bit order of a byte.
///
/// This is an involution: applying it twice yields the original byte.
///
/// ```
/// use catprint::protocol::bits::reverse_bits;
///
/// assert_eq!(reverse_bits(0b1100_0001), 0b1000_0011);
/// assert_eq!(reverse_bits(reverse_bits(0x5A)), 0x5A);
/// ```
#[inline]
pub fn reverse_bits(byte: u8) -> u8 {
    let b = ((byte & 0b1010_1010) >> 1) | ((byte & 0b0101_0101) << 1);
    let b = ((b & 0b1100_1100) >> 2) | ((b & 0b0011_0011) << 2);
    ((b & 0b1111_0000) >> 4) | ((b & 0b0000_1111) << 4)
}

/// Flip a row-major monochrome bitmap, returning the result as new bytes.
///
/// - `horizontal`: mirror each row (bit order within bytes, then byte order)
/// - `vertical`: reverse the row order
///
/// `width` is in pixels; each row is `width / 8` bytes. Only the first
/// `height` rows of `buffer` are considered. With both flags false the
/// buffer is returned unchanged.
pub fn flip(buffer: &[u8], width: usize, height: usize, horizontal: bool, vertical: bool) -> Vec<u8> {
    let data_width = width / 8;
    if data_width == 0 || (!horizontal && !vertical) {
        return buffer.to_vec();
    }
    let rows = height.min(buffer.len() / data_width);
    let mut out = Vec::with_capacity(rows * data_width);

    let mut push_row = |row: &[u8]| {
        if horizontal {
            out.extend(row.iter().rev().map(|&b| reverse_bits(b)));
        } else {
            out.extend_from_slice(row);
        }
    };

    let row_at = |i: usize| &buffer[i * data_width..(i + 1) * data_width];
    if vertical {
        for i in (0..rows).rev() {
            push_row(row_at(i));
        }
    } else {
        for i in 0..rows {
            push_row(row_at(i));
        }
    }
    out
}

/// Flip a bitmap and write the result back into `buffer`.
///
/// Bytes past the last complete row are left untouched.
pub fn flip_in_place(buffer: &mut [u8], width: usize, height: usize, horizontal: bool, vertical: bool) {
    if !horizontal && !vertical {
        return;
    }
    let flipped = flip(buffer, width, height, horizontal, vertical);
    buffer[..flipped.len()].copy_from_slice(&flipped);
}
