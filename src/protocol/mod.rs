//! # Cat Printer Protocol Implementation
//!
//! This module provides the low-level command protocol spoken by BLE thermal
//! "cat" printers (GB01, GB03, MX05 and friends).
//!
//! ## Module Structure
//!
//! - [`crc`]: table-driven CRC-8 checksum
//! - [`command`]: frame encoding/decoding, opcodes, fixed control frames
//! - [`bits`]: bit reversal and bitmap flipping
//! - [`commander`]: the [`Commander`] trait with the printer's command set
//!
//! ## Usage Example
//!
//! ```
//! use catprint::protocol::{make_command, checksum, reverse_bits, Opcode};
//!
//! let row = [0x80u8; 48];
//! let payload: Vec<u8> = row.iter().map(|&b| reverse_bits(b)).collect();
//! let frame = make_command(Opcode::DrawBitmap as u8, &payload).unwrap();
//!
//! assert_eq!(&frame[..2], &[0x51, 0x78]);
//! assert_eq!(frame[4], 48);
//! assert_eq!(frame[frame.len() - 2], checksum(&payload));
//! ```

pub mod bits;
pub mod command;
pub mod commander;
pub mod crc;

pub use bits::{flip, flip_in_place, reverse_bits};
pub use command::{Command, Opcode, make_command, make_command_with_prefix};
pub use commander::Commander;
pub use crc::crc8 as checksum;
