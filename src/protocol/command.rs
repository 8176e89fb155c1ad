//! # Command Frames
//!
//! Every instruction sent to the printer is wrapped in the same frame:
//!
//! ```text
//! ┌──────┬──────┬────────┬──────┬─────┬──────┬─────────────┬─────┬──────┐
//! │ 0x51 │ 0x78 │ opcode │ 0x00 │ len │ 0x00 │ payload ... │ crc │ 0xFF │
//! └──────┴──────┴────────┴──────┴─────┴──────┴─────────────┴─────┴──────┘
//! ```
//!
//! - `len` is a single byte, so a payload holds at most 255 bytes
//! - `crc` is [`crc8`](super::crc::crc8) over the payload only
//! - some devices expect a leading `0x12` on the "start printing" frame
//!
//! Multi-byte integer parameters are little-endian.

use super::crc::crc8;
use crate::error::{PrinterError, Result};

/// Frame magic, first two bytes of every command.
pub const MAGIC: [u8; 2] = [0x51, 0x78];

/// Frame trailer byte.
pub const TRAILER: u8 = 0xFF;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = 0xFF;

/// Bytes of framing around the payload (6 header + crc + trailer).
pub const FRAME_OVERHEAD: usize = 8;

/// Prefix byte of the "start printing" frame on newer devices.
pub const NEW_KIND_PREFIX: u8 = 0x12;

/// Notification sent by the printer when its buffer is full.
pub const DATA_FLOW_PAUSE: [u8; 9] = [0x51, 0x78, 0xae, 0x01, 0x01, 0x00, 0x10, 0x70, 0xff];

/// Notification sent by the printer when it can take more data.
pub const DATA_FLOW_RESUME: [u8; 9] = [0x51, 0x78, 0xae, 0x01, 0x01, 0x00, 0x00, 0x00, 0xff];

/// Payload of the lattice frame that opens a bitmap stream.
pub const LATTICE_START: [u8; 11] = [
    0xaa, 0x55, 0x17, 0x38, 0x44, 0x5f, 0x5f, 0x5f, 0x44, 0x38, 0x2c,
];

/// Payload of the lattice frame that closes a bitmap stream.
pub const LATTICE_END: [u8; 11] = [
    0xaa, 0x55, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
];

/// Command opcodes understood by the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Retract paper by N pixels (u16)
    RetractPaper = 0xa0,
    /// Feed paper by N pixels (u16)
    FeedPaper = 0xa1,
    /// One row of bitmap data, LSB = leftmost pixel
    DrawBitmap = 0xa2,
    /// Query device state / start printing
    DeviceState = 0xa3,
    /// Resolution selector (50 = 200 DPI)
    SetDpi = 0xa4,
    /// Lattice start/end marker
    Lattice = 0xa6,
    /// Query device info
    DeviceInfo = 0xa8,
    /// Refresh device state and apply configuration
    UpdateDevice = 0xa9,
    /// Flow-control notifications (device to host)
    DataFlow = 0xae,
    /// Thermal energy (u16)
    SetEnergy = 0xaf,
    /// Paper speed, lower is faster
    SetSpeed = 0xbd,
    /// Apply previously set energy
    ApplyEnergy = 0xbe,
}

impl Opcode {
    /// Look up an opcode by its wire value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0xa0 => Self::RetractPaper,
            0xa1 => Self::FeedPaper,
            0xa2 => Self::DrawBitmap,
            0xa3 => Self::DeviceState,
            0xa4 => Self::SetDpi,
            0xa6 => Self::Lattice,
            0xa8 => Self::DeviceInfo,
            0xa9 => Self::UpdateDevice,
            0xae => Self::DataFlow,
            0xaf => Self::SetEnergy,
            0xbd => Self::SetSpeed,
            0xbe => Self::ApplyEnergy,
            _ => return None,
        })
    }
}

/// A single decoded command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Command {
    /// Build a command, computing its checksum.
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(PrinterError::PayloadTooLarge {
                size: payload.len(),
            });
        }
        let checksum = crc8(&payload);
        Ok(Self {
            opcode,
            payload,
            checksum,
        })
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        out.extend(MAGIC);
        out.extend([self.opcode, 0x00, self.payload.len() as u8, 0x00]);
        out.extend(&self.payload);
        out.extend([self.checksum, TRAILER]);
        out
    }

    /// Decode one frame. The input must be exactly one frame with no prefix.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(PrinterError::InvalidFrame(format!(
                "frame too short ({} bytes)",
                frame.len()
            )));
        }
        if frame[..2] != MAGIC {
            return Err(PrinterError::InvalidFrame(format!(
                "bad magic {:02x} {:02x}",
                frame[0], frame[1]
            )));
        }
        let len = frame[4] as usize;
        if frame.len() != len + FRAME_OVERHEAD {
            return Err(PrinterError::InvalidFrame(format!(
                "length byte says {} but frame carries {}",
                len,
                frame.len() - FRAME_OVERHEAD
            )));
        }
        if frame[frame.len() - 1] != TRAILER {
            return Err(PrinterError::InvalidFrame("missing 0xff trailer".to_string()));
        }
        let payload = frame[6..6 + len].to_vec();
        let checksum = frame[6 + len];
        let expected = crc8(&payload);
        if checksum != expected {
            return Err(PrinterError::InvalidFrame(format!(
                "checksum {:#04x}, expected {:#04x}",
                checksum, expected
            )));
        }
        Ok(Self {
            opcode: frame[2],
            payload,
            checksum,
        })
    }
}

/// Build the wire bytes of a command.
///
/// ## Example
///
/// ```
/// use catprint::protocol::command::{make_command, Opcode};
///
/// let frame = make_command(Opcode::SetDpi as u8, &[50]).unwrap();
/// assert_eq!(frame, vec![0x51, 0x78, 0xa4, 0x00, 0x01, 0x00, 50, 0x9e, 0xff]);
/// ```
pub fn make_command(opcode: u8, payload: &[u8]) -> Result<Vec<u8>> {
    make_command_with_prefix(&[], opcode, payload)
}

/// Build the wire bytes of a command with arbitrary leading bytes.
pub fn make_command_with_prefix(prefix: &[u8], opcode: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let command = Command::new(opcode, payload)?;
    let mut out = Vec::with_capacity(prefix.len() + payload.len() + FRAME_OVERHEAD);
    out.extend_from_slice(prefix);
    out.extend(command.encode());
    Ok(out)
}

/// Split a byte stream of back-to-back frames into commands.
///
/// A leading `0x12` before a frame is skipped. Used to inspect traffic dumps.
pub fn decode_stream(mut data: &[u8]) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    while !data.is_empty() {
        if data[0] == NEW_KIND_PREFIX {
            data = &data[1..];
            continue;
        }
        if data.len() < FRAME_OVERHEAD {
            return Err(PrinterError::InvalidFrame(format!(
                "{} trailing bytes",
                data.len()
            )));
        }
        let end = data[4] as usize + FRAME_OVERHEAD;
        if data.len() < end {
            return Err(PrinterError::InvalidFrame("truncated frame".to_string()));
        }
        commands.push(Command::decode(&data[..end])?);
        data = &data[end..];
    }
    Ok(commands)
}
