//! # Printer Command Set
//!
//! [`Commander`] turns printer instructions into framed bytes and hands them
//! to [`Commander::send`], the one method an implementor provides. The
//! [`TransmissionController`](crate::transmit::TransmissionController) is the
//! production implementor; tests can implement it over a plain `Vec<u8>`.
//!
//! | Method | Opcode | Payload |
//! |--------|--------|---------|
//! | `start_printing` | a3 | `00` |
//! | `start_printing_new` | a3 | `00`, frame prefixed with `12` |
//! | `get_device_state` | a3 | `00` |
//! | `set_dpi_as_200` | a4 | `32` |
//! | `start_lattice` / `end_lattice` | a6 | 11-byte marker |
//! | `get_device_info` | a8 | `00` |
//! | `update_device` | a9 | `00` |
//! | `set_energy` | af | u16 LE |
//! | `set_speed` | bd | u8 |
//! | `apply_energy` | be | `01` |
//! | `retract_paper` / `feed_paper` | a0 / a1 | u16 LE pixels |
//! | `draw_bitmap` | a2 | one bit-reversed row |

use async_trait::async_trait;

use super::bits::reverse_bits;
use super::command::{
    LATTICE_END, LATTICE_START, NEW_KIND_PREFIX, Opcode, make_command, make_command_with_prefix,
};
use crate::error::Result;

/// DPI selector value for 200 DPI.
pub const DPI_200: u8 = 50;

/// Sink for printer commands.
#[async_trait]
pub trait Commander: Send {
    /// Send raw bytes to the device, or wherever the implementor chooses.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Start printing.
    async fn start_printing(&mut self) -> Result<()> {
        let frame = make_command(Opcode::DeviceState as u8, &[0x00])?;
        self.send(&frame).await
    }

    /// Start printing on newer devices that expect a `0x12` prefix.
    async fn start_printing_new(&mut self) -> Result<()> {
        let frame = make_command_with_prefix(&[NEW_KIND_PREFIX], Opcode::DeviceState as u8, &[0x00])?;
        self.send(&frame).await
    }

    /// Apply the previously set thermal energy.
    async fn apply_energy(&mut self) -> Result<()> {
        let frame = make_command(Opcode::ApplyEnergy as u8, &[0x01])?;
        self.send(&frame).await
    }

    /// Query device state.
    async fn get_device_state(&mut self) -> Result<()> {
        let frame = make_command(Opcode::DeviceState as u8, &[0x00])?;
        self.send(&frame).await
    }

    /// Query device info.
    async fn get_device_info(&mut self) -> Result<()> {
        let frame = make_command(Opcode::DeviceInfo as u8, &[0x00])?;
        self.send(&frame).await
    }

    /// Refresh device state and apply configuration.
    async fn update_device(&mut self) -> Result<()> {
        let frame = make_command(Opcode::UpdateDevice as u8, &[0x00])?;
        self.send(&frame).await
    }

    async fn set_dpi_as_200(&mut self) -> Result<()> {
        let frame = make_command(Opcode::SetDpi as u8, &[DPI_200])?;
        self.send(&frame).await
    }

    /// Mark the start of the bitmap stream.
    async fn start_lattice(&mut self) -> Result<()> {
        let frame = make_command(Opcode::Lattice as u8, &LATTICE_START)?;
        self.send(&frame).await
    }

    /// Mark the end of the bitmap stream.
    async fn end_lattice(&mut self) -> Result<()> {
        let frame = make_command(Opcode::Lattice as u8, &LATTICE_END)?;
        self.send(&frame).await
    }

    /// Retract the paper by some pixels.
    async fn retract_paper(&mut self, pixels: u16) -> Result<()> {
        let frame = make_command(Opcode::RetractPaper as u8, &pixels.to_le_bytes())?;
        self.send(&frame).await
    }

    /// Feed the paper by some pixels.
    async fn feed_paper(&mut self, pixels: u16) -> Result<()> {
        let frame = make_command(Opcode::FeedPaper as u8, &pixels.to_le_bytes())?;
        self.send(&frame).await
    }

    /// Set how quickly paper moves. **Lower is quicker.**
    ///
    /// Values below 4 can leave the motor unable to feed. Slower speeds give
    /// the head more time to heat, which improves quality.
    async fn set_speed(&mut self, value: u8) -> Result<()> {
        let frame = make_command(Opcode::SetSpeed as u8, &[value])?;
        self.send(&frame).await
    }

    /// Set thermal energy, `0x0000..=0xffff`. Devices default to about `0x3000`.
    async fn set_energy(&mut self, amount: u16) -> Result<()> {
        let frame = make_command(Opcode::SetEnergy as u8, &amount.to_le_bytes())?;
        self.send(&frame).await
    }

    /// Print one row of bitmap data (MSB-first), reversing bits for the device.
    async fn draw_bitmap(&mut self, row: &[u8]) -> Result<()> {
        let data: Vec<u8> = row.iter().map(|&b| reverse_bits(b)).collect();
        let frame = make_command(Opcode::DrawBitmap as u8, &data)?;
        self.send(&frame).await
    }

    /// Print one row, compressing it when the device supports it.
    ///
    /// Compression is not implemented; this sends the row uncompressed.
    async fn draw_compressed_bitmap(&mut self, row: &[u8]) -> Result<()> {
        self.draw_bitmap(row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{Command, decode_stream};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder(Vec<u8>);

    #[async_trait]
    impl Commander for Recorder {
        async fn send(&mut self, data: &[u8]) -> Result<()> {
            self.0.extend_from_slice(data);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_printing_bytes() {
        let mut rec = Recorder::default();
        rec.start_printing().await.unwrap();
        assert_eq!(rec.0, vec![0x51, 0x78, 0xa3, 0x00, 0x01, 0x00, 0x00, 0x00, 0xff]);
    }

    #[tokio::test]
    async fn test_start_printing_new_bytes() {
        let mut rec = Recorder::default();
        rec.start_printing_new().await.unwrap();
        assert_eq!(
            rec.0,
            vec![0x12, 0x51, 0x78, 0xa3, 0x00, 0x01, 0x00, 0x00, 0x00, 0xff]
        );
    }

    #[tokio::test]
    async fn test_feed_paper_little_endian() {
        let mut rec = Recorder::default();
        rec.feed_paper(0x0180).await.unwrap();
        let command = Command::decode(&rec.0).unwrap();
        assert_eq!(command.opcode, 0xa1);
        assert_eq!(command.payload, vec![0x80, 0x01]);
    }

    #[tokio::test]
    async fn test_set_energy_little_endian() {
        let mut rec = Recorder::default();
        rec.set_energy(0x3000).await.unwrap();
        let command = Command::decode(&rec.0).unwrap();
        assert_eq!(command.opcode, 0xaf);
        assert_eq!(command.payload, vec![0x00, 0x30]);
    }

    #[tokio::test]
    async fn test_draw_bitmap_reverses_bits() {
        let mut rec = Recorder::default();
        rec.draw_bitmap(&[0x80, 0x0F]).await.unwrap();
        let command = Command::decode(&rec.0).unwrap();
        assert_eq!(command.opcode, 0xa2);
        assert_eq!(command.payload, vec![0x01, 0xF0]);
    }

    #[tokio::test]
    async fn test_draw_bitmap_rejects_oversized_row() {
        let mut rec = Recorder::default();
        assert!(rec.draw_bitmap(&[0u8; 256]).await.is_err());
        assert!(rec.0.is_empty());
    }

    #[tokio::test]
    async fn test_compressed_bitmap_falls_back() {
        let mut plain = Recorder::default();
        let mut compressed = Recorder::default();
        plain.draw_bitmap(&[0xAA; 48]).await.unwrap();
        compressed.draw_compressed_bitmap(&[0xAA; 48]).await.unwrap();
        assert_eq!(plain.0, compressed.0);
    }

    #[tokio::test]
    async fn test_lattice_markers() {
        let mut rec = Recorder::default();
        rec.start_lattice().await.unwrap();
        rec.end_lattice().await.unwrap();
        let commands = decode_stream(&rec.0).unwrap();
        assert_eq!(commands[0].payload, LATTICE_START.to_vec());
        assert_eq!(commands[1].payload, LATTICE_END.to_vec());
    }
}
