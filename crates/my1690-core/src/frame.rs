//! Frame encoding
//!
//! Implements the outbound command frame format. Only the command direction
//! is framed; the player answers in plain unframed ASCII.
//!
//! Frame format:
//! - 1 byte: start marker (0x7E)
//! - 1 byte: length = payload length + 2 (covers the length byte and checksum)
//! - N bytes: payload (opcode + 0-2 parameter bytes)
//! - 1 byte: checksum = XOR of the length byte and all payload bytes
//! - 1 byte: end marker (0xEF)

use crate::commands::Command;

/// Frame start marker
pub const START_BYTE: u8 = 0x7E;
/// Frame end marker
pub const END_BYTE: u8 = 0xEF;

/// An outbound command frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame payload: opcode followed by its parameter bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame around a raw payload.
    ///
    /// No opcode validation is performed; any byte sequence is forwarded and
    /// the player is the authority on what it accepts.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Build the frame for a command.
    pub fn from_command(command: &Command) -> Self {
        Self::new(command.payload())
    }

    /// The length byte: payload length plus one for itself, one for the checksum.
    pub fn length_byte(&self) -> u8 {
        self.payload.len() as u8 + 2
    }

    /// XOR checksum over the length byte and the payload, in that order.
    pub fn checksum(&self) -> u8 {
        self.payload
            .iter()
            .fold(self.length_byte(), |crc, &byte| crc ^ byte)
    }

    /// Encode the frame to raw bytes ready for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(START_BYTE);
        bytes.push(self.length_byte());
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.checksum());
        bytes.push(END_BYTE);
        bytes
    }

    /// Total encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        self.payload.len() + 4
    }
}
