//! Communication channel abstractions
//!
//! The engine talks to the player through a byte-oriented duplex channel and,
//! optionally, observes a digital busy line. Both are boundary collaborators
//! supplied by the caller's environment; only the serial implementation is
//! provided here.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Abstraction over the duplex byte channel the player is attached to.
///
/// Implementations must support non-blocking availability checks; the engine
/// never issues a read without first confirming bytes are waiting.
pub trait Channel: Read + Write + Send {
    /// Number of bytes waiting in the receive buffer.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard everything currently in the receive buffer.
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Digital busy line reported by the player's BUSY pin.
///
/// When wired up, the line substitutes for the status query: high means a
/// track is currently playing.
pub trait BusyLine: Send {
    /// Current level of the line; high means playing.
    fn is_high(&mut self) -> bool;
}

/// Serial port wrapper implementing [`Channel`].
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already-open serial port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Channel for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
