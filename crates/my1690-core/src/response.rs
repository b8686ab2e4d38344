//! Response acquisition and decoding
//!
//! The player answers in plain unframed ASCII, one character at a time and
//! sometimes several milliseconds apart. All waiting is cooperative: check
//! for available data, else sleep a tick. Two distinct timeouts apply: an
//! overall wait for the first byte, and a much shorter inter-byte escape
//! budget once a reply has started arriving. Giving up mid-reply returns
//! whatever was decoded so far, so a numeric 0 is ambiguous between "true
//! zero" and "nothing arrived" -- the player itself cannot signal failure.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::channel::Channel;
use crate::dialect::DeviceDialect;

/// Polling tick between receive-buffer checks.
///
/// At 9600 baud one character takes about 0.8 ms, so a 1 ms tick never lags
/// more than one character behind the wire.
pub(crate) const POLL_TICK: Duration = Duration::from_millis(1);

/// Consecutive empty polls tolerated between reply bytes before giving up
/// with a partial result.
const INTER_BYTE_LIMIT: u8 = 10;

/// Default number of ticks to wait for the first reply byte.
pub const DEFAULT_RESPONSE_TIMEOUT_TICKS: u32 = 100;

/// Hex field widths used by numeric replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// Four hex digits: every numeric query except the version number.
    Standard,
    /// Three hex digits: version replies from revised firmware.
    Short,
}

impl FieldWidth {
    /// Number of hex digits in the field.
    pub fn digits(self) -> usize {
        match self {
            FieldWidth::Standard => 4,
            FieldWidth::Short => 3,
        }
    }
}

/// Reads one reply from the channel under the engine's timing rules.
///
/// A reader is scoped to a single request/response exchange; nothing it
/// decodes persists beyond the call. Unread trailing bytes are left in the
/// channel for the next command's leading buffer drain to discard.
pub(crate) struct ResponseReader<'a> {
    channel: &'a mut dyn Channel,
    timeout_ticks: u32,
}

impl<'a> ResponseReader<'a> {
    pub fn new(channel: &'a mut dyn Channel, timeout_ticks: u32) -> Self {
        Self {
            channel,
            timeout_ticks,
        }
    }

    /// Wait for the first reply byte to appear.
    ///
    /// Returns false if nothing arrived within the overall timeout; no bytes
    /// are consumed in that case.
    fn response_available(&mut self) -> io::Result<bool> {
        let mut counter = 0u32;
        while self.channel.bytes_to_read()? == 0 {
            if counter >= self.timeout_ticks {
                trace!(ticks = self.timeout_ticks, "no reply within overall timeout");
                return Ok(false);
            }
            counter += 1;
            thread::sleep(POLL_TICK);
        }
        Ok(true)
    }

    /// Read the next reply byte, tolerating short inter-byte gaps.
    ///
    /// Returns None once more than [`INTER_BYTE_LIMIT`] consecutive polls
    /// come up empty; the caller then settles for what it has decoded.
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut escape = 0u8;
        while self.channel.bytes_to_read()? == 0 {
            if escape >= INTER_BYTE_LIMIT {
                trace!("inter-byte gap exceeded, aborting with partial reply");
                return Ok(None);
            }
            escape += 1;
            thread::sleep(POLL_TICK);
        }
        let mut buf = [0u8; 1];
        if self.channel.read(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf[0]))
    }

    /// Match the reply against an expected literal.
    ///
    /// Every expected byte is consumed even after a mismatch; the result is
    /// true only if all bytes matched and the full count arrived.
    pub fn read_literal(&mut self, expected: &[u8]) -> io::Result<bool> {
        if !self.response_available()? {
            return Ok(false);
        }

        let mut matched = true;
        for &want in expected {
            let Some(byte) = self.next_byte()? else {
                return Ok(false);
            };
            if byte != want {
                matched = false;
            }
        }
        Ok(matched)
    }

    /// Decode a numeric hex reply in the given dialect.
    ///
    /// Timeouts and partial replies surface as whatever value accumulated,
    /// defaulting to 0.
    pub fn read_number(&mut self, dialect: DeviceDialect, width: FieldWidth) -> io::Result<u16> {
        if !self.response_available()? {
            return Ok(0);
        }
        match dialect {
            DeviceDialect::Legacy => self.read_number_legacy(),
            DeviceDialect::Revised => self.read_number_revised(width),
        }
    }

    /// Fixed 8-byte legacy envelope: `OK`, four lower-case hex digits, `\r\n`.
    fn read_number_legacy(&mut self) -> io::Result<u16> {
        let mut value = 0u16;
        for index in 0..8usize {
            let Some(byte) = self.next_byte()? else {
                return Ok(value);
            };
            // Bytes 0-1 are the throwaway `OK`, 6-7 the terminators.
            if (2..=5).contains(&index) {
                if let Some(digit) = hex_digit(byte, DeviceDialect::Legacy) {
                    value = value.wrapping_mul(16).wrapping_add(u16::from(digit));
                }
            }
        }
        Ok(value)
    }

    /// Variable revised envelope: optional `OK` prefix, `width` hex digits of
    /// either case, optional trailing space, `\n` terminator.
    fn read_number_revised(&mut self, width: FieldWidth) -> io::Result<u16> {
        let mut value = 0u16;
        let mut digits = 0usize;

        // Check the first two bytes for the acknowledgement prefix; skipping
        // it widens the remaining byte window by two.
        let Some(first) = self.next_byte()? else {
            return Ok(0);
        };
        let Some(second) = self.next_byte()? else {
            if let Some(digit) = hex_digit(first, DeviceDialect::Revised) {
                value = u16::from(digit);
            }
            return Ok(value);
        };

        let mut scanned = 0usize;
        if [first, second] != *b"OK" {
            for byte in [first, second] {
                if byte == b'\n' {
                    return Ok(value);
                }
                if digits < width.digits() {
                    if let Some(digit) = hex_digit(byte, DeviceDialect::Revised) {
                        value = value.wrapping_mul(16).wrapping_add(u16::from(digit));
                        digits += 1;
                    }
                }
                scanned += 1;
            }
        }

        // Digits plus an optional trailing space and the terminator; anything
        // beyond the window is terminator noise left for the next drain.
        let mut remaining = (width.digits() + 2).saturating_sub(scanned);
        while remaining > 0 {
            let Some(byte) = self.next_byte()? else {
                return Ok(value);
            };
            remaining -= 1;
            if byte == b'\n' {
                break;
            }
            if digits < width.digits() {
                if let Some(digit) = hex_digit(byte, DeviceDialect::Revised) {
                    value = value.wrapping_mul(16).wrapping_add(u16::from(digit));
                    digits += 1;
                }
            }
        }
        Ok(value)
    }
}

/// ASCII hex digit value, honoring per-dialect casing rules.
///
/// Legacy firmware emits lower-case only; revised firmware emits either case.
/// Everything else (`\r`, `\n`, space, the `.` in version literals) is
/// skipped by the scanners rather than decoded.
fn hex_digit(byte: u8, dialect: DeviceDialect) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' if dialect == DeviceDialect::Revised => Some(byte - b'A' + 10),
        _ => None,
    }
}
