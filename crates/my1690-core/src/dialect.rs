//! Firmware reply dialects
//!
//! Two MY1690 firmware lines answer the same opcodes with materially
//! different reply framing. They are kept as two distinct, explicitly
//! resolved dialects; their field widths and timing constants are never
//! merged.

use serde::{Deserialize, Serialize};

/// Reply-parsing rules associated with one firmware revision.
///
/// Unresolved at session construction, fixed by the one-time version probe,
/// read-only afterwards unless the caller re-initializes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceDialect {
    /// Fixed 8-byte numeric envelope: `OK` prefix, four lower-case hex
    /// digits, `\r\n`. Every control command is acknowledged.
    Legacy,
    /// Variable-width numeric replies: optional `OK` prefix, hex digits of
    /// either case, optional trailing space before the `\n` terminator.
    /// Play, stop and set-volume go unacknowledged.
    Revised,
}

/// One version-probe candidate: an expected reply literal and what a match
/// implies about the attached firmware.
pub(crate) struct ProbeCandidate {
    /// The exact reply bytes to match
    pub pattern: &'static [u8],
    /// Dialect spoken by firmware that answers with this literal
    pub dialect: DeviceDialect,
    /// Firmware version encoded as major * 100 + minor
    pub version: u16,
}

/// Version-probe literals, tried strictly in order.
///
/// A literal read consumes the reply bytes whether or not they matched, so
/// the probe must re-send the get-version command before each candidate.
/// Firmware matching none of these gets a generic numeric decode instead
/// (legacy behavior: a bare code in 1-9 identifies a connected device).
pub(crate) const PROBE_CANDIDATES: [ProbeCandidate; 4] = [
    ProbeCandidate {
        pattern: b"OK1.1\r\n",
        dialect: DeviceDialect::Revised,
        version: 101,
    },
    ProbeCandidate {
        pattern: b"1.1\r\n",
        dialect: DeviceDialect::Revised,
        version: 101,
    },
    ProbeCandidate {
        pattern: b"OK1.0\r\n",
        dialect: DeviceDialect::Revised,
        version: 100,
    },
    ProbeCandidate {
        pattern: b"1.0\r\n",
        dialect: DeviceDialect::Revised,
        version: 100,
    },
];
