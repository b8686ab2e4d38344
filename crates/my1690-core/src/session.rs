//! Session management
//!
//! Ties the engine together: connection lifecycle, the one-time dialect
//! probe, and the typed playback/volume/equalizer/status operations. Each
//! operation picks an opcode, transmits one frame and reads one reply; no
//! state outlives a single exchange except the resolved dialect.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

use crate::channel::{BusyLine, Channel, SerialChannel};
use crate::commands::{Command, EqMode, LoopMode};
use crate::dialect::{DeviceDialect, PROBE_CANDIDATES};
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::response::{FieldWidth, ResponseReader, DEFAULT_RESPONSE_TIMEOUT_TICKS, POLL_TICK};
use crate::serial::{configure_port, open_port, DEFAULT_BAUD_RATE};

/// Interval between connectivity probes during initialization.
///
/// The datasheet allows the player up to 1.5 s after power-on before it
/// answers; probing every 100 ms for 16 attempts covers that with margin.
pub const PROBE_INTERVAL_MS: u64 = 100;
/// Probe attempts before initialization is declared failed
pub const PROBE_ATTEMPTS: u32 = 16;
/// Settle delay before re-polling play status after a stop (revised firmware)
pub const STOP_SETTLE_MS: u64 = 15;
/// Highest volume level the player accepts; higher requests are clamped
pub const VOLUME_MAX: u8 = 30;

/// Acknowledgement literal for control commands
const ACK_LITERAL: &[u8] = b"OK";
/// Delayed confirmation legacy firmware emits once a playing track halts
const STOP_LITERAL: &[u8] = b"STOP";

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connecting (dialect probe in progress)
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection error
    Error,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Ticks (1 ms each) to wait for the first byte of a reply
    pub response_timeout_ticks: u32,
    /// Probe attempts before initialization fails
    pub probe_attempts: u32,
    /// Pause between probe attempts in milliseconds
    pub probe_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout_ticks: DEFAULT_RESPONSE_TIMEOUT_TICKS,
            probe_attempts: PROBE_ATTEMPTS,
            probe_interval_ms: PROBE_INTERVAL_MS,
        }
    }
}

/// Where play status comes from, chosen once at initialization.
enum StatusSource {
    /// No busy line wired up: issue the status query and compare against 1.
    Polled,
    /// Dedicated digital busy line supplied by the caller.
    BusyLine(Box<dyn BusyLine>),
}

/// A command session with one attached player.
///
/// The session exclusively owns its channel; callers must serialize access
/// externally if they share it, since at most one exchange may be in flight.
pub struct Session {
    /// Communication channel, present while connected
    channel: Option<Box<dyn Channel>>,
    /// Play status source
    status_source: StatusSource,
    /// Reply dialect resolved by the version probe
    dialect: Option<DeviceDialect>,
    /// Firmware version reported during the probe (major * 100 + minor)
    version: Option<u16>,
    /// Current connection state
    state: ConnectionState,
    /// Session configuration
    config: SessionConfig,
}

impl Session {
    /// Create a new session (not yet connected).
    pub fn new(config: SessionConfig) -> Self {
        Self {
            channel: None,
            status_source: StatusSource::Polled,
            dialect: None,
            version: None,
            state: ConnectionState::Disconnected,
            config,
        }
    }

    /// Create a session that reads play status from a digital busy line
    /// instead of polling the status command.
    pub fn with_busy_line(config: SessionConfig, line: Box<dyn BusyLine>) -> Self {
        let mut session = Self::new(config);
        session.status_source = StatusSource::BusyLine(line);
        session
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reply dialect resolved during connect
    pub fn dialect(&self) -> Option<DeviceDialect> {
        self.dialect
    }

    /// Firmware version reported by the probe (major * 100 + minor), when
    /// the firmware answered with a known version literal.
    pub fn firmware_version(&self) -> Option<u16> {
        self.version
    }

    /// Open the configured serial port and initialize the player.
    ///
    /// Probes the firmware dialect at a fixed interval until it answers or
    /// the attempt budget runs out, then silences any track left playing
    /// from a prior power cycle.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Connected {
            return Err(ProtocolError::AlreadyConnected);
        }

        let mut port = open_port(&self.config.port_name, Some(self.config.baud_rate))?;
        configure_port(port.as_mut())?;
        self.connect_channel(Box::new(SerialChannel::new(port)))
    }

    /// Initialize the player over an already-open channel.
    ///
    /// Useful for transports other than a local serial port, and for tests.
    pub fn connect_channel(&mut self, mut channel: Box<dyn Channel>) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Connected {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;

        channel.clear_input_buffer()?;
        self.channel = Some(channel);

        match self.establish() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                self.channel = None;
                self.dialect = None;
                self.version = None;
                Err(e)
            }
        }
    }

    /// Drop the channel and forget the resolved dialect.
    pub fn disconnect(&mut self) {
        self.channel = None;
        self.dialect = None;
        self.version = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Probe-retry loop plus the post-connect stop.
    fn establish(&mut self) -> Result<(), ProtocolError> {
        for attempt in 0..self.config.probe_attempts {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(self.config.probe_interval_ms));
            }
            if let Some((dialect, version)) = self.probe_dialect()? {
                debug!(?dialect, version, attempt, "player answered version probe");
                self.dialect = Some(dialect);
                self.version = Some(version);
                self.silence_startup()?;
                return Ok(());
            }
        }
        Err(ProtocolError::ConnectionFailed(format!(
            "no version reply after {} probe attempts",
            self.config.probe_attempts
        )))
    }

    /// One full probe pass over the ordered candidate table.
    ///
    /// Each literal attempt consumes the reply whether or not it matched, so
    /// the get-version command is re-sent before every candidate. Firmware
    /// matching no candidate gets a generic numeric decode; a value in 1-9
    /// identifies a connected legacy device.
    fn probe_dialect(&mut self) -> Result<Option<(DeviceDialect, u16)>, ProtocolError> {
        for candidate in PROBE_CANDIDATES.iter() {
            self.transmit(&Command::GetVersion)?;
            if self.reader()?.read_literal(candidate.pattern)? {
                return Ok(Some((candidate.dialect, candidate.version)));
            }
            trace!(
                pattern = ?String::from_utf8_lossy(candidate.pattern),
                "version literal did not match"
            );
        }

        self.transmit(&Command::GetVersion)?;
        let raw = self
            .reader()?
            .read_number(DeviceDialect::Legacy, FieldWidth::Standard)?;
        if (1..=9).contains(&raw) {
            Ok(Some((DeviceDialect::Legacy, raw)))
        } else {
            trace!(raw, "generic version decode did not identify a device");
            Ok(None)
        }
    }

    /// Stop whatever may still be playing from before this session.
    ///
    /// Revised firmware does not reliably confirm a stop, so the command is
    /// gated behind a play-status check there.
    fn silence_startup(&mut self) -> Result<(), ProtocolError> {
        match self.dialect {
            Some(DeviceDialect::Legacy) => {
                let _ = self.stop()?;
            }
            Some(DeviceDialect::Revised) => {
                if self.is_playing()? {
                    let _ = self.stop()?;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Read and discard stale bytes left over from a prior exchange.
    ///
    /// A stale or partial reply from a timed-out exchange would otherwise be
    /// parsed as the answer to the next command.
    fn drain_input(&mut self) -> Result<(), ProtocolError> {
        let channel = self.channel.as_deref_mut().ok_or(ProtocolError::NotConnected)?;
        let mut scratch = [0u8; 32];
        loop {
            if channel.bytes_to_read()? == 0 {
                break;
            }
            let n = channel.read(&mut scratch)?;
            if n == 0 {
                break;
            }
            trace!(discarded = n, "drained stale reply bytes");
            // Straggling bytes may still be in flight.
            thread::sleep(POLL_TICK);
        }
        Ok(())
    }

    /// Encode and transmit one command frame.
    fn transmit(&mut self, command: &Command) -> Result<(), ProtocolError> {
        self.drain_input()?;

        let bytes = Frame::from_command(command).to_bytes();
        trace!(opcode = command.opcode(), len = bytes.len(), "tx frame");

        let channel = self.channel.as_deref_mut().ok_or(ProtocolError::NotConnected)?;
        channel.write_all(&bytes)?;
        channel.flush()?;
        Ok(())
    }

    /// Response reader scoped to the current exchange.
    fn reader(&mut self) -> Result<ResponseReader<'_>, ProtocolError> {
        let ticks = self.config.response_timeout_ticks;
        let channel = self.channel.as_deref_mut().ok_or(ProtocolError::NotConnected)?;
        Ok(ResponseReader::new(channel, ticks))
    }

    fn resolved_dialect(&self) -> Result<DeviceDialect, ProtocolError> {
        self.dialect.ok_or(ProtocolError::NotConnected)
    }

    /// Send a control command and collect its acknowledgement if the
    /// firmware emits one; unacknowledged commands report success.
    fn control(&mut self, command: Command) -> Result<bool, ProtocolError> {
        let dialect = self.resolved_dialect()?;
        self.transmit(&command)?;
        if !command.expects_ack(dialect) {
            return Ok(true);
        }
        let acknowledged = self.reader()?.read_literal(ACK_LITERAL)?;
        if !acknowledged {
            debug!(opcode = command.opcode(), "command not acknowledged");
        }
        Ok(acknowledged)
    }

    /// Send a query command and decode its numeric reply; a timeout
    /// surfaces as 0.
    fn query(&mut self, command: Command) -> Result<u16, ProtocolError> {
        let dialect = self.resolved_dialect()?;
        // Revised firmware answers the version query with a 3-digit field.
        let width = if command == Command::GetVersion && dialect == DeviceDialect::Revised {
            FieldWidth::Short
        } else {
            FieldWidth::Standard
        };
        self.transmit(&command)?;
        self.reader()?.read_number(dialect, width).map_err(Into::into)
    }

    // Control operations

    /// Resume or start playback.
    pub fn play(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Play)
    }

    /// Pause the current track.
    pub fn pause(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Pause)
    }

    /// Skip to the next track.
    pub fn next(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Next)
    }

    /// Skip to the previous track.
    pub fn previous(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Previous)
    }

    /// Raise the volume one step.
    pub fn volume_up(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::VolumeUp)
    }

    /// Lower the volume one step.
    pub fn volume_down(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::VolumeDown)
    }

    /// Reset the player.
    pub fn reset(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Reset)
    }

    /// Advance the current track about one second.
    pub fn fast_forward(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::FastForward)
    }

    /// Rewind the current track about one second.
    pub fn rewind(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::Rewind)
    }

    /// Toggle between play and pause.
    pub fn play_pause(&mut self) -> Result<bool, ProtocolError> {
        self.control(Command::PlayPause)
    }

    /// Stop playback.
    ///
    /// The stop is asynchronous on the device side. Legacy firmware answers
    /// `OK` at once and, if a track was playing, emits a delayed `STOP`
    /// confirmation once it actually halts. Revised firmware confirms
    /// nothing reliable, so the session settles briefly and re-polls the
    /// play status instead.
    pub fn stop(&mut self) -> Result<bool, ProtocolError> {
        match self.resolved_dialect()? {
            DeviceDialect::Legacy => {
                let was_playing = self.is_playing()?;
                self.transmit(&Command::Stop)?;
                let acknowledged = self.reader()?.read_literal(ACK_LITERAL)?;
                if !was_playing {
                    return Ok(acknowledged);
                }
                // The second confirmation trails the ack by 10-15 ms.
                self.reader()?.read_literal(STOP_LITERAL).map_err(Into::into)
            }
            DeviceDialect::Revised => {
                self.transmit(&Command::Stop)?;
                thread::sleep(Duration::from_millis(STOP_SETTLE_MS));
                Ok(!self.is_playing()?)
            }
        }
    }

    /// Set the volume level, clamped to [`VOLUME_MAX`].
    ///
    /// Legacy firmware acknowledges the change; revised firmware does not
    /// reliably, so success is verified by querying the volume back and
    /// comparing it against the requested level.
    pub fn set_volume(&mut self, level: u8) -> Result<bool, ProtocolError> {
        let dialect = self.resolved_dialect()?;
        let level = level.min(VOLUME_MAX);
        let accepted = self.control(Command::SetVolume(level))?;
        match dialect {
            DeviceDialect::Legacy => Ok(accepted),
            DeviceDialect::Revised => Ok(self.get_volume()? == level),
        }
    }

    /// Select an equalizer preset.
    pub fn set_eq(&mut self, eq: EqMode) -> Result<bool, ProtocolError> {
        self.control(Command::SetEq(eq))
    }

    /// Select a loop mode.
    pub fn set_loop_mode(&mut self, mode: LoopMode) -> Result<bool, ProtocolError> {
        self.control(Command::SetLoopMode(mode))
    }

    /// Play every song on the media, then loop.
    pub fn set_loop_full(&mut self) -> Result<bool, ProtocolError> {
        self.set_loop_mode(LoopMode::Full)
    }

    /// Play every song in the folder, then loop.
    pub fn set_loop_folder(&mut self) -> Result<bool, ProtocolError> {
        self.set_loop_mode(LoopMode::Folder)
    }

    /// Loop the current song.
    pub fn set_loop_single(&mut self) -> Result<bool, ProtocolError> {
        self.set_loop_mode(LoopMode::Single)
    }

    /// Play random songs without end.
    pub fn set_loop_random(&mut self) -> Result<bool, ProtocolError> {
        self.set_loop_mode(LoopMode::Random)
    }

    /// Play one song, then stop.
    pub fn set_loop_none(&mut self) -> Result<bool, ProtocolError> {
        self.set_loop_mode(LoopMode::NoLoop)
    }

    /// Select a track by number and start playing it.
    pub fn play_track(&mut self, track: u16) -> Result<bool, ProtocolError> {
        self.control(Command::SelectTrack(track))
    }

    // Query operations. A timeout surfaces as 0, indistinguishable from a
    // true zero by design.

    /// Play status: 1 while a track is playing.
    pub fn get_status(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetStatus)
    }

    /// Current volume level (0-30).
    pub fn get_volume(&mut self) -> Result<u8, ProtocolError> {
        Ok((self.query(Command::GetVolume)? & 0xFF) as u8)
    }

    /// Current equalizer preset as reported by the player; decode with
    /// [`EqMode::try_from`].
    pub fn get_eq(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetEq)
    }

    /// Current loop mode as reported by the player; decode with
    /// [`LoopMode::try_from`].
    pub fn get_loop_mode(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetLoopMode)
    }

    /// Firmware version as freshly reported by the player.
    pub fn get_version(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetVersion)
    }

    /// Number of songs on the media.
    pub fn get_song_count(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetSongCount)
    }

    /// Number of the current track.
    pub fn get_current_track(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetCurrentTrack)
    }

    /// Elapsed time of the current track in seconds.
    pub fn get_elapsed_time(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetElapsedTime)
    }

    /// Total time of the current track in seconds.
    pub fn get_total_time(&mut self) -> Result<u16, ProtocolError> {
        self.query(Command::GetTotalTime)
    }

    /// Whether a track is currently playing, from the busy line when one is
    /// wired up, otherwise from the status query.
    pub fn is_playing(&mut self) -> Result<bool, ProtocolError> {
        if let StatusSource::BusyLine(line) = &mut self.status_source {
            return Ok(line.is_high());
        }
        Ok(self.get_status()? == 1)
    }

    /// Whether the player still answers the version query sensibly.
    pub fn is_connected(&mut self) -> Result<bool, ProtocolError> {
        let dialect = self.resolved_dialect()?;
        let version = self.get_version()?;
        Ok(match dialect {
            DeviceDialect::Legacy => (1..=9).contains(&version),
            DeviceDialect::Revised => version > 0,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.response_timeout_ticks, DEFAULT_RESPONSE_TIMEOUT_TICKS);
        assert_eq!(config.probe_attempts, PROBE_ATTEMPTS);
    }

    #[test]
    fn test_session_starts_disconnected() {
        let session = Session::new(SessionConfig::default());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.dialect().is_none());
        assert!(session.firmware_version().is_none());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut session = Session::new(SessionConfig::default());
        assert!(matches!(session.play(), Err(ProtocolError::NotConnected)));
        assert!(matches!(
            session.get_volume(),
            Err(ProtocolError::NotConnected)
        ));
    }
}
