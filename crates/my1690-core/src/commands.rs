//! Player commands
//!
//! Defines the opcode table of the MY1690 serial protocol, the parameter
//! encoding for each command, and which commands the firmware acknowledges.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::dialect::DeviceDialect;

/// Commands understood by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Resume or start playback
    Play,
    /// Pause the current track
    Pause,
    /// Skip to the next track
    Next,
    /// Skip to the previous track
    Previous,
    /// Raise the volume one step
    VolumeUp,
    /// Lower the volume one step
    VolumeDown,
    /// Reset the player
    Reset,
    /// Advance the current track about one second
    FastForward,
    /// Rewind the current track about one second
    Rewind,
    /// Toggle between play and pause
    PlayPause,
    /// Stop playback
    Stop,
    /// Set the volume level (0-30)
    SetVolume(u8),
    /// Select an equalizer preset
    SetEq(EqMode),
    /// Select a loop mode
    SetLoopMode(LoopMode),
    /// Select a track by number and start playing it
    SelectTrack(u16),
    /// Query the play status (1 = playing)
    GetStatus,
    /// Query the current volume level
    GetVolume,
    /// Query the current equalizer preset
    GetEq,
    /// Query the current loop mode
    GetLoopMode,
    /// Query the firmware version number
    GetVersion,
    /// Query the number of songs on the media
    GetSongCount,
    /// Query the number of the current track
    GetCurrentTrack,
    /// Query the elapsed time of the current track
    GetElapsedTime,
    /// Query the total time of the current track
    GetTotalTime,
}

impl Command {
    /// The opcode byte for this command.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Play => 0x11,
            Command::Pause => 0x12,
            Command::Next => 0x13,
            Command::Previous => 0x14,
            Command::VolumeUp => 0x15,
            Command::VolumeDown => 0x16,
            Command::Reset => 0x19,
            Command::FastForward => 0x1A,
            Command::Rewind => 0x1B,
            Command::PlayPause => 0x1C,
            Command::Stop => 0x1E,
            Command::GetStatus => 0x20,
            Command::GetVolume => 0x21,
            Command::GetEq => 0x22,
            Command::GetLoopMode => 0x23,
            Command::GetVersion => 0x24,
            Command::GetSongCount => 0x25,
            Command::GetCurrentTrack => 0x29,
            Command::GetElapsedTime => 0x2C,
            Command::GetTotalTime => 0x2D,
            Command::SetVolume(_) => 0x31,
            Command::SetEq(_) => 0x32,
            Command::SetLoopMode(_) => 0x33,
            Command::SelectTrack(_) => 0x41,
        }
    }

    /// Frame payload for this command: opcode followed by parameter bytes.
    ///
    /// Built fresh on every call; nothing is shared between exchanges.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = vec![self.opcode()];
        match *self {
            Command::SetVolume(level) => payload.push(level),
            Command::SetEq(eq) => payload.push(eq as u8),
            Command::SetLoopMode(mode) => payload.push(mode as u8),
            Command::SelectTrack(track) => {
                let mut buf = [0u8; 2];
                BigEndian::write_u16(&mut buf, track);
                payload.extend_from_slice(&buf);
            }
            _ => {}
        }
        payload
    }

    /// Whether this is a query command (expects a numeric reply).
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::GetStatus
                | Command::GetVolume
                | Command::GetEq
                | Command::GetLoopMode
                | Command::GetVersion
                | Command::GetSongCount
                | Command::GetCurrentTrack
                | Command::GetElapsedTime
                | Command::GetTotalTime
        )
    }

    /// Whether the firmware acknowledges this control command with `OK`.
    ///
    /// Legacy firmware acknowledges every control command. Revised firmware
    /// dropped the acknowledgement for play, stop and set-volume; those are
    /// fire-and-forget on the wire.
    pub fn expects_ack(&self, dialect: DeviceDialect) -> bool {
        if self.is_query() {
            return false;
        }
        match dialect {
            DeviceDialect::Legacy => true,
            DeviceDialect::Revised => !matches!(
                self,
                Command::Play | Command::Stop | Command::SetVolume(_)
            ),
        }
    }
}

/// Equalizer presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EqMode {
    /// Normal (flat) response
    Normal = 0x00,
    /// Pop preset
    Pop = 0x01,
    /// Rock preset
    Rock = 0x02,
    /// Jazz preset
    Jazz = 0x03,
    /// Classical preset
    Classic = 0x04,
    /// Bass boost preset
    Bass = 0x05,
}

impl TryFrom<u8> for EqMode {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(EqMode::Normal),
            0x01 => Ok(EqMode::Pop),
            0x02 => Ok(EqMode::Rock),
            0x03 => Ok(EqMode::Jazz),
            0x04 => Ok(EqMode::Classic),
            0x05 => Ok(EqMode::Bass),
            _ => Err(()),
        }
    }
}

/// Loop modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoopMode {
    /// Play every song on the media, then loop
    Full = 0x00,
    /// Play every song in the folder, then loop
    Folder = 0x01,
    /// Loop the current song
    Single = 0x02,
    /// Play random songs without end
    Random = 0x03,
    /// Play one song, then stop
    NoLoop = 0x04,
}

impl TryFrom<u8> for LoopMode {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(LoopMode::Full),
            0x01 => Ok(LoopMode::Folder),
            0x02 => Ok(LoopMode::Single),
            0x03 => Ok(LoopMode::Random),
            0x04 => Ok(LoopMode::NoLoop),
            _ => Err(()),
        }
    }
}
