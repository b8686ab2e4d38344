//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the player.
///
/// Timeouts and mismatched replies are not errors: the player has no way to
/// signal failure explicitly, so those degrade to `false`/`0` at the call
/// site. `Err` is reserved for channel failures and lifecycle misuse.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to the player")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
