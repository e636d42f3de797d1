use std::io;

use thiserror::Error;

/// Failure to bring a session to the Ready state.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TCP connect failed (refused, unreachable, DNS failure, ...).
    #[error("Cannot connect to controller at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect did not complete within the configured timeout.
    #[error("Connection to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The transport opened but the handshake frame could not be written.
    #[error("Handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

/// Failure to deliver a frame on a session.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session was down and the single reconnect attempt failed.
    #[error("Session is not connected")]
    NotConnected,

    /// The write failed; the session has been closed.
    #[error("Write to controller failed: {0}")]
    IoFailure(#[source] io::Error),
}

/// Failure to build an outbound frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Payload of {len} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Failure to interpret inbound bytes.
///
/// The wire format carries no length prefix, so a decode failure cannot be
/// resynchronised; the remainder of the offending chunk is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No parser registered for inbound command 0x{command:02x} ({dropped} bytes dropped)")]
    UnknownCommand { command: u8, dropped: usize },

    #[error("Invalid body for inbound command 0x{command:02x}: {reason}")]
    InvalidBody { command: u8, reason: String },
}
