//! Outbound frame construction.
//!
//! A TPI frame is `[command id: u8][payload]`. The wire format has no length
//! prefix and no correlation id: the payload length is whatever the writer
//! put on the stream, and the receiver must know each command's layout to
//! find the next frame boundary (see [`crate::decode`]).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodingError;

/// Default upper bound on a single frame payload.
///
/// The protocol defines no bound; this keeps a misbehaving caller from
/// queueing arbitrarily large writes.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// Default handshake payload announcing an advanced-mode client.
pub const DEFAULT_HELLO_PAYLOAD: &[u8] = b"TPI_ADVANCED_HELLO";

/// Known command ids.
///
/// These are placeholders pending verification against controller
/// firmware; every one of them can be overridden where it is used.
pub mod command {
    /// Ask the controller to report the state of every device.
    pub const QUERY_ALL_DEVICES: u8 = 0x01;
    /// Switch or dim a single light. Payload: `u32` BE id, `u8` value.
    pub const SET_LIGHT_STATE: u8 = 0x02;
    /// Ask for one light's state. Payload: `u32` BE id.
    pub const QUERY_LIGHT_STATE: u8 = 0x03;
    /// Inbound on/off report. Body: `u32` BE id, `u8` (0 = off).
    pub const LIGHT_STATE_REPORT: u8 = 0x03;
    /// Inbound dimmer level report. Body: `u32` BE id, `u8` arc level.
    pub const LEVEL_REPORT: u8 = 0x04;
    /// Advanced-mode handshake.
    pub const HELLO: u8 = 0x90;
}

/// Payload size limit applied by [`Frame::encode_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_payload: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// A single encoded frame, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Encode a frame with the default payload limit.
    pub fn encode(command: u8, payload: &[u8]) -> Result<Self, EncodingError> {
        Self::encode_with(command, payload, FrameLimits::default())
    }

    /// Encode a frame, rejecting payloads over `limits.max_payload`.
    pub fn encode_with(
        command: u8,
        payload: &[u8],
        limits: FrameLimits,
    ) -> Result<Self, EncodingError> {
        if payload.len() > limits.max_payload {
            return Err(EncodingError::PayloadTooLarge {
                len: payload.len(),
                max: limits.max_payload,
            });
        }

        let mut buf = BytesMut::with_capacity(1 + payload.len());
        buf.put_u8(command);
        buf.put_slice(payload);
        Ok(Self {
            bytes: buf.freeze(),
        })
    }

    /// "Refresh all" request.
    pub fn query_all_devices() -> Self {
        Self::header_only(command::QUERY_ALL_DEVICES)
    }

    /// Single-light state query.
    pub fn query_light_state(device_id: u32) -> Self {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(command::QUERY_LIGHT_STATE);
        buf.put_u32(device_id);
        Self {
            bytes: buf.freeze(),
        }
    }

    /// Set-light-state request. `value` is 0/1 for switches or an arc level.
    pub fn set_light_state(device_id: u32, value: u8) -> Self {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_u8(command::SET_LIGHT_STATE);
        buf.put_u32(device_id);
        buf.put_u8(value);
        Self {
            bytes: buf.freeze(),
        }
    }

    fn header_only(command: u8) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(&[command]),
        }
    }

    /// The command id (first byte).
    pub fn command(&self) -> u8 {
        self.bytes.first().copied().unwrap_or_default()
    }

    /// Everything after the command id.
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or_default()
    }

    /// The full wire representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`: a frame carries at least its command id.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The mandatory first frame of every connection.
///
/// Required bytes are firmware-specific, so both halves are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub command: u8,
    pub payload: Bytes,
}

impl Handshake {
    pub fn frame(&self, limits: FrameLimits) -> Result<Frame, EncodingError> {
        Frame::encode_with(self.command, &self.payload, limits)
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            command: command::HELLO,
            payload: Bytes::from_static(DEFAULT_HELLO_PAYLOAD),
        }
    }
}
