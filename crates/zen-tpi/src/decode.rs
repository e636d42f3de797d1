//! Inbound frame decoding.
//!
//! Frames carry no length prefix, so there is no generic way to split a
//! byte stream into frames. Instead each inbound command id is registered
//! with a [`FrameParser`] that knows its body layout and reports how many
//! bytes it consumed. The decoder is stateful: a frame split across two
//! TCP reads is held until the rest arrives.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::DecodeError;
use crate::frame::command;

/// Bytes held across reads before the decoder gives up on a frame.
const MAX_PENDING: usize = 64 * 1024;

/// Value carried by a device report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportValue {
    Switch(bool),
    Level(u8),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A device reported its current state.
    DeviceReport { device_id: u32, value: ReportValue },
    /// A frame understood by a custom parser but not modelled here.
    Other { command: u8, body: Bytes },
}

/// Result of a single parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A complete frame whose body was `consumed` bytes long.
    Frame { frame: InboundFrame, consumed: usize },
    /// Not enough bytes yet; wait for the next read.
    Incomplete,
}

/// Per-command-id body parser.
///
/// `body` is everything after the command id that is currently buffered;
/// it may contain the start of following frames.
pub trait FrameParser: Send + Sync {
    fn parse(&self, command: u8, body: &[u8]) -> Result<Parsed, DecodeError>;
}

impl<F> FrameParser for F
where
    F: Fn(u8, &[u8]) -> Result<Parsed, DecodeError> + Send + Sync,
{
    fn parse(&self, command: u8, body: &[u8]) -> Result<Parsed, DecodeError> {
        self(command, body)
    }
}

/// Parser for the fixed `u32 BE id` + `u8 value` report layout.
#[derive(Debug, Clone, Copy)]
pub enum DeviceReportParser {
    /// Value byte is on/off (0 = off).
    Switch,
    /// Value byte is a dimmer arc level.
    Level,
}

impl FrameParser for DeviceReportParser {
    fn parse(&self, _command: u8, body: &[u8]) -> Result<Parsed, DecodeError> {
        let Some(mut fixed) = body.get(..5) else {
            return Ok(Parsed::Incomplete);
        };
        let device_id = fixed.get_u32();
        let raw = fixed.get_u8();
        let value = match self {
            Self::Switch => ReportValue::Switch(raw != 0),
            Self::Level => ReportValue::Level(raw),
        };
        Ok(Parsed::Frame {
            frame: InboundFrame::DeviceReport { device_id, value },
            consumed: 5,
        })
    }
}

/// Stateful decoder with a registry of per-command parsers.
pub struct FrameDecoder {
    parsers: HashMap<u8, Arc<dyn FrameParser>>,
    pending: BytesMut,
}

impl FrameDecoder {
    /// A decoder with no parsers; every command id is unknown.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            pending: BytesMut::new(),
        }
    }

    /// A decoder understanding the known device report commands.
    pub fn new() -> Self {
        let mut decoder = Self::empty();
        decoder
            .register(command::LIGHT_STATE_REPORT, DeviceReportParser::Switch)
            .register(command::LEVEL_REPORT, DeviceReportParser::Level);
        decoder
    }

    /// Register (or replace) the parser for `command`.
    pub fn register(&mut self, command: u8, parser: impl FrameParser + 'static) -> &mut Self {
        self.parsers.insert(command, Arc::new(parser));
        self
    }

    /// Bytes buffered waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partially received frame.
    ///
    /// Call when the byte stream restarts (a new connection): a frame
    /// split across two connections can never be completed.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Feed one received chunk, returning every frame it completes.
    ///
    /// An error discards whatever is buffered: without a length prefix
    /// there is no way to find the next frame boundary.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<InboundFrame, DecodeError>> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(&cmd) = self.pending.first() {
            let Some(parser) = self.parsers.get(&cmd) else {
                let dropped = self.pending.len();
                self.pending.clear();
                out.push(Err(DecodeError::UnknownCommand {
                    command: cmd,
                    dropped,
                }));
                break;
            };

            let body = self.pending.get(1..).unwrap_or_default();
            match parser.parse(cmd, body) {
                Ok(Parsed::Frame { frame, consumed }) => {
                    let consumed = consumed.min(body.len());
                    self.pending.advance(1 + consumed);
                    out.push(Ok(frame));
                }
                Ok(Parsed::Incomplete) => {
                    if self.pending.len() > MAX_PENDING {
                        self.pending.clear();
                        out.push(Err(DecodeError::InvalidBody {
                            command: cmd,
                            reason: format!("frame exceeds {MAX_PENDING} buffered bytes"),
                        }));
                    }
                    break;
                }
                Err(e) => {
                    self.pending.clear();
                    out.push(Err(e));
                    break;
                }
            }
        }

        out
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<_> = self.parsers.keys().copied().collect();
        commands.sort_unstable();
        f.debug_struct("FrameDecoder")
            .field("commands", &commands)
            .field("pending", &self.pending.len())
            .finish()
    }
}
