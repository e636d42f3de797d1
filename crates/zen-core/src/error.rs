// ── Core error types ──
//
// User-facing errors from zen-core. Consumers never see raw socket
// errors; the `From` impls below translate zen-tpi failures into
// domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Controller connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Write to controller failed: {reason}")]
    SendFailed { reason: String },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Controller not found: {id}")]
    ControllerNotFound { id: String },

    #[error("Device not found: {id}")]
    DeviceNotFound { id: u32 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Frame encoding failed: {message}")]
    Encoding { message: String },

    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether retrying on the next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ControllerDisconnected
                | Self::Timeout { .. }
                | Self::SendFailed { .. }
                | Self::PublishFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<zen_tpi::ConnectError> for CoreError {
    fn from(err: zen_tpi::ConnectError) -> Self {
        match err {
            zen_tpi::ConnectError::Timeout { timeout_ms, .. } => Self::Timeout { timeout_ms },
            zen_tpi::ConnectError::Unreachable { endpoint, source } => Self::ConnectionFailed {
                endpoint,
                reason: source.to_string(),
            },
            zen_tpi::ConnectError::Handshake { endpoint, source } => Self::ConnectionFailed {
                endpoint,
                reason: format!("handshake failed: {source}"),
            },
        }
    }
}

impl From<zen_tpi::SendError> for CoreError {
    fn from(err: zen_tpi::SendError) -> Self {
        match err {
            zen_tpi::SendError::NotConnected => Self::ControllerDisconnected,
            zen_tpi::SendError::IoFailure(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Self::Timeout { timeout_ms: 0 }
            }
            zen_tpi::SendError::IoFailure(e) => Self::SendFailed {
                reason: e.to_string(),
            },
        }
    }
}

impl From<zen_tpi::EncodingError> for CoreError {
    fn from(err: zen_tpi::EncodingError) -> Self {
        Self::Encoding {
            message: err.to_string(),
        }
    }
}
