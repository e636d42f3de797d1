//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use zen_config::ConfigError;
use zen_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONFIG: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {endpoint}")]
    #[diagnostic(
        code(zenbridge::connection_failed),
        help(
            "Check that the controller is powered, reachable, and has TPI Advanced enabled.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Controller timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(zenbridge::timeout),
        help("Raise protocol.connect_timeout_ms or protocol.write_timeout_ms in the config.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(zenbridge::not_found), help("{hint}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zenbridge::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No controllers configured")]
    #[diagnostic(
        code(zenbridge::no_controllers),
        help(
            "Add at least one entry under `controllers:` (host, port, optional mac and name).\n\
             Config file: {path}"
        )
    )]
    NoControllers { path: String },

    #[error("{count} configuration problem(s) found")]
    #[diagnostic(code(zenbridge::config_check), help("Run: zenbridge config check"))]
    ConfigCheckFailed { count: usize },

    #[error(transparent)]
    #[diagnostic(
        code(zenbridge::config),
        help("Run `zenbridge config path` to see which file is loaded.")
    )]
    Config(#[from] ConfigError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Operation failed: {message}")]
    #[diagnostic(code(zenbridge::operation_failed))]
    OperationFailed { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(zenbridge::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoControllers { .. } | Self::ConfigCheckFailed { .. } | Self::Config(_) => {
                exit_code::CONFIG
            }
            Self::OperationFailed { .. } | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { endpoint, reason } => {
                Self::ConnectionFailed { endpoint, reason }
            }
            CoreError::ControllerDisconnected => Self::ConnectionFailed {
                endpoint: "(disconnected)".into(),
                reason: "the session is down and reconnecting failed".into(),
            },
            CoreError::SendFailed { reason } => Self::ConnectionFailed {
                endpoint: "(connected)".into(),
                reason,
            },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::ControllerNotFound { id } => Self::NotFound {
                resource_type: "controller".into(),
                identifier: id,
                hint: "Run: zenbridge config show".into(),
            },
            CoreError::DeviceNotFound { id } => Self::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
                hint: "Run: zenbridge state".into(),
            },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::Config(ConfigError::Validation {
                field: "settings".into(),
                reason: message,
            }),
            CoreError::Encoding { message }
            | CoreError::Internal(message)
            | CoreError::PublishFailed {
                reason: message, ..
            } => Self::OperationFailed { message },
        }
    }
}
