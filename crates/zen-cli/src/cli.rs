//! Clap derive structures for the `zenbridge` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zenbridge -- Zencontrol TPI Advanced to message-bus bridge
#[derive(Debug, Parser)]
#[command(
    name = "zenbridge",
    version,
    about = "Bridge Zencontrol lighting controllers to a message bus",
    long_about = "Keeps a persistent TPI Advanced session to each configured controller,\n\
        caches device state from inbound reports, and publishes it on a fixed\n\
        cadence as <prefix>/zencontrol/<device>/state.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (default: ./config.yaml, then the platform config dir)
    #[arg(long, short = 'c', env = "ZEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PublisherKind {
    /// Emit publications as log events
    Log,
    /// Write {"topic","payload"} JSON lines to stdout
    JsonLines,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    ///
    /// Publications go to the log or to stdout as JSON lines; no MQTT
    /// broker client ships with zenbridge. Of the `mqtt` config section
    /// only `discovery_prefix` is used, as the topic prefix. Its host,
    /// port, user, password and keepalive are accepted but ignored.
    Run(RunArgs),

    /// Query controllers and show device state
    #[command(alias = "st")]
    State(StateArgs),

    /// Switch or dim a light
    Set(SetArgs),

    /// Run a single refresh cycle and publish the result
    Refresh(RefreshArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Subcommand Args ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Where state publications go
    #[arg(long, default_value = "log")]
    pub publisher: PublisherKind,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Only this controller (name or host:port)
    #[arg(long)]
    pub controller: Option<String>,

    /// Only this device id
    #[arg(long)]
    pub device: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Controller (name or host:port)
    pub controller: String,

    /// Device id
    pub device: u32,

    /// on, off, or an arc level 0-254
    pub state: String,

    /// Return as soon as the request is written
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Only this controller (name or host:port)
    #[arg(long)]
    pub controller: Option<String>,

    /// Where state publications go
    #[arg(long, default_value = "json-lines")]
    pub publisher: PublisherKind,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Validate every controller entry and the global settings
    Check,
    /// Print the config file that would be loaded
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
