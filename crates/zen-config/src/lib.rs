//! Configuration for the zenbridge daemon and CLI.
//!
//! YAML file + `ZEN_`-prefixed environment, and translation to the
//! runtime types in `zen_core`. The file layout keeps the keys of the
//! legacy layout (`zencontrol`, `polling_interval`) as aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use zen_core::config::{DEFAULT_PORT, DEFAULT_STOP_GRACE};
use zen_core::publisher::DEFAULT_TOPIC_NAMESPACE;
use zen_core::{
    BridgeSettings, ControllerConfig, ControllerId, FrameLimits, InboundCommands, SessionOptions,
    TopicScheme,
};

pub const ENV_PREFIX: &str = "ZEN_";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── YAML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttSettings,

    /// Controller endpoints.
    #[serde(default, alias = "zencontrol")]
    pub controllers: Vec<ControllerEntry>,

    /// Seconds between refresh cycles.
    #[serde(default = "default_poll_interval", alias = "polling_interval")]
    pub poll_interval: u64,

    /// Milliseconds to wait for reports after a refresh request.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub protocol: ProtocolOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            controllers: Vec::new(),
            poll_interval: default_poll_interval(),
            settle_delay_ms: default_settle_delay_ms(),
            protocol: ProtocolOverrides::default(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}
fn default_settle_delay_ms() -> u64 {
    1000
}

/// Message bus parameters. Only `discovery_prefix` is used, as the topic
/// prefix. No broker client ships, so the connection fields are parsed
/// (and the password redacted on display) but otherwise ignored.
#[derive(Debug, Deserialize, Serialize)]
pub struct MqttSettings {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    pub user: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_secret",
        serialize_with = "serialize_redacted"
    )]
    pub password: Option<SecretString>,

    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    #[serde(default = "default_keepalive")]
    pub keepalive: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            user: None,
            password: None,
            discovery_prefix: default_discovery_prefix(),
            keepalive: default_keepalive(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_discovery_prefix() -> String {
    "homeassistant".into()
}
fn default_keepalive() -> u64 {
    60
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

#[allow(clippy::ref_option)]
fn serialize_redacted<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match secret {
        Some(_) => serializer.serialize_some(REDACTED),
        None => serializer.serialize_none(),
    }
}

/// One controller endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ControllerEntry {
    pub host: String,

    #[serde(default = "default_controller_port")]
    pub port: u16,

    pub mac: Option<String>,

    /// Display name; defaults to `host:port`.
    pub name: Option<String>,
}

fn default_controller_port() -> u16 {
    DEFAULT_PORT
}

impl ControllerEntry {
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            mac: self.mac.clone(),
        }
    }
}

/// Wire-level overrides for controllers whose firmware differs from
/// the built-in command ids.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolOverrides {
    pub handshake_command: Option<u8>,

    /// ASCII text, or `hex:` followed by hex digits.
    pub handshake_payload: Option<String>,

    pub switch_report_command: Option<u8>,
    pub level_report_command: Option<u8>,
    pub max_payload: Option<usize>,
    pub read_buffer_size: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

impl ProtocolOverrides {
    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        let mut options = SessionOptions::default();

        if let Some(command) = self.handshake_command {
            options.handshake.command = command;
        }
        if let Some(payload) = &self.handshake_payload {
            options.handshake.payload = parse_payload(payload)?;
        }
        if let Some(max_payload) = self.max_payload {
            options.limits = FrameLimits { max_payload };
        }
        if let Some(size) = self.read_buffer_size {
            if size == 0 {
                return Err(invalid("protocol.read_buffer_size", "must be greater than zero"));
            }
            options.read_buffer_size = size;
        }
        if let Some(ms) = self.connect_timeout_ms {
            options.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.write_timeout_ms {
            options.write_timeout = Duration::from_millis(ms);
        }

        options
            .handshake
            .frame(options.limits)
            .map_err(|e| invalid("protocol.handshake_payload", e.to_string()))?;
        Ok(options)
    }

    pub fn inbound_commands(&self) -> InboundCommands {
        let defaults = InboundCommands::default();
        InboundCommands {
            switch_report: self.switch_report_command.unwrap_or(defaults.switch_report),
            level_report: self.level_report_command.unwrap_or(defaults.level_report),
        }
    }
}

fn parse_payload(raw: &str) -> Result<Bytes, ConfigError> {
    let Some(hex) = raw.strip_prefix("hex:") else {
        return Ok(Bytes::copy_from_slice(raw.as_bytes()));
    };

    let digits: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(invalid("protocol.handshake_payload", "odd number of hex digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair: String = pair.iter().collect();
            u8::from_str_radix(&pair, 16)
                .map_err(|_| invalid("protocol.handshake_payload", format!("'{pair}' is not hex")))
        })
        .collect::<Result<Vec<u8>, _>>()
        .map(Bytes::from)
}

// ── Translation to runtime types ────────────────────────────────────

/// Outcome of validating one controller entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntryCheck {
    pub index: usize,
    pub id: ControllerId,
    pub error: Option<String>,
}

impl Config {
    /// Global settings shared by every controller.
    pub fn bridge_settings(&self) -> Result<BridgeSettings, ConfigError> {
        if self.poll_interval == 0 {
            return Err(invalid("poll_interval", "must be greater than zero"));
        }
        if self.mqtt.discovery_prefix.trim().is_empty() {
            return Err(invalid("mqtt.discovery_prefix", "must not be empty"));
        }

        let settings = BridgeSettings {
            poll_interval: Duration::from_secs(self.poll_interval),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            stop_grace: DEFAULT_STOP_GRACE,
            initial_refresh: true,
            topics: TopicScheme {
                prefix: self.mqtt.discovery_prefix.clone(),
                namespace: DEFAULT_TOPIC_NAMESPACE.into(),
            },
            session: self.protocol.session_options()?,
            inbound: self.protocol.inbound_commands(),
        };
        settings
            .validate()
            .map_err(|e| invalid("settings", e.to_string()))?;
        Ok(settings)
    }

    /// Every entry as a runtime config; validation happens at start.
    pub fn controller_configs(&self) -> Vec<ControllerConfig> {
        self.controllers
            .iter()
            .map(ControllerEntry::to_controller_config)
            .collect()
    }

    /// Validate each controller entry independently.
    pub fn check_controllers(&self) -> Vec<EntryCheck> {
        let mut seen = Vec::new();
        self.controllers
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let config = entry.to_controller_config();
                let id = config.id();
                let error = match config.validate() {
                    Err(e) => Some(e.to_string()),
                    Ok(()) if seen.contains(&id) => Some("duplicate controller id".into()),
                    Ok(()) => None,
                };
                seen.push(id.clone());
                EntryCheck { index, id, error }
            })
            .collect()
    }

    /// YAML rendering with secrets redacted.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config location, e.g. `~/.config/zenbridge/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "zenbridge", "zenbridge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Pick the config file: explicit path, then `./config.yaml`, then the
/// platform location. `None` when nothing exists (env and defaults only).
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|p| p.is_file())
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack: YAML file (if any) then `ZEN_` environment.
///
/// Nested keys use `__` in the environment: `ZEN_MQTT__DISCOVERY_PREFIX`.
pub fn figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load from an explicit file (which must exist) or the resolved default.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
    }
    let path = resolve_config_path(explicit);
    Ok(figment(path.as_deref()).extract()?)
}

/// Parse a YAML document without consulting files or the environment.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    Ok(Figment::new().merge(Yaml::string(yaml)).extract()?)
}
