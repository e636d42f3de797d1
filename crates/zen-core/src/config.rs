// ── Runtime bridge configuration ──
//
// These types describe *what* to connect to and how often to poll.
// They never touch disk: zen-config (or an embedding application)
// builds them and hands them to the registry.

use std::time::Duration;

use zen_tpi::{Endpoint, SessionOptions, command};

use crate::error::CoreError;
use crate::model::ControllerId;
use crate::publisher::TopicScheme;

pub const DEFAULT_PORT: u16 = 5108;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// One controller endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Display name; `host:port` is used when absent.
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    /// Hardware address, informational only.
    pub mac: Option<String>,
}

impl ControllerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            name: None,
            host: host.into(),
            port,
            mac: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> ControllerId {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => ControllerId::new(name),
            _ => ControllerId::new(format!("{}:{}", self.host, self.port)),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        let endpoint = Endpoint::new(self.host.clone(), self.port);
        match &self.mac {
            Some(mac) => endpoint.with_mac(mac.clone()),
            None => endpoint,
        }
    }

    /// Reject entries that can never connect.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: String| Err(CoreError::Config { message });

        if self.host.trim().is_empty() {
            return invalid("host must not be empty".into());
        }
        if self.host.chars().any(char::is_whitespace) {
            return invalid(format!("host '{}' contains whitespace", self.host));
        }
        if self.port == 0 {
            return invalid(format!("port for {} must be non-zero", self.host));
        }
        if let Some(mac) = &self.mac {
            if !is_valid_mac(mac) {
                return invalid(format!("'{mac}' is not a MAC address"));
            }
        }
        Ok(())
    }
}

fn is_valid_mac(mac: &str) -> bool {
    let groups: Vec<&str> = mac.split([':', '-']).collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Inbound report command ids fed to the default decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundCommands {
    pub switch_report: u8,
    pub level_report: u8,
}

impl Default for InboundCommands {
    fn default() -> Self {
        Self {
            switch_report: command::LIGHT_STATE_REPORT,
            level_report: command::LEVEL_REPORT,
        }
    }
}

/// Settings shared by every controller in a registry.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Sleep between refresh cycles.
    pub poll_interval: Duration,
    /// Wait after a refresh request before reading the cache.
    pub settle_delay: Duration,
    /// Extra time `stop` allows an orchestrator beyond its longest wait.
    pub stop_grace: Duration,
    /// Send one refresh right after the initial connect.
    pub initial_refresh: bool,
    pub topics: TopicScheme,
    pub session: SessionOptions,
    pub inbound: InboundCommands,
}

impl BridgeSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll_interval must be greater than zero".into(),
            });
        }
        if self.session.read_buffer_size == 0 {
            return Err(CoreError::Config {
                message: "read_buffer_size must be greater than zero".into(),
            });
        }
        if self.topics.prefix.trim().is_empty() {
            return Err(CoreError::Config {
                message: "topic prefix must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Upper bound on how long a stopping orchestrator may take.
    pub fn stop_bound(&self) -> Duration {
        self.poll_interval.max(self.settle_delay) + self.stop_grace
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            stop_grace: DEFAULT_STOP_GRACE,
            initial_refresh: true,
            topics: TopicScheme::default(),
            session: SessionOptions::default(),
            inbound: InboundCommands::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_defaults_to_host_port() {
        let cfg = ControllerConfig::new("10.0.0.5", 5108);
        assert_eq!(cfg.id().as_str(), "10.0.0.5:5108");
        assert_eq!(cfg.with_name("lobby").id().as_str(), "lobby");
    }

    #[test]
    fn blank_name_falls_back() {
        let cfg = ControllerConfig::new("h", 1).with_name("  ");
        assert_eq!(cfg.id().as_str(), "h:1");
    }

    #[test]
    fn validation() {
        assert!(ControllerConfig::new("10.0.0.5", 5108).validate().is_ok());
        assert!(ControllerConfig::new("", 5108).validate().is_err());
        assert!(ControllerConfig::new("bad host", 5108).validate().is_err());
        assert!(ControllerConfig::new("h", 0).validate().is_err());

        let mut cfg = ControllerConfig::new("h", 1);
        cfg.mac = Some("00:11:22:33:44:55".into());
        assert!(cfg.validate().is_ok());
        cfg.mac = Some("00:11:22".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stop_bound_uses_longest_wait() {
        let settings = BridgeSettings {
            poll_interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            stop_grace: Duration::from_secs(2),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.stop_bound(), Duration::from_secs(12));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let settings = BridgeSettings {
            poll_interval: Duration::ZERO,
            ..BridgeSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
