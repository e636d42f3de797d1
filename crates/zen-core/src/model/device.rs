// ── Device domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zen_tpi::ReportValue;

use crate::error::CoreError;

/// Device address on one controller. Matches the `u32` wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for DeviceId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|e| CoreError::ValidationFailed {
                message: format!("invalid device id '{s}': {e}"),
            })
    }
}

/// Last-known state of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeviceState {
    /// Switched output.
    OnOff(bool),
    /// Dimmer arc level, `0..=254`.
    Level(u8),
}

impl DeviceState {
    /// Highest valid arc level. 255 is the DALI "mask" value.
    pub const MAX_LEVEL: u8 = 254;

    /// Byte carried in a set-light-state frame.
    pub fn wire_value(self) -> u8 {
        match self {
            Self::OnOff(on) => u8::from(on),
            Self::Level(level) => level,
        }
    }

    pub fn is_on(self) -> bool {
        match self {
            Self::OnOff(on) => on,
            Self::Level(level) => level > 0,
        }
    }
}

/// Bus rendering: `on`/`off` for switches, the decimal arc level for dimmers.
impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnOff(true) => f.write_str("on"),
            Self::OnOff(false) => f.write_str("off"),
            Self::Level(level) => level.fmt(f),
        }
    }
}

impl FromStr for DeviceState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(Self::OnOff(true)),
            "off" | "false" => Ok(Self::OnOff(false)),
            other => match other.parse::<u8>() {
                Ok(level) if level <= Self::MAX_LEVEL => Ok(Self::Level(level)),
                _ => Err(CoreError::ValidationFailed {
                    message: format!(
                        "invalid state '{s}': expected on, off or a level 0-{}",
                        Self::MAX_LEVEL
                    ),
                }),
            },
        }
    }
}

impl From<ReportValue> for DeviceState {
    fn from(value: ReportValue) -> Self {
        match value {
            ReportValue::Switch(on) => Self::OnOff(on),
            ReportValue::Level(level) => Self::Level(level),
        }
    }
}

/// A cached device state with the time it was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub state: DeviceState,
    pub updated_at: DateTime<Utc>,
}
