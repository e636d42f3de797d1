// ── Bus publishers ──
//
// The orchestrator emits one `(topic, payload)` pair per device per
// cycle. Where those go is up to the `Publisher` handed to the registry.
// None of the shipped implementations need a broker connection.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::CoreError;
use crate::model::DeviceId;

pub const DEFAULT_TOPIC_PREFIX: &str = "homeassistant";
pub const DEFAULT_TOPIC_NAMESPACE: &str = "zencontrol";

/// Sink for device state publications.
///
/// `publish` must not block on the network; implementations buffer or
/// hand off and report only local failures.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError>;
}

/// Builds `<prefix>/<namespace>/<device>/state` topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    pub prefix: String,
    pub namespace: String,
}

impl TopicScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn state_topic(&self, device: DeviceId) -> String {
        format!("{}/{}/{device}/state", self.prefix, self.namespace)
    }
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TOPIC_PREFIX.into(),
            namespace: DEFAULT_TOPIC_NAMESPACE.into(),
        }
    }
}

/// One published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
}

// ── Implementations ──────────────────────────────────────────────────

/// Emits every publication as an `info` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl Publisher for TracingPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        info!(target: "zenbridge::publish", topic, payload, "publish");
        Ok(())
    }
}

/// Writes one `{"topic":..,"payload":..}` JSON object per line.
pub struct JsonLinesPublisher {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesPublisher {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl Publisher for JsonLinesPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        let fail = |reason: String| CoreError::PublishFailed {
            topic: topic.to_owned(),
            reason,
        };
        let line = serde_json::to_string(&Publication {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
        })
        .map_err(|e| fail(e.to_string()))?;

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| fail(e.to_string()))
    }
}

impl std::fmt::Debug for JsonLinesPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesPublisher").finish_non_exhaustive()
    }
}

/// Hands publications to an in-process consumer over a bounded channel.
///
/// A full channel drops the publication and reports an error rather
/// than stalling the orchestrator.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Publication>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Publication>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        self.tx
            .try_send(Publication {
                topic: topic.to_owned(),
                payload: payload.to_owned(),
            })
            .map_err(|e| CoreError::PublishFailed {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }
}
