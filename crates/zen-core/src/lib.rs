// zen-core: Device state synchronisation between TPI controllers and a message bus.

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod publisher;
pub mod refresh;
pub mod registry;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{BridgeSettings, ControllerConfig, InboundCommands};
pub use controller::Controller;
pub use error::CoreError;
pub use model::{ControllerId, DeviceId, DeviceRecord, DeviceState};
pub use publisher::{
    ChannelPublisher, JsonLinesPublisher, Publication, Publisher, TopicScheme, TracingPublisher,
};
pub use refresh::{CycleReport, RefreshOrchestrator};
pub use registry::{ControllerRegistry, RejectedController, StartReport, StopReport};
pub use store::DeviceCache;

// Transport types consumers need to build settings.
pub use zen_tpi::{Endpoint, FrameLimits, Handshake, SessionOptions, SessionState};
