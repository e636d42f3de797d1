// ── Controller abstraction ──
//
// One configured endpoint: a TPI session, the device cache it feeds,
// and the request surface the orchestrator and CLI use. The session's
// receive handler decodes inbound frames straight into the cache.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, trace, warn};
use zen_tpi::{
    Connector, DeviceReportParser, Frame, FrameDecoder, InboundFrame, Session, SessionOptions,
    SessionState, TcpConnector,
};

use crate::config::{ControllerConfig, InboundCommands};
use crate::error::CoreError;
use crate::model::{ControllerId, DeviceId, DeviceRecord, DeviceState};
use crate::store::DeviceCache;

/// A controller connection and its device cache.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    id: ControllerId,
    config: ControllerConfig,
    session: Session,
    cache: Arc<DeviceCache>,
}

impl Controller {
    /// Create a TCP-backed controller. Does NOT connect.
    pub fn new(config: ControllerConfig, options: SessionOptions, inbound: InboundCommands) -> Self {
        Self::with_connector(config, options, inbound, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        config: ControllerConfig,
        options: SessionOptions,
        inbound: InboundCommands,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let id = config.id();
        let session = Session::with_connector(config.endpoint(), options, connector);
        let cache = Arc::new(DeviceCache::new());
        wire_receive_path(&id, &session, &cache, decoder_for(inbound));

        Self {
            inner: Arc::new(ControllerInner {
                id,
                config,
                session,
                cache,
            }),
        }
    }

    pub fn id(&self) -> &ControllerId {
        &self.inner.id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn cache(&self) -> &Arc<DeviceCache> {
        &self.inner.cache
    }

    pub fn connection_state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe_state()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.session.connect().await?;
        Ok(())
    }

    /// Close the session and wait for its receive task.
    pub async fn shutdown(&self) {
        self.inner.session.shutdown().await;
        debug!(controller = %self.inner.id, "controller shut down");
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Ask the controller to report every device.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        self.send(&Frame::query_all_devices()).await
    }

    /// Ask the controller to report one device.
    pub async fn request_device_state(&self, device: DeviceId) -> Result<(), CoreError> {
        self.send(&Frame::query_light_state(device.get())).await
    }

    /// Ask the controller to switch or dim a light.
    ///
    /// The cache is not touched; it changes when the controller reports
    /// the new state.
    pub async fn request_set_state(
        &self,
        device: DeviceId,
        desired: DeviceState,
    ) -> Result<(), CoreError> {
        if let DeviceState::Level(level) = desired {
            if level > DeviceState::MAX_LEVEL {
                return Err(CoreError::ValidationFailed {
                    message: format!("level {level} exceeds {}", DeviceState::MAX_LEVEL),
                });
            }
        }
        self.send(&Frame::set_light_state(device.get(), desired.wire_value()))
            .await
    }

    async fn send(&self, frame: &Frame) -> Result<(), CoreError> {
        self.inner.session.send_frame(frame).await.map_err(|e| {
            debug!(controller = %self.inner.id, command = frame.command(), error = %e, "request failed");
            CoreError::from(e)
        })
    }

    // ── Cache accessors ──────────────────────────────────────────

    pub fn get_state(&self, device: DeviceId) -> Option<DeviceState> {
        self.inner.cache.get(device)
    }

    pub fn device_record(&self, device: DeviceId) -> Option<DeviceRecord> {
        self.inner.cache.record(device)
    }

    pub fn devices_snapshot(&self) -> Vec<DeviceRecord> {
        self.inner.cache.snapshot()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.inner.id)
            .field("session", &self.inner.session)
            .field("devices", &self.inner.cache.len())
            .finish()
    }
}

// ── Receive path ─────────────────────────────────────────────────

fn decoder_for(inbound: InboundCommands) -> FrameDecoder {
    let mut decoder = FrameDecoder::empty();
    decoder
        .register(inbound.switch_report, DeviceReportParser::Switch)
        .register(inbound.level_report, DeviceReportParser::Level);
    decoder
}

/// A decoder bound to the connection whose bytes it has buffered.
struct StreamDecoder {
    generation: u64,
    decoder: FrameDecoder,
}

/// Route inbound chunks through `decoder` into `cache`.
///
/// The handler holds only the cache and decoder, never the session, so
/// no reference cycle forms.
fn wire_receive_path(
    id: &ControllerId,
    session: &Session,
    cache: &Arc<DeviceCache>,
    decoder: FrameDecoder,
) {
    let id = id.clone();
    let cache = Arc::clone(cache);
    let decoder = Mutex::new(StreamDecoder {
        generation: 0,
        decoder,
    });

    session.set_receive_handler(move |generation, chunk| {
        let frames = {
            let mut stream = decoder.lock().unwrap_or_else(PoisonError::into_inner);
            if stream.generation != generation {
                if stream.decoder.pending_len() > 0 {
                    debug!(
                        controller = %id,
                        dropped = stream.decoder.pending_len(),
                        "discarding partial frame from previous connection"
                    );
                }
                stream.decoder.reset();
                stream.generation = generation;
            }
            stream.decoder.feed(chunk)
        };

        for frame in frames {
            match frame {
                Ok(InboundFrame::DeviceReport { device_id, value }) => {
                    let record = cache.set(DeviceId::new(device_id), value.into());
                    trace!(controller = %id, device = %record.id, state = %record.state, "device report");
                }
                Ok(InboundFrame::Other { command, body }) => {
                    debug!(controller = %id, command, len = body.len(), "unhandled inbound frame");
                }
                Err(e) => warn!(controller = %id, error = %e, "inbound data dropped"),
            }
        }
    });
}
