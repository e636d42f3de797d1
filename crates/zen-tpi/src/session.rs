// ── TPI session ──
//
// One logical connection to one controller. The session connects lazily,
// performs the advanced-mode handshake before any other traffic, runs a
// receive task per connection, and closes itself on any I/O fault. It
// never retries on its own: the next `send_frame` (or an explicit
// `connect`) re-establishes the link.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ConnectError, SendError};
use crate::frame::{Frame, FrameLimits, Handshake};

/// Default receive buffer size (bytes per read).
pub const DEFAULT_READ_BUFFER: usize = 4096;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Network location of one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Hardware identifier, informational only.
    pub mac: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            mac: None,
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Transport seam ───────────────────────────────────────────────────

/// The two halves of an open connection.
pub struct Transport {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

/// Opens transports to an endpoint.
///
/// Production code uses [`TcpConnector`]; tests plug in in-memory pipes.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<Transport>>;
}

/// Plain TCP, no TLS, Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<Transport>> {
        let addr = endpoint.to_string();
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok(Transport {
                reader: Box::new(reader),
                writer: Box::new(writer),
            })
        })
    }
}

// ── Options & state ──────────────────────────────────────────────────

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub handshake: Handshake,
    pub limits: FrameLimits,
    pub read_buffer_size: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake: Handshake::default(),
            limits: FrameLimits::default(),
            read_buffer_size: DEFAULT_READ_BUFFER,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
}

struct HandlerSlot(Box<dyn Fn(u64, &[u8]) + Send + Sync>);

/// The write half of one connection, tagged with its generation.
struct LinkWriter {
    generation: u64,
    io: BoxedWriter,
}

/// The live connection: its generation, shutdown signal and receive task.
struct Link {
    generation: u64,
    cancel: CancellationToken,
    receiver: Option<JoinHandle<()>>,
}

// ── Session ──────────────────────────────────────────────────────────

/// A persistent, lazily reconnecting TPI session.
///
/// Cheaply cloneable; all clones share one connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    endpoint: Endpoint,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    state: watch::Sender<SessionState>,
    connect_lock: Mutex<()>,
    writer: Mutex<Option<LinkWriter>>,
    link: StdMutex<Option<Link>>,
    handler: ArcSwapOption<HandlerSlot>,
    generation: AtomicU64,
}

impl Session {
    /// Create a TCP session. Does NOT connect.
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        Self::with_connector(endpoint, options, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        endpoint: Endpoint,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                endpoint,
                options,
                connector,
                state,
                connect_lock: Mutex::new(()),
                writer: Mutex::new(None),
                link: StdMutex::new(None),
                handler: ArcSwapOption::empty(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Register the callback invoked with every received chunk.
    ///
    /// The first argument is the connection generation. It grows with
    /// every connect, so a change means the previous byte stream ended
    /// and anything buffered from it is garbage.
    ///
    /// The callback runs on the receive task before the next read is
    /// issued, so a slow handler throttles the connection.
    pub fn set_receive_handler<F>(&self, handler: F)
    where
        F: Fn(u64, &[u8]) + Send + Sync + 'static,
    {
        self.inner
            .handler
            .store(Some(Arc::new(HandlerSlot(Box::new(handler)))));
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect and handshake. A no-op when already Ready.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        let inner = &self.inner;
        let endpoint = inner.endpoint.to_string();
        inner.set_state(SessionState::Connecting);
        debug!(%endpoint, "connecting");

        let timeout = inner.options.connect_timeout;
        let transport =
            match tokio::time::timeout(timeout, inner.connector.connect(&inner.endpoint)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(source)) => {
                    inner.set_state(SessionState::Disconnected);
                    return Err(ConnectError::Unreachable { endpoint, source });
                }
                Err(_) => {
                    inner.set_state(SessionState::Disconnected);
                    return Err(ConnectError::Timeout {
                        endpoint,
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            };

        let Transport { reader, writer } = transport;
        let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        // Hold the write half until the handshake is out so no caller's
        // frame can precede it.
        let mut writer_guard = inner.writer.lock().await;
        *writer_guard = Some(LinkWriter {
            generation,
            io: writer,
        });

        inner.install_link(Link {
            generation,
            cancel: cancel.clone(),
            receiver: None,
        });
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(inner),
            reader,
            generation,
            cancel,
        ));
        inner.attach_receiver(generation, receiver);

        inner.set_state(SessionState::Handshaking);
        let handshake = inner
            .options
            .handshake
            .frame(inner.options.limits)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e));
        let written = match (handshake, writer_guard.as_mut()) {
            (Ok(frame), Some(w)) => {
                write_all(&mut w.io, frame.as_bytes(), inner.options.write_timeout).await
            }
            (Err(e), _) => Err(e),
            (Ok(_), None) => Err(io::ErrorKind::NotConnected.into()),
        };
        drop(writer_guard);

        if let Err(source) = written {
            inner.close_generation(generation).await;
            return Err(ConnectError::Handshake { endpoint, source });
        }

        if !inner.promote_ready(generation) {
            return Err(ConnectError::Handshake {
                endpoint,
                source: io::ErrorKind::ConnectionReset.into(),
            });
        }

        info!(%endpoint, generation, "session ready");
        Ok(())
    }

    /// Write one frame, reconnecting once first if the session is down.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), SendError> {
        if !self.is_ready() {
            if let Err(e) = self.connect().await {
                warn!(endpoint = %self.inner.endpoint, error = %e, "reconnect before send failed");
                return Err(SendError::NotConnected);
            }
        }

        let mut writer = self.inner.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return Err(SendError::NotConnected);
        };

        let generation = w.generation;
        match write_all(&mut w.io, frame.as_bytes(), self.inner.options.write_timeout).await {
            Ok(()) => {
                trace!(command = frame.command(), len = frame.len(), "frame sent");
                Ok(())
            }
            Err(e) => {
                drop(writer);
                warn!(endpoint = %self.inner.endpoint, error = %e, "send failed, closing session");
                self.inner.close_generation(generation).await;
                Err(SendError::IoFailure(e))
            }
        }
    }

    /// Close the current connection. Idempotent and safe from any task.
    pub async fn close(&self) {
        let link = self.inner.take_link(None);
        self.inner.teardown(link).await;
    }

    /// Close and wait for the receive task to exit.
    pub async fn shutdown(&self) {
        let receiver = {
            let mut link = self.inner.lock_link();
            link.as_mut().and_then(|l| l.receiver.take())
        };
        self.close().await;
        if let Some(handle) = receiver {
            if let Err(e) = handle.await {
                warn!(endpoint = %self.inner.endpoint, error = %e, "receive task ended abnormally");
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Shared internals ─────────────────────────────────────────────────

impl SessionInner {
    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install_link(&self, link: Link) {
        if let Some(stale) = self.lock_link().replace(link) {
            stale.cancel.cancel();
        }
    }

    fn attach_receiver(&self, generation: u64, handle: JoinHandle<()>) {
        if let Some(link) = self
            .lock_link()
            .as_mut()
            .filter(|l| l.generation == generation)
        {
            link.receiver = Some(handle);
        }
    }

    /// Mark Ready, unless the connection was torn down mid-handshake.
    fn promote_ready(&self, generation: u64) -> bool {
        let link = self.lock_link();
        let current = link.as_ref().is_some_and(|l| l.generation == generation);
        if current {
            self.set_state(SessionState::Ready);
        }
        current
    }

    /// Take the current link; with `Some(generation)`, only if it matches.
    fn take_link(&self, generation: Option<u64>) -> Option<Link> {
        let mut link = self.lock_link();
        match generation {
            Some(g) if link.as_ref().is_none_or(|l| l.generation != g) => None,
            _ => link.take(),
        }
    }

    /// Close the connection only if it is still the one identified by
    /// `generation`. Keeps a dying receive task from closing its successor.
    async fn close_generation(&self, generation: u64) {
        if let Some(link) = self.take_link(Some(generation)) {
            self.teardown(Some(link)).await;
        }
    }

    /// Cancel `link` and shut down its own write half.
    ///
    /// A connect racing with this call may already own the writer slot
    /// and the link; neither is touched, and the state is left to it.
    async fn teardown(&self, link: Option<Link>) {
        if let Some(link) = link {
            link.cancel.cancel();

            let writer = {
                let mut slot = self.writer.lock().await;
                if slot.as_ref().is_some_and(|w| w.generation == link.generation) {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(mut w) = writer {
                if let Err(e) = w.io.shutdown().await {
                    trace!(error = %e, "transport shutdown failed (ignored)");
                }
            }
            debug!(endpoint = %self.endpoint, generation = link.generation, "session closed");
        }

        // Checked under the link lock: `promote_ready` sets Ready under it too.
        let current = self.lock_link();
        if current.is_none() {
            self.set_state(SessionState::Disconnected);
        }
    }
}

async fn write_all(writer: &mut BoxedWriter, bytes: &[u8], timeout: Duration) -> io::Result<()> {
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
    }
}

// ── Receive task ─────────────────────────────────────────────────────

async fn receive_loop(
    inner: Arc<SessionInner>,
    mut reader: BoxedReader,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; inner.options.read_buffer_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!(endpoint = %inner.endpoint, "controller closed the connection");
                inner.close_generation(generation).await;
                break;
            }
            Ok(n) => match inner.handler.load_full() {
                Some(handler) => (handler.0)(generation, &buf[..n]),
                None => trace!(bytes = n, "no receive handler, dropping chunk"),
            },
            Err(e) => {
                if !cancel.is_cancelled() {
                    warn!(endpoint = %inner.endpoint, error = %e, "receive failed");
                }
                inner.close_generation(generation).await;
                break;
            }
        }
    }

    debug!(generation, "receive loop exiting");
}
