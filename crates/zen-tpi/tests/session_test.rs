// Integration tests for `Session` against loopback and in-memory controllers.
#![allow(clippy::unwrap_used)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use zen_tpi::{
    ConnectError, Connector, Endpoint, Frame, SendError, Session, SessionOptions, SessionState,
    Transport,
};

const HELLO: &[u8] = b"\x90TPI_ADVANCED_HELLO";

// ── Helpers ─────────────────────────────────────────────────────────

/// In-memory connector that hands the controller side of each pipe to the test.
#[derive(Default)]
struct PipeConnector {
    attempts: AtomicUsize,
    refuse: bool,
    /// Pipe buffer size; 0 means 64 KiB.
    capacity: usize,
    peers: Mutex<Vec<DuplexStream>>,
}

impl PipeConnector {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Pipes so small that a write blocks until the peer reads.
    fn tight(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_peer(&self) -> DuplexStream {
        self.peers.lock().unwrap().remove(0)
    }
}

impl Connector for PipeConnector {
    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, io::Result<Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Box::pin(async { Err(io::ErrorKind::ConnectionRefused.into()) });
        }

        let capacity = if self.capacity == 0 { 64 * 1024 } else { self.capacity };
        let (client, controller) = tokio::io::duplex(capacity);
        self.peers.lock().unwrap().push(controller);
        let (reader, writer) = tokio::io::split(client);
        Box::pin(async move {
            Ok(Transport {
                reader: Box::new(reader),
                writer: Box::new(writer),
            })
        })
    }
}

fn pipe_session(connector: &Arc<PipeConnector>) -> Session {
    Session::with_connector(
        Endpoint::new("pipe", 5108),
        SessionOptions::default(),
        Arc::clone(connector) as Arc<dyn Connector>,
    )
}

async fn read_n(peer: &mut DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(2), peer.read_exact(&mut buf))
        .await
        .expect("read timeout")
        .unwrap();
    buf
}

async fn wait_for_state(session: &Session, want: SessionState) {
    let mut rx = session.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
        .await
        .expect("state wait timeout")
        .unwrap();
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_precedes_first_caller_frame() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);

    session.send_frame(&Frame::query_all_devices()).await.unwrap();

    let mut peer = connector.take_peer();
    let written = read_n(&mut peer, HELLO.len() + 1).await;
    assert_eq!(&written[..HELLO.len()], HELLO);
    assert_eq!(written[HELLO.len()], 0x01);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn handshake_over_real_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; HELLO.len() + 6];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    });

    let session = Session::new(Endpoint::new("127.0.0.1", port), SessionOptions::default());
    session.connect().await.unwrap();
    session
        .send_frame(&Frame::set_light_state(7, 1))
        .await
        .unwrap();

    let written = accept.await.unwrap();
    assert_eq!(&written[..HELLO.len()], HELLO);
    assert_eq!(&written[HELLO.len()..], &[0x02, 0, 0, 0, 7, 1]);
    session.shutdown().await;
}

#[tokio::test]
async fn custom_handshake_is_used() {
    let connector = Arc::new(PipeConnector::default());
    let options = SessionOptions {
        handshake: zen_tpi::Handshake {
            command: 0x91,
            payload: bytes_of(b"\x01"),
        },
        ..SessionOptions::default()
    };
    let session = Session::with_connector(
        Endpoint::new("pipe", 1),
        options,
        Arc::clone(&connector) as Arc<dyn Connector>,
    );

    session.connect().await.unwrap();
    let mut peer = connector.take_peer();
    assert_eq!(read_n(&mut peer, 2).await, vec![0x91, 0x01]);
}

fn bytes_of(b: &'static [u8]) -> bytes::Bytes {
    bytes::Bytes::from_static(b)
}

// ── Connect / reconnect ─────────────────────────────────────────────

#[tokio::test]
async fn connect_is_idempotent() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);

    assert_ok!(session.connect().await);
    assert_ok!(session.connect().await);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn send_on_unreachable_session_tries_connect_exactly_once() {
    let connector = Arc::new(PipeConnector::refusing());
    let session = pipe_session(&connector);

    let err = assert_err!(session.send_frame(&Frame::query_all_devices()).await);

    assert!(matches!(err, SendError::NotConnected));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn refused_tcp_connect_reports_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let session = Session::new(Endpoint::new("127.0.0.1", port), SessionOptions::default());
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Unreachable { .. }), "{err:?}");
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn peer_close_disconnects_and_next_send_reconnects() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);

    session.connect().await.unwrap();
    let peer = connector.take_peer();
    drop(peer);

    wait_for_state(&session, SessionState::Disconnected).await;

    session.send_frame(&Frame::query_all_devices()).await.unwrap();
    assert_eq!(connector.attempts(), 2);

    let mut peer = connector.take_peer();
    let written = read_n(&mut peer, HELLO.len() + 1).await;
    assert_eq!(&written[..HELLO.len()], HELLO);
}

// ── Receive path ────────────────────────────────────────────────────

#[tokio::test]
async fn receive_handler_sees_inbound_chunks() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    session.set_receive_handler(move |_, chunk| {
        let _ = tx.send(chunk.to_vec());
    });

    session.connect().await.unwrap();
    let mut peer = connector.take_peer();
    peer.write_all(&[0x03, 0, 0, 0, 7, 1]).await.unwrap();

    let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk, vec![0x03, 0, 0, 0, 7, 1]);
}

#[tokio::test]
async fn receive_handler_sees_a_new_generation_after_reconnect() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
    session.set_receive_handler(move |generation, _| {
        let _ = tx.send(generation);
    });

    session.connect().await.unwrap();
    let mut peer = connector.take_peer();
    peer.write_all(&[0x03, 0, 0]).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    drop(peer);
    wait_for_state(&session, SessionState::Disconnected).await;

    session.connect().await.unwrap();
    let mut peer = connector.take_peer();
    peer.write_all(&[0x03, 0, 0, 0, 7, 1]).await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(second > first, "generation {second} should follow {first}");
}

// ── Close ───────────────────────────────────────────────────────────

#[tokio::test]
async fn close_during_handshake_leaves_no_live_writer() {
    // The handshake cannot fit the pipe, so connect blocks holding the
    // write half until the controller reads.
    let connector = Arc::new(PipeConnector::tight(4));
    let session = pipe_session(&connector);

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    wait_for_state(&session, SessionState::Handshaking).await;

    let closing = {
        let session = session.clone();
        tokio::spawn(async move { session.close().await })
    };
    // Let close take the link and queue behind the handshake write.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut peer = connector.take_peer();
    let _ = read_n(&mut peer, HELLO.len()).await;

    closing.await.unwrap();
    let connected = connecting.await.unwrap();
    assert!(matches!(connected, Err(ConnectError::Handshake { .. })));
    assert_eq!(session.state(), SessionState::Disconnected);

    // The next send opens a fresh connection instead of writing into an
    // orphaned one.
    let send = {
        let session = session.clone();
        tokio::spawn(async move { session.send_frame(&Frame::query_all_devices()).await })
    };
    let mut fresh = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if connector.attempts() == 2 {
                if let Some(peer) = connector.peers.lock().unwrap().pop() {
                    return peer;
                }
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    let written = read_n(&mut fresh, HELLO.len() + 1).await;
    assert_eq!(&written[..HELLO.len()], HELLO);
    assert_eq!(written[HELLO.len()], 0x01);
    assert_ok!(send.await.unwrap());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn connect_after_close_yields_a_ready_session() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);

    session.close().await;
    session.connect().await.unwrap();
    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn close_is_idempotent_after_connect() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);
    session.connect().await.unwrap();

    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn shutdown_joins_receive_task_and_controller_sees_eof() {
    let connector = Arc::new(PipeConnector::default());
    let session = pipe_session(&connector);
    session.connect().await.unwrap();
    let mut peer = connector.take_peer();
    let _ = read_n(&mut peer, HELLO.len()).await;

    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .expect("shutdown should not hang");

    assert_eq!(session.state(), SessionState::Disconnected);
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(2), peer.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}
