//! Per-stream state machine: handshake, forward, classify, teardown
//! (component C5).

use std::{
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tunnel_core::{debug, info};
use uuid::Uuid;

use crate::{
    classifier::{Classification, Classifier},
    header_cache::HeaderCache,
    store::{DataStore, TunnelHandle, TunnelSnapshot},
};

const COPY_BUFFER_SIZE: usize = 16 * 1024;
const CLASSIFY_TICK: Duration = Duration::from_millis(500);
const STORE_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Timestamp for `TunnelInfo::created_at`. Falls back to a fixed marker on
/// the (practically unreachable) formatting failure rather than panicking.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

/// Lifecycle state, kept only for observability, covering the portion of
/// the C5 state machine that `Tunnel` itself owns: `NEW → OPEN →
/// CLASSIFYING → OPEN → HALF_CLOSING → CLOSED`. The handshake (and its
/// abort path) happens in `server.rs`/`client.rs` before a `Tunnel` is
/// ever constructed — `establish` only runs once a handshake has already
/// succeeded — so those states aren't values this type can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    New,
    Open,
    Classifying,
    HalfClosing,
    Closed,
}

struct Shared {
    id: Uuid,
    role: Role,
    stream_id: u64,
    client_app_addr: Option<String>,
    server_app_addr: Option<String>,
    remote_endpoint_addr: String,
    created_at: String,
    send_total: AtomicU64,
    recv_total: AtomicU64,
    classification: StdMutex<Classification>,
    state: StdMutex<State>,
}

impl Shared {
    fn set_state(&self, state: State) {
        *self.state.lock().unwrap() = state;
    }

    #[cfg(test)]
    fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    fn snapshot(&self) -> TunnelSnapshot {
        let classification = self.classification.lock().unwrap();
        TunnelSnapshot {
            id: self.id,
            stream_id: self.stream_id,
            endpoint_role: self.role,
            client_app_addr: self.client_app_addr.clone(),
            server_app_addr: self.server_app_addr.clone(),
            remote_endpoint_addr: self.remote_endpoint_addr.clone(),
            created_at: self.created_at.clone(),
            send_total: self.send_total.load(Ordering::Relaxed),
            recv_total: self.recv_total.load(Ordering::Relaxed),
            protocol: classification.protocol.clone(),
            protocol_properties: classification.properties.clone(),
        }
    }
}

struct CloseHandle {
    token: CancellationToken,
}

impl TunnelHandle for CloseHandle {
    fn close(&self) {
        self.token.cancel();
    }
}

/// Constructor parameters describing one tunnel's identity; the handshake
/// result (success/failure) is reported separately by the caller before
/// `establish` is ever invoked, matching the contract that `establish`
/// only runs once the handshake has already succeeded.
pub struct TunnelInfo {
    pub role: Role,
    pub stream_id: u64,
    pub client_app_addr: Option<String>,
    pub server_app_addr: Option<String>,
    pub remote_endpoint_addr: String,
    pub created_at: String,
}

/// Owns the two forwarding sides of one stream for the duration of
/// `establish`. `Conn` is the QUIC stream side, `App` is the local or
/// backend byte-stream side; which is the "client" and which is the
/// "server" header cache depends on `role` (the server endpoint swaps the
/// two relative to the client endpoint's orientation).
pub struct Tunnel {
    id: Uuid,
    shared: Arc<Shared>,
    classifier: Classifier,
    client_header: Arc<StdMutex<HeaderCache>>,
    server_header: Arc<StdMutex<HeaderCache>>,
    close_token: CancellationToken,
}

impl Tunnel {
    pub fn new(info: TunnelInfo, classifier: Classifier) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            shared: Arc::new(Shared {
                id,
                role: info.role,
                stream_id: info.stream_id,
                client_app_addr: info.client_app_addr,
                server_app_addr: info.server_app_addr,
                remote_endpoint_addr: info.remote_endpoint_addr,
                created_at: info.created_at,
                send_total: AtomicU64::new(0),
                recv_total: AtomicU64::new(0),
                classification: StdMutex::new(Classification::default()),
                state: StdMutex::new(State::New),
            }),
            classifier,
            client_header: Arc::new(StdMutex::new(HeaderCache::new())),
            server_header: Arc::new(StdMutex::new(HeaderCache::new())),
            close_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    fn shared_for_test(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// A child of the owning session's cancellation scope; cancelling the
    /// session cancels every tunnel derived from it.
    pub fn derive_close_token(parent: &CancellationToken) -> CancellationToken {
        parent.child_token()
    }

    pub fn with_close_token(mut self, token: CancellationToken) -> Self {
        self.close_token = token;
        self
    }

    /// Registers in the store, runs both forwarders and the classifier to
    /// completion, then removes itself. `conn` is the QUIC-stream side,
    /// `app` is the local/backend byte-stream side. When `role` is
    /// `Server`, the header-cache orientation handed to the classifier is
    /// swapped (app traffic is "client" bytes, conn traffic is "server"
    /// bytes) so discriminators always see client-originated bytes first.
    pub async fn establish<Conn, App>(mut self, store: DataStore, mut conn: Conn, mut app: App)
    where
        Conn: AsyncRead + AsyncWrite + Unpin + Send,
        App: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let handle: Arc<dyn TunnelHandle> = Arc::new(CloseHandle {
            token: self.close_token.clone(),
        });
        store.store(self.id, self.shared.snapshot(), handle);
        self.shared.set_state(State::Open);
        info!(target: "[TUNNEL]", "registered tunnel {} ({:?}, stream {})", self.id, self.shared.role, self.shared.stream_id);

        let (conn_read, conn_write) = tokio::io::split(conn);
        let (app_read, app_write) = tokio::io::split(app);

        // Orientation: client endpoint sees app traffic as "client" bytes
        // and conn traffic as "server" bytes; server endpoint swaps it.
        let (app_cache, conn_cache) = match self.shared.role {
            Role::Client => (self.client_header.clone(), self.server_header.clone()),
            Role::Server => (self.server_header.clone(), self.client_header.clone()),
        };

        let app_to_conn = forward_direction(
            app_read,
            conn_write,
            app_cache,
            &self.shared.send_total,
            self.close_token.clone(),
            store.clone(),
            self.id,
            self.shared.clone(),
        );
        let conn_to_app = forward_direction(
            conn_read,
            app_write,
            conn_cache,
            &self.shared.recv_total,
            self.close_token.clone(),
            store.clone(),
            self.id,
            self.shared.clone(),
        );

        let classify = run_classifier(
            self.id,
            &mut self.classifier,
            self.client_header.clone(),
            self.server_header.clone(),
            self.shared.clone(),
            self.close_token.clone(),
        );

        // Both forwarders must complete before `establish` returns. The
        // classifier shares the join but never blocks it: once it affirms
        // or exhausts its discriminators it simply returns early.
        tokio::join!(app_to_conn, conn_to_app, classify);

        self.shared.set_state(State::Closed);
        store.delete(self.id);
        info!(
            target: "[TUNNEL]",
            "removed tunnel {} (sent {} bytes, recv {} bytes)",
            self.id,
            self.shared.send_total.load(Ordering::Relaxed),
            self.shared.recv_total.load(Ordering::Relaxed),
        );
    }
}

#[allow(clippy::too_many_arguments)]
async fn forward_direction<R, W>(
    mut reader: R,
    mut writer: W,
    cache: Arc<StdMutex<HeaderCache>>,
    counter: &AtomicU64,
    close_token: CancellationToken,
    store: DataStore,
    id: Uuid,
    shared: Arc<Shared>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut last_store_update = Instant::now();

    loop {
        let n = tokio::select! {
            biased;
            _ = close_token.cancelled() => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            },
        };

        cache.lock().unwrap().write(&buf[..n]);

        if writer.write_all(&buf[..n]).await.is_err() {
            break;
        }
        counter.fetch_add(n as u64, Ordering::Relaxed);

        if last_store_update.elapsed() >= STORE_UPDATE_INTERVAL {
            last_store_update = Instant::now();
            if store.load_one(id).is_some() {
                store.store(
                    id,
                    shared.snapshot(),
                    Arc::new(CloseHandle {
                        token: close_token.clone(),
                    }),
                );
            }
        }
    }

    // Whichever direction exits first — EOF, a read/write error, or an
    // externally-requested close — force-closes the tunnel as a whole:
    // cancelling the shared token immediately wakes the sibling forwarder
    // (and the classifier) out of their own `read`/tick wait, the same way
    // closing both the stream and the connection does in the reference
    // implementation. Idempotent: cancelling an already-cancelled token is
    // a no-op.
    shared.set_state(State::HalfClosing);
    close_token.cancel();
    let _ = writer.shutdown().await;
    debug!(target: "[TUNNEL]", "forwarder for tunnel {} closed ({} bytes total)", id, counter.load(Ordering::Relaxed));
}

async fn run_classifier(
    id: Uuid,
    classifier: &mut Classifier,
    client_header: Arc<StdMutex<HeaderCache>>,
    server_header: Arc<StdMutex<HeaderCache>>,
    shared: Arc<Shared>,
    close_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(CLASSIFY_TICK);
    loop {
        tokio::select! {
            biased;
            _ = close_token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if classifier.is_exhausted() {
            return;
        }

        shared.set_state(State::Classifying);
        let client_bytes = client_header.lock().unwrap().bytes().to_vec();
        let server_bytes = server_header.lock().unwrap().bytes().to_vec();

        if let Some((affirmed, classification)) = classifier.tick(&client_bytes, &server_bytes) {
            debug!(
                target: "[TUNNEL]",
                "tunnel {} classifier tick: protocol={:?} affirmed={}",
                id, classification.protocol, affirmed
            );
            *shared.classification.lock().unwrap() = classification;
            if affirmed {
                return;
            }
        } else if classifier.is_exhausted() {
            return;
        }
        shared.set_state(State::Open);
    }
}

#[cfg(test)]
mod tests {
    use crate::classifier::Classifier;

    use super::*;

    fn info() -> TunnelInfo {
        TunnelInfo {
            role: Role::Client,
            stream_id: 1,
            client_app_addr: Some("127.0.0.1:1".into()),
            server_app_addr: None,
            remote_endpoint_addr: "127.0.0.1:2".into(),
            created_at: "now".into(),
        }
    }

    #[tokio::test]
    async fn registers_in_store_during_establish_and_removes_after() {
        let store = DataStore::new();
        let tunnel = Tunnel::new(info(), Classifier::new(vec![]));
        let id = tunnel.id();

        let (app_a, app_b) = tokio::io::duplex(64);
        let (conn_a, conn_b) = tokio::io::duplex(64);
        drop(app_b);
        drop(conn_b);

        let store_for_task = store.clone();
        let handle = tokio::spawn(async move {
            tunnel.establish(store_for_task, conn_a, app_a).await;
        });

        handle.await.unwrap();
        assert!(store.load_one(id).is_none());
    }

    #[tokio::test]
    async fn zero_byte_payload_closes_cleanly_with_zero_totals() {
        let store = DataStore::new();
        let tunnel = Tunnel::new(info(), Classifier::new(vec![]));
        let id = tunnel.id();

        let (app_a, app_b) = tokio::io::duplex(64);
        let (conn_a, conn_b) = tokio::io::duplex(64);
        drop(app_b);
        drop(conn_b);

        let store_check = store.clone();
        tunnel.establish(store, conn_a, app_a).await;
        assert!(store_check.load_one(id).is_none());
    }

    #[tokio::test]
    async fn natural_exit_of_one_forwarder_unblocks_the_sibling() {
        let store = DataStore::new();
        let tunnel = Tunnel::new(info(), Classifier::new(vec![]));
        let id = tunnel.id();

        let (app_a, app_b) = tokio::io::duplex(64);
        let (conn_a, conn_b) = tokio::io::duplex(64);
        // The local app side closes immediately, so `app_to_conn` exits on
        // EOF right away. `conn_b` stays open and silent: without
        // cancelling the shared close token on exit, `conn_to_app` would
        // block on `read` forever and `establish` would never return.
        drop(app_b);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            tunnel.establish(store.clone(), conn_a, app_a),
        )
        .await;

        assert!(
            result.is_ok(),
            "establish should complete once one forwarder exits naturally"
        );
        assert!(store.load_one(id).is_none());
        drop(conn_b);
    }

    #[tokio::test]
    async fn state_reaches_closed_after_establish_returns() {
        let store = DataStore::new();
        let tunnel = Tunnel::new(info(), Classifier::new(vec![]));
        let shared = tunnel.shared_for_test();

        let (app_a, app_b) = tokio::io::duplex(64);
        let (conn_a, conn_b) = tokio::io::duplex(64);
        drop(app_b);
        drop(conn_b);

        assert_eq!(shared.state(), State::New);
        tunnel.establish(store, conn_a, app_a).await;
        assert_eq!(shared.state(), State::Closed);
    }
}
