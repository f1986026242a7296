//! Client endpoint (component C7): local TCP/UNIX listener, one QUIC
//! session per endpoint, one stream per accepted local connection.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use snafu::ResultExt;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tunnel_core::{addr::TargetAddr, info, io::quinn::QuicDuplexStream, warn};

use crate::{
    classifier::{Classifier, builtin_discriminators},
    error::{BindSnafu, Error, HandshakeSnafu, OpenStreamSnafu, TokenFetchSnafu, TransportSnafu, UnknownAckSnafu},
    handshake::{ACK_LEN, CANNOT_CONN_SERVER, HANDSHAKE_SUCCESS, Handshake, PARSE_TOKEN_ERROR, TOKEN_LEN},
    store::DataStore,
    token::{TokenContext, TokenSource},
    transport::{self, Target},
    tunnel::{self, Role, Tunnel, TunnelInfo},
};

pub struct ClientEndpointOpts {
    pub listen: TargetAddr,
    pub server_addr: SocketAddr,
    pub server_name: String,
    pub tls_config: rustls::ClientConfig,
}

pub struct ClientEndpoint {
    opts: ClientEndpointOpts,
    token_source: Arc<dyn TokenSource>,
    store: DataStore,
}

impl ClientEndpoint {
    pub fn new(opts: ClientEndpointOpts, token_source: Arc<dyn TokenSource>, store: DataStore) -> Self {
        Self { opts, token_source, store }
    }

    /// Binds the local listener, dials the single QUIC session for this
    /// endpoint, then accepts local connections until `cancel` fires. The
    /// session is shared read-only across every tunnel this endpoint opens.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), Error> {
        let connection = transport::connect(
            Target::Dial {
                addr: self.opts.server_addr,
                server_name: self.opts.server_name.clone(),
            },
            self.opts.tls_config.clone(),
        )
        .await
        .context(TransportSnafu)?;

        info!(target: "[CLIENT]", "connected to server endpoint at {}", self.opts.server_addr);

        let stream_id_counter = Arc::new(AtomicU64::new(0));
        let remote_endpoint_addr = self.opts.server_addr.to_string();

        match self.opts.listen.clone() {
            TargetAddr::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), port))
                    .await
                    .context(BindSnafu)
                    .context(TransportSnafu)?;
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        accepted = listener.accept() => {
                            let Ok((stream, peer_addr)) = accepted else { continue };
                            let conn = connection.clone();
                            let token_source = self.token_source.clone();
                            let store = self.store.clone();
                            let remote = remote_endpoint_addr.clone();
                            let ids = stream_id_counter.clone();
                            let child = cancel.child_token();
                            tokio::spawn(async move {
                                let client_app_addr = Some(peer_addr.to_string());
                                if let Err(err) = handle_local_conn(
                                    stream, peer_addr, port, conn, token_source, store, remote, ids, child, client_app_addr,
                                ).await {
                                    warn!(target: "[CLIENT]", "client tunnel failed: {}", err);
                                }
                            });
                        }
                    }
                }
            }
            TargetAddr::Unix { path } => {
                let _ = std::fs::remove_file(&path);
                let listener = UnixListener::bind(&path).context(BindSnafu).context(TransportSnafu)?;
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        accepted = listener.accept() => {
                            let Ok((stream, _)) = accepted else { continue };
                            let conn = connection.clone();
                            let token_source = self.token_source.clone();
                            let store = self.store.clone();
                            let remote = remote_endpoint_addr.clone();
                            let ids = stream_id_counter.clone();
                            let child = cancel.child_token();
                            let synthetic_peer = SocketAddr::from(([127, 0, 0, 1], 0));
                            tokio::spawn(async move {
                                if let Err(err) = handle_local_conn(
                                    stream, synthetic_peer, 0, conn, token_source, store, remote, ids, child, None,
                                ).await {
                                    warn!(target: "[CLIENT]", "client tunnel failed: {}", err);
                                }
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_local_conn<App>(
    app: App,
    peer_addr: SocketAddr,
    local_port: u16,
    connection: quinn::Connection,
    token_source: Arc<dyn TokenSource>,
    store: DataStore,
    remote_endpoint_addr: String,
    stream_id_counter: Arc<AtomicU64>,
    close_token: CancellationToken,
    client_app_addr: Option<String>,
) -> Result<(), Error>
where
    App: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (send, recv) = connection.open_bi().await.context(OpenStreamSnafu).context(TransportSnafu)?;
    let mut conn = QuicDuplexStream::new(send, recv);

    let ctx = TokenContext { client_addr: peer_addr, local_port };
    let token = token_source
        .get_token(&ctx)
        .await
        .context(TokenFetchSnafu)
        .context(HandshakeSnafu)?;

    let mut handshake = Handshake::new(TOKEN_LEN, ACK_LEN);
    handshake.set_send(&token);
    handshake.write_frame(&mut conn).await.context(HandshakeSnafu)?;
    handshake.read_frame(&mut conn).await.context(HandshakeSnafu)?;

    match handshake.received_byte() {
        HANDSHAKE_SUCCESS => {
            info!(target: "[CLIENT]", "handshake succeeded for {}", peer_addr);
        }
        ack @ (PARSE_TOKEN_ERROR | CANNOT_CONN_SERVER) => {
            warn!(target: "[CLIENT]", "handshake rejected for {} (ack {:#04x})", peer_addr, ack);
            return Ok(());
        }
        other => return UnknownAckSnafu { byte: other }.fail().context(HandshakeSnafu),
    }

    let stream_id = stream_id_counter.fetch_add(1, Ordering::Relaxed);
    let info = TunnelInfo {
        role: Role::Client,
        stream_id,
        client_app_addr,
        server_app_addr: None,
        remote_endpoint_addr,
        created_at: tunnel::now_rfc3339(),
    };

    let tunnel = Tunnel::new(info, Classifier::new(builtin_discriminators())).with_close_token(close_token);
    tunnel.establish(store, conn, app).await;
    Ok(())
}
