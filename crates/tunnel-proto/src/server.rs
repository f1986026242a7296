//! Server endpoint (component C8): QUIC listener, one task per session,
//! one task per stream, dialing a backend application per stream.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use snafu::ResultExt;
use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;
use tunnel_core::{addr::TargetAddr, error, info, io::quinn::QuicDuplexStream, warn};

use crate::{
    classifier::{Classifier, builtin_discriminators},
    error::{BackendDialSnafu, BindSnafu, Error, HandshakeSnafu, TokenParseSnafu, TransportSnafu},
    handshake::{ACK_LEN, CANNOT_CONN_SERVER, HANDSHAKE_SUCCESS, Handshake, PARSE_TOKEN_ERROR, TOKEN_LEN},
    store::DataStore,
    tls,
    token::TokenParser,
    tunnel::{self, Role, Tunnel, TunnelInfo},
};

pub struct ServerEndpointOpts {
    pub listen_addr: SocketAddr,
    pub tls_config: rustls::ServerConfig,
}

pub struct ServerEndpoint {
    opts: ServerEndpointOpts,
    token_parser: Arc<dyn TokenParser>,
    store: DataStore,
}

impl ServerEndpoint {
    pub fn new(opts: ServerEndpointOpts, token_parser: Arc<dyn TokenParser>, store: DataStore) -> Self {
        Self { opts, token_parser, store }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), Error> {
        let server_config = tls::quic_server_config(self.opts.tls_config).context(TransportSnafu)?;
        let endpoint = quinn::Endpoint::server(server_config, self.opts.listen_addr)
            .context(BindSnafu)
            .context(TransportSnafu)?;

        info!(target: "[SERVER]", "listening for quic sessions on {}", self.opts.listen_addr);

        let stream_id_counter = Arc::new(AtomicU64::new(0));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                incoming = endpoint.accept() => {
                    let Some(incoming) = incoming else { break };
                    let token_parser = self.token_parser.clone();
                    let store = self.store.clone();
                    let ids = stream_id_counter.clone();
                    let session_token = cancel.child_token();
                    tokio::spawn(async move {
                        match incoming.await {
                            Ok(connection) => {
                                handle_session(connection, token_parser, store, ids, session_token).await;
                            }
                            Err(err) => error!(target: "[SERVER]", "failed to accept quic session: {}", err),
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

async fn handle_session(
    connection: quinn::Connection,
    token_parser: Arc<dyn TokenParser>,
    store: DataStore,
    stream_id_counter: Arc<AtomicU64>,
    session_token: CancellationToken,
) {
    let remote_endpoint_addr = connection.remote_address().to_string();

    loop {
        tokio::select! {
            biased;
            _ = session_token.cancelled() => break,
            accepted = connection.accept_bi() => {
                let Ok((send, recv)) = accepted else { break };
                let token_parser = token_parser.clone();
                let store = store.clone();
                let remote = remote_endpoint_addr.clone();
                let stream_id = stream_id_counter.fetch_add(1, Ordering::Relaxed);
                let close_token = Tunnel::derive_close_token(&session_token);
                tokio::spawn(async move {
                    if let Err(err) = handle_stream(send, recv, token_parser, store, remote, stream_id, close_token).await {
                        warn!(target: "[SERVER]", "server tunnel failed: {}", err);
                    }
                });
            }
        }
    }
}

enum Backend {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl tokio::io::AsyncRead for Backend {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Backend::Tcp(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Backend::Unix(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for Backend {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Backend::Tcp(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Backend::Unix(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Backend::Tcp(s) => std::pin::Pin::new(s).poll_flush(cx),
            Backend::Unix(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Backend::Tcp(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Backend::Unix(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

async fn dial_backend(addr: &TargetAddr) -> std::io::Result<Backend> {
    match addr {
        TargetAddr::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            Ok(Backend::Tcp(stream))
        }
        TargetAddr::Unix { path } => {
            let stream = UnixStream::connect(path).await?;
            Ok(Backend::Unix(stream))
        }
    }
}

async fn handle_stream(
    send: quinn::SendStream,
    recv: quinn::RecvStream,
    token_parser: Arc<dyn TokenParser>,
    store: DataStore,
    remote_endpoint_addr: String,
    stream_id: u64,
    close_token: CancellationToken,
) -> Result<(), Error> {
    let mut conn = QuicDuplexStream::new(send, recv);

    let mut handshake = Handshake::new(ACK_LEN, TOKEN_LEN);
    handshake.read_frame(&mut conn).await.context(HandshakeSnafu)?;
    let token = handshake.received_str();

    let backend_addr = match token_parser.parse(&token).context(TokenParseSnafu) {
        Ok(addr) => addr,
        Err(source) => {
            warn!(target: "[SERVER]", "failed to parse token from {}: {}", remote_endpoint_addr, source);
            handshake.set_send(&[PARSE_TOKEN_ERROR]);
            let _ = handshake.write_frame(&mut conn).await;
            conn.close();
            return Err(source).context(HandshakeSnafu);
        }
    };

    let backend = match dial_backend(&backend_addr).await {
        Ok(backend) => backend,
        Err(source) => {
            warn!(target: "[SERVER]", "failed to dial backend {}: {}", backend_addr, source);
            handshake.set_send(&[CANNOT_CONN_SERVER]);
            let _ = handshake.write_frame(&mut conn).await;
            conn.close();
            return BackendDialSnafu {
                addr: backend_addr.to_string(),
                source,
            }
            .fail()
            .context(HandshakeSnafu);
        }
    };

    handshake.set_send(&[HANDSHAKE_SUCCESS]);
    handshake.write_frame(&mut conn).await.context(HandshakeSnafu)?;
    info!(target: "[SERVER]", "handshake succeeded, dialed backend {}", backend_addr);

    let info = TunnelInfo {
        role: Role::Server,
        stream_id,
        client_app_addr: None,
        server_app_addr: Some(backend_addr.to_string()),
        remote_endpoint_addr,
        created_at: tunnel::now_rfc3339(),
    };

    let tunnel = Tunnel::new(info, Classifier::new(builtin_discriminators())).with_close_token(close_token);
    tunnel.establish(store, conn, backend).await;
    Ok(())
}
