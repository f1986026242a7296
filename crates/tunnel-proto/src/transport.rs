//! Transport adapter (component C9): the client endpoint's QUIC session can
//! either be dialed directly from a server address, or bound onto a packet
//! socket a NAT-traversal helper has already punched a hole with. Either
//! way the result is one `quinn::Connection`.

use std::{net::SocketAddr, sync::Arc};

use quinn::{Endpoint, EndpointConfig, TokioRuntime};
use snafu::ResultExt;

use crate::{
    error::{BindSnafu, ConnectSnafu, ConnectionSnafu, TransportError},
    tls,
};

/// The two shapes C9 accepts for establishing the client-side QUIC
/// session (spec.md §4.6).
pub enum Target {
    /// Dial a server address fresh; a local ephemeral port is bound.
    Dial { addr: SocketAddr, server_name: String },
    /// Bind QUIC onto a socket the caller already opened (e.g. after a
    /// NAT-traversal hole-punch), talking to `addr`.
    Socket {
        socket: std::net::UdpSocket,
        addr: SocketAddr,
        server_name: String,
    },
}

pub async fn connect(
    target: Target,
    tls_config: rustls::ClientConfig,
) -> Result<quinn::Connection, TransportError> {
    let client_config = tls::quic_client_config(tls_config)?;

    let (socket, addr, server_name) = match target {
        Target::Dial { addr, server_name } => {
            let bind_addr = SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0));
            let socket = std::net::UdpSocket::bind(bind_addr).context(BindSnafu)?;
            (socket, addr, server_name)
        }
        Target::Socket { socket, addr, server_name } => (socket, addr, server_name),
    };

    let mut endpoint = Endpoint::new(EndpointConfig::default(), None, socket, Arc::new(TokioRuntime))
        .context(BindSnafu)?;
    endpoint.set_default_client_config(client_config);

    let connecting = endpoint.connect(addr, &server_name).context(ConnectSnafu)?;
    let connection = connecting.await.context(ConnectionSnafu)?;
    Ok(connection)
}
