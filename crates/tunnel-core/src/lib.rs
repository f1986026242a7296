pub mod addr;
pub mod error;
pub mod io;
pub mod log;

use tokio::io::{AsyncRead, AsyncWrite};

/// Any byte stream the tunnel can forward over: a TCP socket, a UNIX socket,
/// or a QUIC bidirectional stream wrapped by [`io::quinn::QuicDuplexStream`].
pub trait AbstractByteStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T> AbstractByteStream for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin {}
