use std::backtrace::Backtrace;

use snafu::Snafu;

/// The four error categories from the tunnel's error-handling design:
/// transport, handshake, forwarding, and config errors each carry their own
/// propagation policy (see the variant doc comments).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// QUIC dial/accept/stream failures. Aborts the affected tunnel; if the
    /// whole session died, every tunnel of that session aborts with it.
    #[snafu(display("transport error: {source}"))]
    Transport {
        source: TransportError,
        backtrace: Backtrace,
    },

    /// Token fetch, token parse, or backend-dial failure, or an unrecognized
    /// ack byte. Reported to the peer via the 1-byte status; the tunnel
    /// aborts without ever being registered in the data store.
    #[snafu(display("handshake error: {source}"))]
    Handshake {
        source: HandshakeError,
        backtrace: Backtrace,
    },

    /// Read/write failure during forwarding. Treated as end-of-direction:
    /// both forwarders close their shared pair and the tunnel terminates
    /// cleanly.
    #[snafu(display("forwarding error: {source}"))]
    Forwarding {
        source: ForwardingError,
        backtrace: Backtrace,
    },

    /// Boundary-only configuration error: invalid address spec, unknown
    /// token plugin name. Returned from endpoint construction; never raised
    /// during steady-state operation.
    #[snafu(display("config error: {source}"))]
    Config {
        source: ConfigError,
        backtrace: Backtrace,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display("failed to dial {addr}: {source}"))]
    Dial {
        addr: String,
        source: std::io::Error,
    },

    #[snafu(display("quic connect failed: {source}"))]
    Connect { source: quinn::ConnectError },

    #[snafu(display("quic connection failed: {source}"))]
    Connection { source: quinn::ConnectionError },

    #[snafu(display("failed to open stream: {source}"))]
    OpenStream { source: quinn::ConnectionError },

    #[snafu(display("failed to bind quic endpoint: {source}"))]
    Bind { source: std::io::Error },

    #[snafu(display("quic tls configuration error: {source}"))]
    QuicCryptoConfig {
        source: quinn::crypto::rustls::NoInitialCipherSuite,
    },

    #[snafu(display("failed to generate self-signed certificate: {source}"))]
    SelfSignedCert { source: rcgen::Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HandshakeError {
    #[snafu(display("failed to resolve outbound token: {source}"))]
    TokenFetch { source: crate::token::TokenError },

    #[snafu(display("failed to parse received token: {source}"))]
    TokenParse { source: crate::token::TokenError },

    #[snafu(display("failed to dial backend {addr}: {source}"))]
    BackendDial {
        addr: String,
        source: std::io::Error,
    },

    #[snafu(display("unknown handshake ack byte {byte:#04x}"))]
    UnknownAck { byte: u8 },

    #[snafu(display("handshake io error: {source}"))]
    Io { source: std::io::Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ForwardingError {
    #[snafu(display("read failed: {source}"))]
    Read { source: std::io::Error },

    #[snafu(display("write failed: {source}"))]
    Write { source: std::io::Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("invalid listen spec {spec:?}: {source}"))]
    ListenSpec {
        spec: String,
        source: tunnel_core::error::Error,
    },

    #[snafu(display("unknown token source plugin {name:?}"))]
    UnknownTokenSource { name: String },

    #[snafu(display("unknown token parser plugin {name:?}"))]
    UnknownTokenParser { name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
