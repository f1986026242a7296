use snafu::Snafu;

/// Errors shared by every crate built on top of `tunnel-core`: malformed
/// addresses and raw I/O failures that haven't yet been attributed to a
/// specific protocol phase.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid address spec {spec:?}: expected <proto>:<host>:<port>"))]
    InvalidAddrSpec { spec: String },

    #[snafu(display("unknown address proto {proto:?}: expected tcp or unix"))]
    UnknownProto { proto: String },

    #[snafu(display("invalid port {port:?}"))]
    InvalidPort {
        port: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("io error: {source}"))]
    Io { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
