use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quic-tun", about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the client endpoint: local listener, dials the server over QUIC.
    Client(ClientArgs),
    /// Run the server endpoint: QUIC listener, dials backend applications.
    Server(ServerArgs),
}

#[derive(Args)]
pub struct ClientArgs {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Local listen spec, e.g. `tcp:127.0.0.1:6500` or `unix:/tmp/quic-tun.sock`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Remote server endpoint's QUIC socket address.
    #[arg(long)]
    pub server_addr: Option<SocketAddr>,

    /// TLS server name used for the server certificate's SNI/verification.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Token source plugin name (`fixed`, `file`, `http`).
    #[arg(long)]
    pub token_plugin: Option<String>,

    /// Argument passed to the token source plugin (literal token, file path, or URL).
    #[arg(long)]
    pub token_source: Option<String>,

    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    #[arg(long)]
    pub key_file: Option<PathBuf>,

    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    #[arg(long)]
    pub verify_server: Option<bool>,
}

#[derive(Args)]
pub struct ServerArgs {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// QUIC listen address, e.g. `0.0.0.0:7500`.
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    #[arg(long)]
    pub key_file: Option<PathBuf>,

    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    #[arg(long)]
    pub verify_client: Option<bool>,

    /// Token parser plugin name (only `cleartext` is built in).
    #[arg(long)]
    pub token_parser_plugin: Option<String>,

    /// `""` for plain text, `"base64"` for base64-encoded tokens.
    #[arg(long)]
    pub token_parser_key: Option<String>,

    /// Disable the REST observation server for this run.
    #[arg(long)]
    pub no_rest: bool,

    #[arg(long)]
    pub rest_listen_addr: Option<SocketAddr>,
}
