//! Pluggable token resolution (component C1): the client side resolves an
//! outbound token, the server side parses a received token into a backend
//! address.

pub mod parser;
pub mod source;

use std::net::SocketAddr;

use async_trait::async_trait;
use snafu::Snafu;

use crate::error::{ConfigError, UnknownTokenParserSnafu, UnknownTokenSourceSnafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TokenError {
    #[snafu(display("failed to open token file {path:?}: {source}"))]
    FileOpen {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("no token found for {key:?} in {path:?}"))]
    NotFound { key: String, path: String },

    #[snafu(display("http token request to {url:?} failed: {source}"))]
    HttpRequest { url: String, source: reqwest::Error },

    #[snafu(display("failed to decode http token response: {source}"))]
    HttpDecode { source: reqwest::Error },

    #[snafu(display("failed to base64-decode token: {source}"))]
    Base64 {
        source: base64::DecodeError,
    },

    #[snafu(display("invalid backend address in token: {source}"))]
    BackendAddr { source: tunnel_core::error::Error },
}

/// The client-side context a token source resolves a token from: the local
/// application's address and the port the tunnel's listener is bound to.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext {
    pub client_addr: SocketAddr,
    pub local_port: u16,
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_token(&self, ctx: &TokenContext) -> Result<Vec<u8>, TokenError>;
}

pub trait TokenParser: Send + Sync {
    fn parse(&self, token: &str) -> Result<tunnel_core::addr::TargetAddr, TokenError>;
}

pub fn build_token_source(name: &str, arg: &str) -> Result<Box<dyn TokenSource>, ConfigError> {
    match name {
        "fixed" => Ok(Box::new(source::Fixed::new(arg))),
        "file" => Ok(Box::new(source::File::new(arg))),
        "http" => Ok(Box::new(source::Http::new(arg))),
        other => UnknownTokenSourceSnafu { name: other }.fail(),
    }
}

pub fn build_token_parser(name: &str, enc: &str) -> Result<Box<dyn TokenParser>, ConfigError> {
    match name {
        "cleartext" => Ok(Box::new(parser::Cleartext::new(enc))),
        other => UnknownTokenParserSnafu { name: other }.fail(),
    }
}
