//! Fully-resolved configuration consumed directly by the endpoints,
//! mirroring `wind::conf::runtime::Config::from_persist`'s role of turning
//! the persistent shape into typed, ready-to-use options.

use std::{net::SocketAddr, sync::Arc};

use snafu::ResultExt;
use tunnel_core::addr::TargetAddr;
use tunnel_proto::{
    error::ListenSpecSnafu,
    token::{TokenParser, TokenSource, build_token_parser, build_token_source},
};

use crate::{
    cli::{ClientArgs, ServerArgs},
    conf::persistent::PersistentConfig,
    tls,
};

pub struct RuntimeClientConfig {
    pub listen: TargetAddr,
    pub server_addr: SocketAddr,
    pub server_name: String,
    pub tls_config: rustls::ClientConfig,
    pub token_source: Arc<dyn TokenSource>,
}

pub struct RuntimeServerConfig {
    pub listen_addr: SocketAddr,
    pub tls_config: rustls::ServerConfig,
    pub token_parser: Arc<dyn TokenParser>,
    pub rest_enabled: bool,
    pub rest_listen_addr: SocketAddr,
}

impl RuntimeClientConfig {
    pub fn from_persist(mut config: PersistentConfig, args: ClientArgs) -> eyre::Result<Self> {
        let client = &mut config.client;
        let listen_override = args.listen;

        if let Some(server_name) = args.server_name {
            client.server_name = server_name;
        }
        if let Some(token_plugin) = args.token_plugin {
            client.token_plugin = token_plugin;
        }
        if let Some(token_source) = args.token_source {
            client.token_source = token_source;
        }
        if let Some(cert_file) = args.cert_file {
            client.cert_file = Some(cert_file);
        }
        if let Some(key_file) = args.key_file {
            client.key_file = Some(key_file);
        }
        if let Some(ca_file) = args.ca_file {
            client.ca_file = Some(ca_file);
        }
        if let Some(verify_server) = args.verify_server {
            client.verify_server = verify_server;
        }

        let server_addr = match args.server_addr {
            Some(addr) => addr,
            None => client
                .server_endpoint_socket
                .as_deref()
                .ok_or_else(|| eyre::eyre!("no server_addr configured"))?
                .parse()?,
        };

        let listen_spec = listen_override.unwrap_or_else(|| match client.bind_protocol.as_str() {
            "unix" => format!("unix:{}", client.bind_address),
            _ => format!("tcp:{}:{}", client.bind_address, client.bind_port),
        });
        let listen = listen_spec
            .parse::<TargetAddr>()
            .context(ListenSpecSnafu { spec: listen_spec.clone() })?;

        let tls_config = tls::build_client_tls_config(
            client.verify_server,
            client.ca_file.as_deref(),
            client.cert_file.as_deref(),
            client.key_file.as_deref(),
        )?;

        let token_source: Arc<dyn TokenSource> =
            Arc::from(build_token_source(&client.token_plugin, &client.token_source)?);

        Ok(Self {
            listen,
            server_addr,
            server_name: client.server_name.clone(),
            tls_config,
            token_source,
        })
    }
}

impl RuntimeServerConfig {
    pub fn from_persist(mut config: PersistentConfig, args: ServerArgs) -> eyre::Result<Self> {
        let server = &mut config.server;

        if let Some(cert_file) = args.cert_file {
            server.cert_file = Some(cert_file);
        }
        if let Some(key_file) = args.key_file {
            server.key_file = Some(key_file);
        }
        if let Some(ca_file) = args.ca_file {
            server.ca_file = Some(ca_file);
        }
        if let Some(verify_client) = args.verify_client {
            server.verify_client = verify_client;
        }
        if let Some(token_parser_plugin) = args.token_parser_plugin {
            server.token_parser_plugin = token_parser_plugin;
        }
        if let Some(token_parser_key) = args.token_parser_key {
            server.token_parser_key = token_parser_key;
        }
        if args.no_rest {
            config.restfulapi.enabled = false;
        }
        if let Some(rest_addr) = args.rest_listen_addr {
            config.restfulapi.api_listen_address = rest_addr.ip().to_string();
            config.restfulapi.api_listen_port = rest_addr.port();
        }

        let listen_addr = match args.listen_addr {
            Some(addr) => addr,
            None => format!("{}:{}", server.bind_address, server.bind_port).parse()?,
        };

        let tls_config = tls::build_server_tls_config(
            server.cert_file.as_deref(),
            server.key_file.as_deref(),
            server.ca_file.as_deref(),
            server.verify_client,
        )?;

        let token_parser: Arc<dyn TokenParser> =
            Arc::from(build_token_parser(&server.token_parser_plugin, &server.token_parser_key)?);

        let rest_listen_addr = format!(
            "{}:{}",
            config.restfulapi.api_listen_address, config.restfulapi.api_listen_port
        )
        .parse()?;

        Ok(Self {
            listen_addr,
            tls_config,
            token_parser,
            rest_enabled: config.restfulapi.enabled,
            rest_listen_addr,
        })
    }
}
