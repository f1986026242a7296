//! On-disk/env configuration shape (component A2), mirroring the Go
//! `ServerOptions`/`ClientOptions`/`RestfulAPIOptions` structs under
//! `original_source/pkg/options` and `original_source/internal/*/options`.

use std::path::PathBuf;

use educe::Educe;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Educe)]
#[educe(Default)]
pub struct PersistentConfig {
    pub client: ClientOpt,
    pub server: ServerOpt,
    pub restfulapi: RestfulApiOpt,
}

#[derive(Debug, Clone, Deserialize, Serialize, Educe)]
#[educe(Default)]
pub struct ClientOpt {
    #[educe(Default = "tcp")]
    pub bind_protocol: String,

    #[educe(Default = "127.0.0.1")]
    pub bind_address: String,

    #[educe(Default = 6500)]
    pub bind_port: u16,

    #[educe(Default = None)]
    pub server_endpoint_socket: Option<String>,

    #[educe(Default = "localhost")]
    pub server_name: String,

    #[educe(Default = "fixed")]
    pub token_plugin: String,

    #[educe(Default = "")]
    pub token_source: String,

    #[educe(Default = None)]
    pub cert_file: Option<PathBuf>,

    #[educe(Default = None)]
    pub key_file: Option<PathBuf>,

    #[educe(Default = false)]
    pub verify_server: bool,

    #[educe(Default = None)]
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Educe)]
#[educe(Default)]
pub struct ServerOpt {
    #[educe(Default = "0.0.0.0")]
    pub bind_address: String,

    #[educe(Default = 7500)]
    pub bind_port: u16,

    #[educe(Default = None)]
    pub cert_file: Option<PathBuf>,

    #[educe(Default = None)]
    pub key_file: Option<PathBuf>,

    #[educe(Default = None)]
    pub ca_file: Option<PathBuf>,

    #[educe(Default = false)]
    pub verify_client: bool,

    #[educe(Default = "cleartext")]
    pub token_parser_plugin: String,

    #[educe(Default = "")]
    pub token_parser_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Educe)]
#[educe(Default)]
pub struct RestfulApiOpt {
    #[educe(Default = true)]
    pub enabled: bool,

    #[educe(Default = "0.0.0.0")]
    pub api_listen_address: String,

    #[educe(Default = 8086)]
    pub api_listen_port: u16,
}

impl PersistentConfig {
    /// Layers, in increasing priority: compiled-in defaults, an optional
    /// TOML file, then `QUIC_TUN_`-prefixed environment variables.
    pub fn load(config_path: Option<&std::path::Path>) -> eyre::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("QUIC_TUN_").split("_"));

        Ok(figment.extract()?)
    }
}
