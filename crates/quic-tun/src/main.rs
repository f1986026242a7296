use clap::Parser as _;
use tokio_util::sync::CancellationToken;
use tunnel_proto::{
    client::{ClientEndpoint, ClientEndpointOpts},
    server::{ServerEndpoint, ServerEndpointOpts},
    store::DataStore,
};

use crate::{
    cli::{Cli, ClientArgs, Command, ServerArgs},
    conf::{persistent::PersistentConfig, runtime::{RuntimeClientConfig, RuntimeServerConfig}},
};

mod cli;
mod conf;
mod log;
mod tls;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    log::init_log()?;

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    match cli.command {
        Command::Client(args) => run_client(args).await,
        Command::Server(args) => run_server(args).await,
    }
}

async fn run_client(args: ClientArgs) -> eyre::Result<()> {
    let config_path = args.config.clone();
    let persistent = PersistentConfig::load(config_path.as_deref())?;
    let runtime = RuntimeClientConfig::from_persist(persistent, args)?;

    tracing::info!("client endpoint listening on {}", &runtime.listen);

    let endpoint = ClientEndpoint::new(
        ClientEndpointOpts {
            listen: runtime.listen,
            server_addr: runtime.server_addr,
            server_name: runtime.server_name,
            tls_config: runtime.tls_config,
        },
        runtime.token_source,
        DataStore::new(),
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    endpoint.run(cancel).await?;
    Ok(())
}

async fn run_server(args: ServerArgs) -> eyre::Result<()> {
    let config_path = args.config.clone();
    let persistent = PersistentConfig::load(config_path.as_deref())?;
    let runtime = RuntimeServerConfig::from_persist(persistent, args)?;

    tracing::info!("server endpoint listening on {}", runtime.listen_addr);

    let store = DataStore::new();
    let endpoint = ServerEndpoint::new(
        ServerEndpointOpts {
            listen_addr: runtime.listen_addr,
            tls_config: runtime.tls_config,
        },
        runtime.token_parser,
        store.clone(),
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    let rest_cancel = cancel.clone();
    let mut rest_handle = None;
    if runtime.rest_enabled {
        tracing::info!("rest observation server listening on {}", runtime.rest_listen_addr);
        rest_handle = Some(tokio::spawn(tunnel_http::run(runtime.rest_listen_addr, store, rest_cancel)));
    }

    endpoint.run(cancel).await?;

    if let Some(handle) = rest_handle {
        handle.await??;
    }

    Ok(())
}
