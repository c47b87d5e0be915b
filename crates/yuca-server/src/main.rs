use std::sync::Arc;

use tracing::{error, info, warn};

use yuca_client::{JoinClient, JoinError};
use yuca_consistency::{ConsensusError, RaftNode};
use yuca_server::config::ServerConfig;
use yuca_server::model::AppState;
use yuca_server::startup;
use yuca_storage::ConfigStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    startup::logging::init();

    info!(
        node_id = config.node_id,
        addr = %config.http_addr,
        first_node = config.first_node,
        "starting yuca node"
    );

    let settings = config.raft_settings();
    settings.ensure_dirs()?;

    let store = Arc::new(ConfigStore::open(settings.state_machine_dir())?);
    let node = Arc::new(
        RaftNode::start(
            config.node_id,
            config.advertise_addr(),
            &settings,
            store.clone(),
        )
        .await?,
    );

    if config.first_node {
        // A restarted first node finds its cluster already initialized;
        // that is the one bootstrap failure that is not fatal.
        match node.bootstrap_self().await {
            Ok(()) => info!("cluster bootstrapped"),
            Err(ConsensusError::AlreadyInitialized) => {
                warn!("cluster already initialized, skipping bootstrap")
            }
            Err(e) => return Err(e.into()),
        }
    }

    let state = Arc::new(AppState {
        node: node.clone(),
        store,
        apply_timeout: config.apply_timeout(),
    });

    let server = startup::http::config_server(state, &config.http_addr)?;
    let server_handle = server.handle();
    let mut server_task = tokio::spawn(server);

    // A non-first node registers itself as a voter after startup; an
    // unregistered node provides no value running, so join exhaustion is
    // fatal to the process.
    let (join_err_tx, mut join_err_rx) = tokio::sync::mpsc::channel::<JoinError>(1);
    if !config.first_node {
        let join_config = config.join_config()?;
        let node_id = config.node_id;
        let advertise_addr = config.advertise_addr();

        tokio::spawn(async move {
            let result = async {
                let client = JoinClient::new(join_config)?;
                client.join(node_id, &advertise_addr).await
            }
            .await;

            if let Err(e) = result {
                let _ = join_err_tx.send(e).await;
            }
        });
    }

    let exit: anyhow::Result<()> = tokio::select! {
        _ = startup::shutdown::wait_for_signal() => Ok(()),
        Some(e) = join_err_rx.recv() => {
            error!("failed to join cluster: {}", e);
            Err(anyhow::Error::new(e).context("cluster join failed"))
        }
        result = &mut server_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("http server failed")),
            Err(e) => Err(anyhow::Error::new(e).context("http server task panicked")),
        },
    };

    info!("shutting down");
    server_handle.stop(true).await;
    node.shutdown().await;

    info!("server stopped");
    exit
}
