use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_server::{
    AppState, KVStore, MasterAddress, ReplicationSlave, ServerConfig, create_router,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "tandem-server", version, about = "Tandem replication slave")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master to replicate from, as "<host> <port>" (overrides the config file)
    #[arg(short, long)]
    master: Option<String>,
}

fn init_tracing(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(master) = &args.master {
        let master: MasterAddress = master.parse()?;
        config.replication = config.replication.with_master(master);
    }
    config.validate()?;

    // Initialize tracing
    init_tracing(&config);

    info!("Starting Tandem Server v{}", env!("CARGO_PKG_VERSION"));

    // Create the local replica store
    let kv_store = Arc::new(KVStore::new(config.to_kv_config()));

    // Start TTL cleanup task
    kv_store.start_ttl_cleanup();

    // Start replicating
    let slave = ReplicationSlave::start(
        kv_store.clone(),
        config.replication.clone(),
        config.failover.clone(),
        config.backoff.clone(),
    )?;

    // Create router
    let app = create_router(AppState {
        slave: slave.clone(),
        kv_store,
    });

    // Bind server
    let addr = config.server_addr();
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    slave.shutdown().await;
    info!("Tandem Server stopped");

    Ok(())
}
