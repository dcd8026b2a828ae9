//! xapsd binary entry point.
//!
//! Usage:
//! ```bash
//! xapsd --config /etc/xapsd/xapsd.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use xapsd::config::Config;
use xapsd::pipeline::DeliveryPipeline;
use xapsd::registry::RegistrationStore;
use xapsd::server::CommandServer;
use xapsd::transport::TlsGatewayConnector;

/// Push-notification relay daemon for mail servers.
#[derive(Parser, Debug)]
#[command(name = "xapsd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "/etc/xapsd/xapsd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    // Install the rustls crypto provider before any TLS configuration is
    // built; without a default provider rustls panics.
    rustls::crypto::ring::default_provider().install_default().ok();

    anyhow::ensure!(
        !config.gateway.topic.is_empty(),
        "gateway.topic must be set (the push certificate's subject UID)"
    );

    let store = RegistrationStore::open(&config.database.file)
        .context("cannot open registration database")?;
    tracing::info!(
        "Loaded {} users from {}",
        store.user_count(),
        config.database.file.display()
    );

    let connector = Arc::new(
        TlsGatewayConnector::from_config(&config.gateway)
            .context("cannot configure the gateway TLS client")?,
    );
    let pipeline = Arc::new(DeliveryPipeline::new());
    tokio::spawn(pipeline.clone().run(connector, config.delivery.clone()));

    let server = Arc::new(CommandServer::new(
        store,
        pipeline,
        config.gateway.topic.clone(),
    ));
    let listener = server
        .bind(&config.socket.path)
        .context("cannot bind the command socket")?;
    tracing::info!("Listening on {}", config.socket.path.display());

    let result = tokio::select! {
        served = server.clone().serve(listener) => served.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    // Leave the path free for the next start; queued notifications are not
    // drained on shutdown.
    let _ = std::fs::remove_file(&config.socket.path);
    result
}
