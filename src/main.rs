//! irclogd - IRC logging daemon.

use anyhow::Context;
use irclogd::config::{Config, validation};
use irclogd::db::Database;
use irclogd::ingest::{self, IngestPipeline, NOTICE_CAPACITY};
use irclogd::router::CommandRouter;
use irclogd::session::{self, SessionRegistry, SessionSettings};
use irclogd::tail::TailServer;
use irclogd::telemetry::{self, spans};
use irclogd::transport::TcpTransport;
use irclogd::{api, metrics};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "irclogd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    telemetry::init(&config.logging);

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(path = %config_path, database = %config.database.path, "Starting irclogd");

    let db = Database::new(&config.database.path).await?;
    for seed in &config.networks {
        let (id, inserted) = db.networks().seed(seed, &config.logger.realname).await?;
        if inserted {
            info!(network = %seed.name, network_id = %id, "Seeded network from config");
        }
    }

    let networks = db.networks().load_config().await.context("no networks configured")?;
    if let Err(errors) = validation::validate_networks(&networks) {
        for e in &errors {
            error!(error = %e, "Invalid stored network");
        }
        anyhow::bail!("{} invalid stored network(s)", errors.len());
    }
    let networks = Arc::new(networks);

    metrics::init();

    let shutdown = CancellationToken::new();
    let (records_tx, records_rx) = ingest::queue(config.logger.ingest_queue_capacity);
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

    let settings = SessionSettings::from(&config.logger);
    let mut handles = Vec::new();
    let mut session_tasks = Vec::new();
    for network in networks.enabled() {
        let transport = TcpTransport::new(
            config.logger.connect_timeout(),
            config.logger.registration_timeout(),
        );
        let (handle, task) = session::spawn(network.clone(), settings, transport, records_tx.clone());
        info!(network = %network.name, network_id = %network.id, "Session started");
        handles.push(handle);
        session_tasks.push(task);
    }
    // Sessions own the only producers; ingestion ends once they all stop.
    drop(records_tx);
    let registry = Arc::new(SessionRegistry::new(handles));
    if registry.is_empty() {
        warn!("No enabled networks, nothing will be logged");
    }

    let pipeline = IngestPipeline::new(
        Arc::new(db.clone()),
        records_rx,
        notices.clone(),
        &config.logger,
    );
    let ingest_task = tokio::spawn(pipeline.run().instrument(spans::ingest()));

    let router = CommandRouter::from_config(Arc::new(db.clone()), Arc::clone(&registry), &config.router);
    let router_task = tokio::spawn(router.run(shutdown.clone()).instrument(spans::router()));

    if config.tail.enabled {
        let tail = TailServer::bind(
            config.tail.address,
            Arc::new(db.clone()),
            Arc::clone(&networks),
            notices.clone(),
            config.tail.poll_interval(),
        )
        .await
        .with_context(|| format!("failed to bind live-tail listener on {}", config.tail.address))?;
        tokio::spawn(tail.run(shutdown.clone()));
    } else {
        info!("Live-tail listener disabled");
    }

    if let Some(api_config) = &config.api {
        let address = api_config.address;
        let db = db.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::run_api_server(address, db, shutdown).await {
                error!(%address, error = %e, "HTTP API server failed");
            }
        });
    } else {
        info!("HTTP API disabled");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested");

    registry.shutdown_all();
    shutdown.cancel();
    for task in session_tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Session task failed");
        }
    }
    if let Err(e) = router_task.await {
        warn!(error = %e, "Router task failed");
    }
    if let Err(e) = ingest_task.await {
        warn!(error = %e, "Ingestion task failed");
    }

    info!("irclogd stopped");
    Ok(())
}
