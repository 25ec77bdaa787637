//! FlightSurety Oracle Server
//!
//! Registers a fleet of oracle accounts with the FlightSurety App contract,
//! answers every `OracleRequest` addressed to one of their indexes, and serves
//! a small health API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flightsurety_oracles::app_state::AppState;
use flightsurety_oracles::config::FleetConfig;
use flightsurety_oracles::health::FleetHealth;
use flightsurety_oracles::ledger::{EthLedger, Ledger};
use flightsurety_oracles::routes;
use flightsurety_oracles::services::{
    DispatchSettings, EventListener, FixedStatusGenerator, IdentityRegistry, IndexAssignmentCache,
    RandomStatusGenerator, ResponseDispatcher, StatusGenerator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FleetConfig::from_env().context("invalid configuration")?;
    info!(
        rpc_url = %config.rpc_url,
        contract = %config.contract_address,
        accounts = %config.account_range,
        from = %config.subscribe_from,
        "oracle server configured"
    );

    let eth = Arc::new(EthLedger::from_config(&config).context("failed to build ledger client")?);
    let accounts = eth.accounts().await.context("failed to list ledger accounts")?;
    let oracle_accounts = config.account_range.select(&accounts).ok_or_else(|| {
        anyhow!(
            "oracle range {} exceeds the {} accounts exposed by the ledger",
            config.account_range,
            accounts.len()
        )
    })?;

    let (registry, report) =
        IdentityRegistry::register_all(eth.as_ref(), oracle_accounts, config.stake_wei).await;
    if registry.is_empty() {
        bail!("none of the {} oracle accounts could be registered", report.failed.len());
    }
    let registry = Arc::new(registry);

    let ledger: Arc<dyn Ledger> = eth;
    let cache = Arc::new(
        IndexAssignmentCache::new(ledger.clone()).with_lookup_timeout(config.rpc_timeout),
    );
    cache.warm(registry.handles()).await;

    let generator: Arc<dyn StatusGenerator> = match config.fixed_status {
        Some(status) => {
            info!(status = status.code(), "oracles report a fixed status");
            Arc::new(FixedStatusGenerator(status))
        }
        None => Arc::new(RandomStatusGenerator),
    };

    let health = Arc::new(FleetHealth::new());
    let dispatcher = Arc::new(ResponseDispatcher::new(
        registry.clone(),
        cache.clone(),
        ledger.clone(),
        generator,
        health.clone(),
        DispatchSettings {
            max_in_flight: config.max_in_flight,
            submission_timeout: config.submission_timeout,
        },
    ));

    // Start the request listener; it stops when the shutdown flag flips.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = EventListener::new(ledger, dispatcher.clone(), health.clone());
    let listener_handle = tokio::spawn(listener.run(config.subscribe_from, shutdown_rx));

    let app = routes::app(
        AppState::new(registry, cache, health),
        &config.cors_allowed_origins,
    );
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Server starting on {}", addr);

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("http server failed")?;

    if let Err(join_error) = listener_handle.await {
        error!(error = %join_error, "listener task failed");
    }

    info!(in_flight = dispatcher.in_flight(), "draining oracle submissions");
    if !dispatcher.drain(config.drain_timeout).await {
        warn!(
            in_flight = dispatcher.in_flight(),
            "drain period elapsed with submissions outstanding"
        );
    }

    info!("oracle server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and tells the listener to stop.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown requested: stopping oracle request listener");
    let _ = shutdown.send(true);
}
