//! lightning-evm-bridge server entry point.
//!
//! Wires the ledgers and coordinators, runs the startup solvency check,
//! starts the cached-payment recovery job and serves `/ws` plus the HTTP
//! routes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lightning_evm_bridge::api;
use lightning_evm_bridge::app_state::AppState;
use lightning_evm_bridge::chain::{EvmHtlcChain, HtlcChain};
use lightning_evm_bridge::config::BridgeConfig;
use lightning_evm_bridge::domain::EventBus;
use lightning_evm_bridge::lightning::{LightningNode, LndRestNode, UnconfiguredNode};
use lightning_evm_bridge::persistence::{Ledger, MemoryLedger, PostgresLedger};
use lightning_evm_bridge::service::{
    CachedPaymentRecovery, ServerStatus, SolvencyMonitor, SwapService, SwapSettings,
};
use lightning_evm_bridge::ws::handler::ws_handler;

/// Upper bound on producing an HTTP response.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = BridgeConfig::from_env().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;
    tracing::info!(addr = %config.listen_addr, "starting lightning-evm-bridge");

    // Ledger
    let ledger: Arc<dyn Ledger> = if config.persistence_enabled {
        let ledger = PostgresLedger::connect(&config)
            .await
            .context("connecting to the database")?;
        tracing::info!("persistence enabled");
        Arc::new(ledger)
    } else {
        tracing::warn!("persistence disabled, swap records are kept in memory");
        Arc::new(MemoryLedger::new())
    };

    // Chain
    let chain: Arc<dyn HtlcChain> = Arc::new(
        EvmHtlcChain::connect(
            &config.rpc_url,
            &config.lsp_private_key,
            config.chain_id,
            &config.htlc_contract_address,
        )
        .context("building the chain client")?,
    );
    tracing::info!(signer = %chain.signer_address(), "chain client ready");

    // Lightning
    let (lightning, status): (Arc<dyn LightningNode>, ServerStatus) = match &config.lnd {
        Some(lnd) => (
            Arc::new(
                LndRestNode::new(lnd, config.timings.invoice_poll_interval)
                    .context("building the lightning client")?,
            ),
            ServerStatus::Active,
        ),
        None => {
            tracing::warn!("no lightning node configured, running in MOCK mode");
            (Arc::new(UnconfiguredNode), ServerStatus::Mock)
        }
    };

    // Solvency
    let solvency = Arc::new(SolvencyMonitor::new(
        Arc::clone(&ledger),
        Arc::clone(&lightning),
        &config.timings,
    ));
    if status == ServerStatus::Active {
        match solvency.reconcile_or_halt().await {
            Some(snapshot) => {
                tracing::info!(
                    combined_sats = snapshot.combined_balance,
                    "startup balance check passed"
                );
            }
            None => tracing::warn!("startup balance check could not complete"),
        }
    }

    // Service layer
    let swap_service = Arc::new(SwapService::new(
        Arc::clone(&ledger),
        Arc::clone(&chain),
        lightning,
        Arc::clone(&solvency),
        SwapSettings {
            status,
            provider: config.provider.clone(),
            timings: config.timings.clone(),
            signer_min_balance_wei: config.signer_min_balance_wei,
        },
    ));
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Background jobs
    let recovery = Arc::new(CachedPaymentRecovery::new(
        Arc::clone(&ledger),
        Arc::clone(&chain),
        solvency,
        event_bus.clone(),
        config.timings.cached_payment_interval,
    ));
    tokio::spawn(recovery.run());

    // Build application state
    let app_state = AppState {
        swap_service,
        ledger,
        chain,
        event_bus,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(HTTP_TIMEOUT)),
        )
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
