//! Claims Orchestrator - API Server Binary
//!
//! This binary starts the HTTP API server of the claim lifecycle engine.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration (in-memory store, chain-only execution)
//! cargo run --bin claims-api
//!
//! # Run against PostgreSQL with the workflow orchestrator enabled
//! API_STORE_BACKEND=postgres API_DATABASE_URL=postgres://... \
//!     API_ORCHESTRATOR_URL=http://n8n:5678/webhook/claims cargo run --bin claims-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Bind address (default: 0.0.0.0:8080)
//! * `API_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `API_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! * `API_STORE_BACKEND` - `memory` or `postgres` (default: memory)
//! * `API_ORCHESTRATOR_URL` - Workflow orchestrator endpoint (optional)
//! * `API_FALLBACK_ENABLED` - Use the direct chain when the orchestrator fails (default: true)
//!
//! See `ApiConfig` for the full list.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_claims::adapters::{
    build_client, BridgeClient, NormalizerClient, OrchestratorClient, RulesEngineClient, SignerClient,
};
use domain_claims::ports::OrchestratorPort;
use domain_claims::{spawn_retention_sweep, ClaimRepository, Collaborators, InMemoryClaimStore};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgClaimRepository};
use interface_api::config::{ApiConfig, LogFormat, StoreBackend};
use interface_api::{create_router, AppState};

/// Connect timeout shared by all collaborator clients
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, builds the claim store and the
/// collaborator adapters, starts the retention sweep and serves HTTP until a
/// shutdown signal arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;
    config.validate()?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        store = ?config.store_backend,
        orchestrator = config.orchestrator_endpoint().is_some(),
        fallback_enabled = config.fallback_enabled,
        "Starting claims orchestrator API server"
    );

    let shutdown = CancellationToken::new();
    let repository = build_repository(&config).await?;
    let collaborators = build_collaborators(&config)?;

    let sweep = spawn_retention_sweep(
        Arc::clone(&repository),
        config.retention_policy(),
        shutdown.child_token(),
    );

    let state = AppState::new(config.clone(), repository, collaborators, shutdown.clone());
    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweep.await {
        tracing::warn!(error = %e, "Retention sweep task ended abnormally");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

async fn build_repository(config: &ApiConfig) -> anyhow::Result<Arc<dyn ClaimRepository>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory claim store");
            Ok(Arc::new(InMemoryClaimStore::new()))
        }
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let max = config.database_max_connections.max(1);
            let pool = create_pool(
                DatabaseConfig::new(&config.database_url)
                    .max_connections(max)
                    .min_connections(max.min(2)),
            )
            .await
            .context("database connection failed")?;
            run_migrations(&pool).await.context("database migration failed")?;
            tracing::info!("Database ready");
            Ok(Arc::new(PgClaimRepository::new(pool)))
        }
    }
}

fn build_collaborators(config: &ApiConfig) -> anyhow::Result<Collaborators> {
    let client = build_client(CONNECT_TIMEOUT).context("failed to build HTTP client")?;

    let orchestrator = config.orchestrator_endpoint().map(|url| {
        Arc::new(OrchestratorClient::new(client.clone(), url)) as Arc<dyn OrchestratorPort>
    });

    Ok(Collaborators {
        orchestrator,
        normalizer: Arc::new(NormalizerClient::new(client.clone(), &config.normalizer_url)),
        rules: Arc::new(RulesEngineClient::new(client.clone(), &config.rules_url)),
        signer: Arc::new(SignerClient::new(client.clone(), &config.signer_url)),
        bridge: Arc::new(BridgeClient::new(client, &config.bridge_url)),
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits; the caller then
/// cancels the root token, which stops the sweep and aborts pending
/// collaborator calls.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
