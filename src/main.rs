use mandi_payments::api::{self, AppState};
use mandi_payments::config::{AppConfig, DatabaseConfig};
use mandi_payments::database::order_repository::{InMemoryOrderStore, OrderStore};
use mandi_payments::health::HealthChecker;
use mandi_payments::logging::{init_tracing, log_credential_presence};
use mandi_payments::payments::clock::SystemClock;
use mandi_payments::payments::GatewayRegistry;
use mandi_payments::services::payment_orchestrator::{OrchestratorConfig, PaymentOrchestrator};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(feature = "database")]
async fn open_order_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn OrderStore>> {
    use mandi_payments::database::order_repository::PgOrderRepository;
    use mandi_payments::database::{init_pool_from_config, run_migrations};

    info!("Initializing database connection pool...");
    let pool = init_pool_from_config(config).await?;
    run_migrations(&pool).await?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );
    Ok(Arc::new(PgOrderRepository::new(pool)))
}

#[cfg(not(feature = "database"))]
async fn open_order_store(_config: &DatabaseConfig) -> anyhow::Result<Arc<dyn OrderStore>> {
    anyhow::bail!("built without the `database` feature; set SKIP_EXTERNALS=true")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateways = ?config.gateways.enabled,
        "Starting mandi payments service"
    );
    log_credential_presence(&config.gateways);

    let orders: Arc<dyn OrderStore> = if config.skip_externals {
        info!("Skipping database initialization (SKIP_EXTERNALS=true); orders are kept in memory");
        Arc::new(InMemoryOrderStore::new())
    } else {
        open_order_store(&config.database).await?
    };

    let registry = GatewayRegistry::from_config(&config.gateways, Arc::new(SystemClock))?;
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        registry.clone(),
        orders.clone(),
        OrchestratorConfig::default(),
    ));

    let app = api::router(AppState {
        orchestrator,
        redirect: config.redirect.clone(),
        health_checker: HealthChecker::new(orders, registry),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
