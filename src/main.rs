use std::sync::Arc;

use pipeline_crm::{
    database::MysqlStore,
    notify::BroadcastNotifier,
    seed::{bootstrap_admin, seed_demo},
    store::{EntityStore, MemoryStore},
    AppState, Config, CrmResult,
};
use tracing_subscriber::EnvFilter;

async fn open_store(config: &Config) -> CrmResult<Arc<dyn EntityStore>> {
    if config.database_url() == "memory" {
        tracing::warn!("using the in-memory store, data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = MysqlStore::connect(config.database_url())?;
    store.create_tables().await?;
    tracing::info!("connected to mysql");
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

async fn run() -> CrmResult<()> {
    let config = Config::read()?;
    let store = open_store(&config).await?;
    bootstrap_admin(store.as_ref(), &config).await?;
    if config.seed_demo() {
        seed_demo(store.as_ref()).await?;
    }
    let port = config.port();
    let state = AppState::new(store, Arc::new(BroadcastNotifier::default()), config);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| pipeline_crm::CrmError::internal(format!("cannot bind port {}: {}", port, e)))?;
    tracing::info!(port, "listening");
    axum::serve(listener, pipeline_crm::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| pipeline_crm::CrmError::internal(e.to_string()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pipeline_crm=info,tower_http=info")),
        )
        .init();
    if let Err(e) = run().await {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
