//! Bizdash Server - Main entry point
//!
//! Multi-tenant admin dashboard backend.

use std::sync::Arc;

use anyhow::Context;
use bizdash_core::{
    api::{self, AppState},
    authz::{Authorizer, UserId},
    config::{Config, StorageBackend},
    middleware::Authenticator,
    observability,
    store::{self, MemoryStore, PostgresStore, RowStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load_default().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    observability::init("bizdash-server", &config.observability)?;
    let metrics = observability::install_prometheus()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Bizdash Server");

    // A broken policy override must stop the process, never degrade to open access
    let policy = config.policy.build_table()?;
    let authorizer = Authorizer::new(policy);
    tracing::info!("Role policy table loaded");

    let authenticator = Authenticator::new(config.auth.to_auth_config()?)
        .map_err(|e| anyhow::anyhow!("invalid auth configuration: {e}"))?;

    let store = open_store(&config).await?;

    if let Some(id) = config.bootstrap.super_admin_id.as_deref() {
        store::bootstrap_super_admin(
            store.as_ref(),
            &UserId::new(id),
            &config.bootstrap.super_admin_email,
        )
        .await?;
    }

    let app_state = AppState::new(authorizer, store, authenticator).with_metrics(metrics);
    let app = api::build_router(app_state);

    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RowStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let store = PostgresStore::connect(&config.storage).await?;
            tracing::info!("Connected to database");

            if config.storage.run_migrations {
                store.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            Ok(Arc::new(store))
        }
    }
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
