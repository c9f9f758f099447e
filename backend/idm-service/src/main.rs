/// IDM Service Main Entry Point
///
/// Starts gRPC server with:
/// - Credential store (PostgreSQL pool or in-memory)
/// - First-admin bootstrap
/// - Revocation ledger sweeper (background task)
/// - gRPC health service
use anyhow::{Context, Result};
use idm_service::{
    config::{Settings, StoreBackend},
    db::{CredentialStore, MemoryCredentialStore, PgCredentialStore},
    grpc::{idm::auth_service_server::AuthServiceServer, IdentityServiceServer},
    security::{spawn_revocation_sweeper, JwtKeys},
    services::{ensure_admin, BootstrapOutcome, IdentityService},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tonic::{metadata::MetadataValue, transport::Server, Request, Status};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "idm_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting IDM Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize JWT keys (HS256)
    let keys = JwtKeys::from_secret(&settings.jwt.secret, &settings.jwt.issuer)
        .context("Failed to initialize JWT keys")?;
    info!(issuer = %settings.jwt.issuer, "JWT keys initialized");

    let store: Arc<dyn CredentialStore> = match settings.store {
        StoreBackend::Postgres => {
            let database = settings
                .database
                .as_ref()
                .context("Database settings missing for postgres store")?;

            let db_pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(Duration::from_secs(database.acquire_timeout))
                .connect(&database.url)
                .await
                .context("Failed to connect to PostgreSQL")?;

            info!(
                "Database pool initialized with {} max connections",
                database.max_connections
            );

            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .context("Failed to run database migrations")?;
            info!("Database migrations completed");

            Arc::new(PgCredentialStore::new(db_pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory credential store; accounts are lost on restart");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    // Admin must exist before serving
    match ensure_admin(&*store, &settings.bootstrap)
        .await
        .context("Admin bootstrap failed")?
    {
        BootstrapOutcome::Created => info!("Bootstrap admin created"),
        BootstrapOutcome::AlreadyInitialized => info!("Bootstrap not needed"),
    }

    // Argon2 work is bounded globally, not only per connection
    let identity = IdentityService::new(store, keys, settings.jwt.token_ttl())
        .with_hashing_limit(settings.server.concurrency_limit);

    let sweeper_handle = spawn_revocation_sweeper(
        identity.ledger().clone(),
        settings.revocation.sweep_interval(),
    );

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<AuthServiceServer<IdentityServiceServer>>()
        .await;

    let addr = settings
        .server
        .bind_address()
        .parse()
        .context("Invalid server address")?;

    info!(
        concurrency_limit = settings.server.concurrency_limit,
        "Starting gRPC server on {}", addr
    );

    let served = Server::builder()
        .concurrency_limit_per_connection(settings.server.concurrency_limit)
        .add_service(health_service)
        .add_service(AuthServiceServer::with_interceptor(
            IdentityServiceServer::new(identity),
            grpc_server_interceptor,
        ))
        .serve_with_shutdown(addr, shutdown_signal())
        .await;

    sweeper_handle.abort();
    served.context("gRPC server error")?;

    info!("IDM service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}

/// Propagate or assign `x-correlation-id` so log lines across services join up
fn grpc_server_interceptor(mut req: Request<()>) -> Result<Request<()>, Status> {
    const CORRELATION_HEADER: &str = "x-correlation-id";
    if let Some(existing) = req.metadata().get(CORRELATION_HEADER) {
        if let Ok(val) = existing.to_str() {
            let stored = val.to_string();
            req.extensions_mut().insert::<String>(stored);
        }
    } else {
        let correlation_id = Uuid::new_v4().to_string();
        let value = MetadataValue::try_from(correlation_id.as_str())
            .map_err(|_| Status::internal("failed to set correlation id"))?;
        req.metadata_mut().insert(CORRELATION_HEADER, value);
        req.extensions_mut().insert::<String>(correlation_id);
    }

    Ok(req)
}
