//! Banadama Marketplace Core Server
//!
//! Boots the API server: configuration, tracing, database pool and
//! migrations, domain services, router, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Json, Router};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use banadama_server::audit::AuditService;
use banadama_server::config::Config;
use banadama_server::db;
use banadama_server::dispute::DisputeService;
use banadama_server::earnings::EarningsService;
use banadama_server::escrow::EscrowService;
use banadama_server::middleware::{self, AuthConfig, RateLimiter};
use banadama_server::order::OrderService;
use banadama_server::routes;
use banadama_server::state::AppState;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting Banadama marketplace core"
    );

    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!("Migration failed: {}", e);
        std::process::exit(1);
    }

    // Wire up domain services
    let escrow_service = EscrowService::new(db_pool.clone());
    let earnings_service = EarningsService::new(db_pool.clone(), config.settings.clone());
    let order_service = OrderService::new(
        db_pool.clone(),
        escrow_service.clone(),
        earnings_service.clone(),
    );
    let dispute_service = DisputeService::new(db_pool.clone(), escrow_service.clone());
    let audit_service = AuditService::new(db_pool.clone());

    let app_state = AppState::new(
        Arc::new(order_service),
        Arc::new(escrow_service),
        Arc::new(dispute_service),
        Arc::new(earnings_service),
        Arc::new(audit_service),
        AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
        },
    );

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    let health_db_pool = db_pool.clone();

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health_check(health_db_pool.clone())))
        .merge(routes::order_routes())
        .merge(routes::dispute_routes())
        .merge(routes::escrow_routes())
        .merge(routes::earnings_routes())
        .merge(routes::audit_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "Banadama Marketplace Core"
}

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(pool: sqlx::PgPool) -> Json<HealthResponse> {
    let database = match db::check_health(&pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if database == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(origins_str) = config.cors_allowed_origins.as_deref() else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
