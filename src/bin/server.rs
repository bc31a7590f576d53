//! neuropipe-server
//!
//! Minimal `axum` process exposing `/healthz` and `/metrics` only. The
//! HTTP CRUD surface and auth are out of scope here - this binary exists
//! so the ambient observability stack has a host process, mirroring the
//! teacher's `bin/server.rs` shape without its REST surface.

use axum::{extract::State, routing::get, Json, Router};
use neuropipe::db::config::{health_check, init_pool, DatabaseConfig};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Clone)]
struct AppState {
    db: PgPool,
    started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    database_connected: bool,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = health_check(&state.db).await.map(|h| h.connected).unwrap_or(false);
    Json(HealthResponse {
        status: if connected { "ok" } else { "degraded" },
        service: "neuropipe",
        version: env!("CARGO_PKG_VERSION"),
        database_connected: connected,
    })
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    uptime_seconds: i64,
    pending_job_count: i64,
    database_latency_ms: u64,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let health = health_check(&state.db).await.ok();
    Json(MetricsResponse {
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
        pending_job_count: health.as_ref().map(|h| h.pending_job_count).unwrap_or(0),
        database_latency_ms: health.as_ref().map(|h| h.latency_ms).unwrap_or(0),
    })
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neuropipe=debug".into()),
        )
        .init();

    let db_config = DatabaseConfig::from_env();
    let db = init_pool(&db_config).await?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    let addr = format!("{host}:{port}");

    let state = AppState {
        db,
        started_at: chrono::Utc::now(),
    };
    let app = create_router(state);

    info!("neuropipe-server starting on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
