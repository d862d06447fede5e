use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_core::alerts::evaluator::{summarize, AlertSummary};
use pulse_core::domain::snapshot::SentimentSnapshot;
use pulse_core::export::DEFAULT_HISTORY_DAYS;
use pulse_core::storage::records::{self, StoreStats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = pulse_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool = match pulse_core::storage::open(&settings.database_url).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %format!("{e:#}"),
                "record store unavailable; starting API in degraded mode"
            );
            None
        }
    };

    let state = AppState {
        pool,
        alerts_file: PathBuf::from(&settings.alerts_file),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots/:symbol", get(get_snapshots))
        .route("/stats", get(get_stats))
        .route("/symbols", get(get_symbols))
        .route("/alerts/summary", get(get_alert_summary))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<SqlitePool>,
    alerts_file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ApiHistory {
    symbol: String,
    days: i64,
    records: Vec<SentimentSnapshot>,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_snapshots(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiHistory>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    if days < 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let records = records::history(pool, &symbol, days, Utc::now())
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiHistory {
        symbol,
        days,
        records,
    }))
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StoreStats>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let stats = records::stats(pool).await.map_err(internal_error)?;
    Ok(Json(stats))
}

async fn get_symbols(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let symbols = records::symbols(pool).await.map_err(internal_error)?;
    Ok(Json(symbols))
}

// Reloaded on every request; the worker owns writes.
async fn get_alert_summary(
    State(state): State<AppState>,
) -> Result<Json<AlertSummary>, StatusCode> {
    let rules =
        pulse_core::alerts::store::load_rules(&state.alerts_file).map_err(internal_error)?;
    Ok(Json(summarize(&rules, Utc::now())))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &pulse_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
