use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use nextday_core::chart::{ChartOptions, ChartRow};
use nextday_core::domain::{RunningTotals, Snapshot};
use nextday_core::ingest::PredictionFeed;
use nextday_core::metrics::{DayMetrics, ScoringPolicy};
use nextday_core::pipeline::PipelineTrigger;
use nextday_core::service::{DaySummary, HistoryService, MergeOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = nextday_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let policy = ScoringPolicy::from_env()?;
    let store = nextday_core::storage::open_store(&settings).await;

    let mut service = HistoryService::new(store, policy);
    match nextday_core::ingest::provider::source_from_settings(&settings) {
        Ok(Some(source)) => service = service.with_source(source),
        Ok(None) => tracing::info!("no snapshot source configured"),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "snapshot source misconfigured; refresh disabled");
        }
    }
    let service = Arc::new(service);
    service.load().await;

    let _auto_refresh = settings
        .snapshot_refresh_period()
        .filter(|_| service.has_source())
        .map(|period| {
            tracing::info!(?period, "auto refresh enabled");
            service.spawn_auto_refresh(period)
        });

    let state = AppState {
        service,
        predictions_path: settings.predictions_path(),
        pipeline: PipelineTrigger::from_settings(&settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/history",
            get(get_history).post(post_history).delete(delete_history),
        )
        .route("/history/recompute", post(recompute_history))
        .route("/history/refresh", post(refresh_history))
        .route("/metrics/totals", get(get_totals))
        .route("/metrics/summary", get(get_summary))
        .route("/metrics/days/:date", get(get_day_metrics))
        .route("/chart", get(get_chart))
        .route("/predictions/latest", get(get_latest_predictions))
        .route("/pipeline/run", post(run_pipeline))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

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

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    service: Arc<HistoryService>,
    predictions_path: PathBuf,
    pipeline: Option<PipelineTrigger>,
}

#[derive(Debug, Serialize)]
struct RecomputeResponse {
    total: usize,
}

#[derive(Debug, Serialize)]
struct PipelineRunResponse {
    run_id: Uuid,
}

async fn get_history(State(state): State<AppState>) -> Json<Vec<Snapshot>> {
    Json(state.service.history().as_ref().clone())
}

async fn post_history(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<MergeOutcome>, StatusCode> {
    state
        .service
        .add_text(&body)
        .await
        .map(Json)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)
}

async fn delete_history(State(state): State<AppState>) -> StatusCode {
    state.service.clear().await;
    StatusCode::NO_CONTENT
}

async fn recompute_history(State(state): State<AppState>) -> Json<RecomputeResponse> {
    let total = state.service.recompute().await;
    Json(RecomputeResponse { total })
}

async fn refresh_history(
    State(state): State<AppState>,
) -> Result<Json<MergeOutcome>, StatusCode> {
    state
        .service
        .refresh()
        .await
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_totals(State(state): State<AppState>) -> Result<Json<RunningTotals>, StatusCode> {
    state
        .service
        .latest_totals()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_summary(State(state): State<AppState>) -> Json<DaySummary> {
    Json(state.service.day_summary())
}

async fn get_day_metrics(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DayMetrics>, StatusCode> {
    let date =
        NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    state
        .service
        .day_metrics(date)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_chart(
    State(state): State<AppState>,
    Query(options): Query<ChartOptions>,
) -> Json<Vec<ChartRow>> {
    Json(state.service.chart(&options))
}

async fn get_latest_predictions(State(state): State<AppState>) -> Json<PredictionFeed> {
    Json(nextday_core::ingest::load_prediction_feed(&state.predictions_path).await)
}

async fn run_pipeline(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<PipelineRunResponse>), StatusCode> {
    let Some(pipeline) = &state.pipeline else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_id = pipeline.trigger().map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "pipeline trigger failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::ACCEPTED, Json(PipelineRunResponse { run_id })))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &nextday_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
